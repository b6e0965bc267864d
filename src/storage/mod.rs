//! Versioned storage over a detected history tool.
//!
//! [`Store`] implements everything tool-agnostic (the path cache
//! lifecycle, generic get/set/add/remove/children plumbing, commit
//! message handling, and revision-aware identifier lookup) and
//! delegates the tool-specific steps to a [`Backend`] adapter.
//!
//! A store moves through `unrooted -> rooted -> connected`:
//! [`Store::root`] asks the adapter to recognize the directory and
//! resolve the repository root, [`Store::connect`] loads the path cache
//! and checks the on-disk format version, and [`Store::disconnect`]
//! flushes the cache. [`Store::destroy`] (from rooted) deletes the
//! marker directory and the adapter's versioning metadata.
//!
//! Everything here is synchronous and single-threaded: one operation at
//! a time, re-reading the filesystem on each, with no locking against
//! other processes mutating the same tree.

pub mod backend;
pub mod idcache;
pub mod version;

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::unidiff::PatchSet;
use crate::{Error, Result};
use backend::{Backend, fallback_user_id};
pub use backend::{BackendKind, DEFAULT_ORDER, backend_by_name, detect_backend};
pub use idcache::{CACHE_FILE, PathCache, SPACER_DIRS};

/// On-disk storage format version; connecting requires an exact match.
pub const STORAGE_VERSION: &str = "1";

/// Name of the format version file inside the marker directory.
pub const VERSION_FILE: &str = "version";

/// The `(added, modified, removed)` identifier sets between a revision
/// and the current working state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
}

/// A storage tree bound to one repository root and one adapter.
pub struct Store {
    repo: PathBuf,
    backend: Box<dyn Backend>,
    cache: Option<PathCache>,
    rooted: bool,
    connected: bool,
}

impl Store {
    /// Bind a store to `path` with the given adapter. No disk access
    /// happens until [`Store::root`], [`Store::init`], or
    /// [`Store::connect`].
    pub fn new(path: &Path, backend: Box<dyn Backend>) -> Self {
        Store {
            repo: path.to_path_buf(),
            backend,
            cache: None,
            rooted: false,
            connected: false,
        }
    }

    /// The adapter's name.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Whether the adapter keeps history.
    pub fn versioned(&self) -> bool {
        self.backend.versioned()
    }

    /// The resolved repository root (valid once rooted).
    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// The user identity used for commits: the tool's configured one,
    /// or an identity assembled from the environment.
    pub fn user_id(&self) -> String {
        self.backend.user_id().unwrap_or_else(fallback_user_id)
    }

    /// Resolve the repository root owning the bound path.
    ///
    /// Fails with [`Error::UnableToRoot`] when the adapter does not
    /// recognize the directory or any of its ancestors.
    pub fn root(&mut self) -> Result<()> {
        if !self.backend.detect(&self.repo) {
            return Err(Error::UnableToRoot {
                vcs: self.backend.name().to_string(),
                path: self.repo.clone(),
            });
        }
        let mut root = self.backend.root(&self.repo)?.canonicalize()?;
        if !root.is_dir() {
            if let Some(parent) = root.parent() {
                root = parent.to_path_buf();
            }
        }
        self.repo = root;
        self.cache = Some(PathCache::new(&self.repo));
        self.rooted = true;
        Ok(())
    }

    /// Create the storage tree: start history tracking if the tree has
    /// none, create and register the marker directory, write the format
    /// version, and build the path cache.
    pub fn init(&mut self) -> Result<()> {
        if !self.repo.is_dir() {
            return Err(Error::UnableToRoot {
                vcs: self.backend.name().to_string(),
                path: self.repo.clone(),
            });
        }
        if !self.backend.detect(&self.repo) {
            self.backend.init(&self.repo.clone())?;
        }
        if !self.rooted {
            self.root()?;
        }
        let marker = self.marker_dir();
        if marker.exists() {
            return Err(Error::Connection(format!(
                "already initialized: {}",
                marker.display()
            )));
        }
        fs::create_dir(&marker)?;
        self.backend.add(Path::new(SPACER_DIRS[0]))?;
        self.setup_storage_version()?;
        self.cache_mut()?.init()?;
        Ok(())
    }

    /// Load the path cache and verify the storage format version.
    ///
    /// The marker directory must already exist; run [`Store::init`]
    /// first for a fresh tree.
    pub fn connect(&mut self) -> Result<()> {
        if !self.rooted {
            self.root()?;
        }
        if !self.marker_dir().is_dir() {
            return Err(Error::Connection(format!(
                "no storage tree at {}: run `bt init` first",
                self.marker_dir().display()
            )));
        }
        self.cache_mut()?.connect()?;
        self.check_storage_version()?;
        self.connected = true;
        Ok(())
    }

    /// Flush the path cache and drop it from memory.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.connected {
            self.cache_mut()?.disconnect()?;
            self.connected = false;
        }
        Ok(())
    }

    /// Delete the adapter's versioning metadata, the marker directory,
    /// and the path cache file.
    pub fn destroy(&mut self) -> Result<()> {
        self.require_rooted()?;
        self.disconnect()?;
        self.backend.destroy()?;
        self.cache_mut()?.destroy()?;
        let marker = self.marker_dir();
        if marker.exists() {
            fs::remove_dir_all(&marker)?;
        }
        Ok(())
    }

    /// Whether `id` exists, in the working tree or at a revision.
    pub fn exists(&mut self, id: &str, revision: Option<&str>) -> Result<bool> {
        self.require_connected()?;
        match revision {
            None => match self.cache_mut()?.path(id) {
                Ok(path) => Ok(path.exists()),
                Err(Error::UnknownId(_)) => Ok(false),
                Err(e) => Err(e),
            },
            Some(rev) => match self.path_in_revision(id, rev) {
                Ok(_) => Ok(true),
                Err(Error::UnknownId(_)) => Ok(false),
                Err(e) => Err(e),
            },
        }
    }

    /// Read the bytes stored for `id`, now or at a revision.
    ///
    /// An unknown identifier is an error and an existing empty file is
    /// `Ok` with empty contents; use [`Store::get_or`] for a default.
    pub fn get(&mut self, id: &str, revision: Option<&str>) -> Result<Vec<u8>> {
        self.require_connected()?;
        match revision {
            None => {
                let path = self.cache_mut()?.path(id)?;
                if !path.exists() {
                    return Err(Error::UnknownId(id.to_string()));
                }
                if path.is_dir() {
                    return Err(Error::IsDirectory(id.to_string()));
                }
                Ok(fs::read(&path)?)
            }
            Some(rev) => {
                let rel = self.path_in_revision(id, rev)?;
                self.backend.read_file(&rel, rev)
            }
        }
    }

    /// [`Store::get`], but an unknown identifier yields `default`.
    pub fn get_or(
        &mut self,
        id: &str,
        revision: Option<&str>,
        default: &[u8],
    ) -> Result<Vec<u8>> {
        match self.get(id, revision) {
            Ok(contents) => Ok(contents),
            Err(Error::UnknownId(_)) => Ok(default.to_vec()),
            Err(e) => Err(e),
        }
    }

    /// Write the bytes stored for `id` and notify the adapter.
    pub fn set(&mut self, id: &str, value: &[u8]) -> Result<()> {
        self.require_connected()?;
        let path = self.cache_mut()?.path(id)?;
        if !path.exists() {
            return Err(Error::UnknownId(id.to_string()));
        }
        if path.is_dir() {
            return Err(Error::IsDirectory(id.to_string()));
        }
        fs::write(&path, value)?;
        let rel = self.rel(&path)?;
        self.backend.update(&rel)
    }

    /// Create storage for a new identifier under `parent`, registering
    /// every missing intermediate directory with the adapter.
    pub fn add(&mut self, id: &str, parent: Option<&str>, directory: bool) -> Result<()> {
        self.require_connected()?;
        let path = self.cache_mut()?.add(id, parent)?;
        self.add_path(&path, directory)
    }

    /// Remove a leaf identifier, refusing to remove a directory that
    /// still has children.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        self.require_connected()?;
        let path = self.cache_mut()?.path(id)?;
        if path.exists() {
            if path.is_dir() && !self.children(Some(id), None)?.is_empty() {
                return Err(Error::DirectoryNotEmpty(id.to_string()));
            }
            let rel = self.rel(&path)?;
            self.backend.remove(&rel)?;
            if path.exists() {
                if path.is_dir() {
                    fs::remove_dir(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
            }
        }
        self.cache_mut()?.remove(id);
        Ok(())
    }

    /// Remove an identifier's whole subtree, notifying the adapter for
    /// every removed path and purging the matching cache entries.
    pub fn recursive_remove(&mut self, id: &str) -> Result<()> {
        self.require_connected()?;
        let path = self.cache_mut()?.path(id)?;
        let rel_prefix = self.cache_mut()?.rel_path(id)?;
        if path.exists() {
            let doomed: Vec<PathBuf> = WalkDir::new(&path)
                .contents_first(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.path().to_path_buf())
                .collect();
            for target in doomed {
                if !target.exists() {
                    continue;
                }
                let rel = self.rel(&target)?;
                self.backend.remove(&rel)?;
            }
            if path.exists() {
                fs::remove_dir_all(&path)?;
            }
        }
        self.cache_mut()?.remove_prefix(&rel_prefix);
        Ok(())
    }

    /// Immediate children of `id` (or of the tree root when `None`).
    ///
    /// Spacer directories are expanded transparently: a bug directory's
    /// contents are children of the bug, not a child named `bugs`.
    /// Storage bookkeeping files never appear.
    pub fn children(&mut self, id: Option<&str>, revision: Option<&str>) -> Result<Vec<String>> {
        self.require_connected()?;
        let path = self.resolve(id, revision)?;
        if !self.dir_at(&path, revision)? {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for name in self.list_names(&path, revision)? {
            if SPACER_DIRS.contains(&name.as_str()) {
                for inner in self.list_names(&path.join(&name), revision)? {
                    names.push(format!("{name}/{inner}"));
                }
            } else if name != CACHE_FILE && name != VERSION_FILE {
                names.push(name);
            }
        }
        let cache = self.cache.as_ref().ok_or(Error::NotRooted)?;
        let mut ids = Vec::new();
        for name in names {
            ids.push(cache.id(&path.join(name))?);
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Identifiers owning `id`, nearest first.
    pub fn ancestors(&mut self, id: Option<&str>, revision: Option<&str>) -> Result<Vec<String>> {
        self.require_connected()?;
        let mut path = self.resolve(id, revision)?;
        let cache = self.cache.as_ref().ok_or(Error::NotRooted)?;
        let mut ancestors = Vec::new();
        while path.starts_with(&self.repo) && path != self.repo {
            path = match path.parent() {
                Some(parent) => parent.to_path_buf(),
                None => break,
            };
            match cache.id(&path) {
                Ok(ancestor) => ancestors.push(ancestor),
                Err(Error::InvalidPath { .. }) | Err(Error::SpacerCollision { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(ancestors)
    }

    /// Commit pending storage changes as `summary` (and optional body).
    ///
    /// Returns the new revision id, or `None` for an unversioned store.
    /// With nothing to commit this is [`Error::EmptyCommit`] unless
    /// `allow_empty`; tools that cannot record an empty revision then
    /// report the most recent existing one.
    pub fn commit(
        &mut self,
        summary: &str,
        body: Option<&str>,
        allow_empty: bool,
    ) -> Result<Option<String>> {
        self.require_connected()?;
        let mut message = format!("{}\n", summary.trim());
        if let Some(body) = body {
            message.push('\n');
            message.push_str(body.trim());
            message.push('\n');
        }
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(message.as_bytes())?;
        file.flush()?;
        self.backend.commit(file.path(), allow_empty)
    }

    /// Resolve a signed relative revision index to a revision id.
    ///
    /// `1` names the very first revision and `-1` the newest; anything
    /// the adapter cannot resolve is [`Error::InvalidRevision`].
    pub fn revision_id(&mut self, index: i64) -> Result<String> {
        self.require_rooted()?;
        self.backend
            .revision_id(index)?
            .ok_or_else(|| Error::InvalidRevision(index.to_string()))
    }

    /// Identifiers added/modified/removed between `revision` and the
    /// current working state.
    ///
    /// Changed paths that map to no identifier (adapter bookkeeping,
    /// unrelated files) are dropped silently.
    pub fn changed(&mut self, revision: &str) -> Result<ChangeSet> {
        self.require_connected()?;
        let text = self.backend.diff(revision)?;
        let patch = PatchSet::parse(&text)?;
        let files = patch.changed_files();
        let cache = self.cache.as_ref().ok_or(Error::NotRooted)?;
        let to_ids = |paths: &BTreeSet<String>| -> Vec<String> {
            paths
                .iter()
                .filter_map(|p| cache.id(Path::new(p)).ok())
                .collect()
        };
        Ok(ChangeSet {
            added: to_ids(&files.added),
            modified: to_ids(&files.modified),
            removed: to_ids(&files.removed),
        })
    }

    /// The storage marker directory at the tree root.
    pub fn marker_dir(&self) -> PathBuf {
        self.repo.join(SPACER_DIRS[0])
    }

    fn require_rooted(&self) -> Result<()> {
        if self.rooted { Ok(()) } else { Err(Error::NotRooted) }
    }

    fn require_connected(&self) -> Result<()> {
        self.require_rooted()?;
        if self.connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn cache_mut(&mut self) -> Result<&mut PathCache> {
        self.cache.as_mut().ok_or(Error::NotRooted)
    }

    /// Path of `path` relative to the repository root.
    fn rel(&self, path: &Path) -> Result<PathBuf> {
        path.strip_prefix(&self.repo)
            .map(Path::to_path_buf)
            .map_err(|_| Error::InvalidPath {
                path: path.to_path_buf(),
                within: self.repo.display().to_string(),
            })
    }

    /// Absolute path for `id` (or the marker directory for `None`), now
    /// or at a revision.
    fn resolve(&mut self, id: Option<&str>, revision: Option<&str>) -> Result<PathBuf> {
        match id {
            None => Ok(self.marker_dir()),
            Some(id) => match revision {
                None => self.cache_mut()?.path(id),
                Some(rev) => {
                    let rel = self.path_in_revision(id, rev)?;
                    Ok(self.repo.join(rel))
                }
            },
        }
    }

    fn dir_at(&self, path: &Path, revision: Option<&str>) -> Result<bool> {
        match revision {
            None => Ok(path.is_dir()),
            Some(rev) => self.backend.is_dir_at(&self.rel(path)?, rev),
        }
    }

    fn list_names(&self, path: &Path, revision: Option<&str>) -> Result<Vec<String>> {
        match revision {
            None => {
                let mut names = Vec::new();
                for entry in fs::read_dir(path)? {
                    names.push(entry?.file_name().to_string_lossy().into_owned());
                }
                Ok(names)
            }
            Some(rev) => self.backend.list_dir_at(&self.rel(path)?, rev),
        }
    }

    /// Root-relative path of `id` as of `revision`: a manifest search
    /// for manifest-style tools, otherwise a listing walk.
    fn path_in_revision(&mut self, id: &str, revision: &str) -> Result<PathBuf> {
        match self.backend.manifest(revision)? {
            Some(manifest) => self.find_id_in_manifest(id, &manifest),
            None => self.find_id_walking(id, revision),
        }
    }

    fn find_id_in_manifest(&self, id: &str, manifest: &[String]) -> Result<PathBuf> {
        let prefix = format!("{}/", SPACER_DIRS[0]);
        let files: Vec<String> = manifest
            .iter()
            .filter(|f| f.starts_with(&prefix))
            .cloned()
            .collect();
        // Manifests list files; candidate directories are implied by
        // their parents.
        let mut candidates: BTreeSet<String> = files.iter().cloned().collect();
        for file in &files {
            let parts: Vec<&str> = file.split('/').collect();
            let mut dir = parts[0].to_string();
            for part in &parts[1..parts.len().saturating_sub(1)] {
                dir = format!("{dir}/{part}");
                candidates.insert(dir.clone());
            }
        }
        let cache = self.cache.as_ref().ok_or(Error::NotRooted)?;
        for candidate in &candidates {
            if let Ok(found) = cache.id(Path::new(candidate)) {
                if found == id {
                    return Ok(PathBuf::from(candidate));
                }
            }
        }
        Err(Error::UnknownId(id.to_string()))
    }

    fn find_id_walking(&self, id: &str, revision: &str) -> Result<PathBuf> {
        let marker = SPACER_DIRS[0];
        let suffix = format!("/{id}");
        let mut stack: Vec<(PathBuf, String)> = vec![(PathBuf::from(marker), marker.to_string())];
        while let Some((path, long_id)) = stack.pop() {
            if long_id.ends_with(&suffix) {
                return Ok(path);
            }
            if !self.backend.is_dir_at(&path, revision)? {
                continue;
            }
            for child in self.backend.list_dir_at(&path, revision)? {
                stack.push((path.join(&child), format!("{long_id}/{child}")));
            }
        }
        Err(Error::UnknownId(id.to_string()))
    }

    fn setup_storage_version(&mut self) -> Result<()> {
        let path = self.marker_dir().join(VERSION_FILE);
        if !path.exists() {
            fs::write(&path, format!("{STORAGE_VERSION}\n"))?;
            let rel = self.rel(&path)?;
            self.backend.add(&rel)?;
        }
        Ok(())
    }

    fn check_storage_version(&self) -> Result<()> {
        let path = self.marker_dir().join(VERSION_FILE);
        let found = fs::read_to_string(&path)
            .map_err(|e| Error::Connection(format!("cannot read storage version: {e}")))?
            .trim()
            .to_string();
        if found != STORAGE_VERSION {
            return Err(Error::StorageVersion {
                found,
                expected: STORAGE_VERSION.to_string(),
            });
        }
        Ok(())
    }

    fn add_path(&mut self, path: &Path, directory: bool) -> Result<()> {
        let rel = self.rel(path)?;
        let components: Vec<PathBuf> = rel
            .components()
            .map(|c| PathBuf::from(c.as_os_str()))
            .collect();
        let dir_components = if directory {
            components.len()
        } else {
            components.len().saturating_sub(1)
        };
        let mut dir = self.repo.clone();
        for component in &components[..dir_components] {
            dir.push(component);
            if !dir.exists() {
                fs::create_dir(&dir)?;
                let rel_dir = self.rel(&dir)?;
                self.backend.add(&rel_dir)?;
            } else if !dir.is_dir() {
                return Err(Error::InvalidPath {
                    path: dir.clone(),
                    within: "a directory position".to_string(),
                });
            }
        }
        if !directory {
            if !path.exists() {
                fs::write(path, b"")?;
            }
            self.backend.add(&rel)?;
        }
        Ok(())
    }
}
