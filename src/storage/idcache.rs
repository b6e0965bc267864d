//! Identifier/path cache.
//!
//! Bidirectional mapping between hierarchical identifiers and their
//! storage paths under the tree root. Paths are generated following:
//!
//! ```text
//! <root>/.bt/BUGDIR/bugs/BUG/comments/COMMENT
//! ```
//!
//! Every single-segment identifier (a bugdir, bug, or comment uuid) gets
//! a cache entry mapping it to its relative container path; identifiers
//! with embedded separators (`BUG/values`) are derived by appending the
//! trailing segments to the cached prefix. The cache is a derived index
//! rebuilt from the working tree on demand; the filesystem is always
//! authoritative.
//!
//! The cache file is private to one connected session. Two processes
//! holding it open against the same root will not observe each other's
//! in-memory additions, and the last to disconnect overwrites the file.
//! This lost-update hazard is a known limitation, not something the
//! cache tries to fix.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

use crate::{Error, Result};

/// Structural directory names alternating with identifier segments on
/// disk, ordered by depth. The first entry is the storage marker at the
/// tree root.
pub const SPACER_DIRS: [&str; 3] = [".bt", "bugs", "comments"];

/// Name of the cache file inside the marker directory.
pub const CACHE_FILE: &str = "id-cache";

/// Cached identifier ⇔ path policy for one storage root.
pub struct PathCache {
    root: PathBuf,
    cache_path: PathBuf,
    cache: BTreeMap<String, String>,
    changed: bool,
}

impl PathCache {
    /// Fix the working-tree root. Does not touch disk.
    pub fn new(root: &Path) -> Self {
        let root = root.to_path_buf();
        let cache_path = root.join(SPACER_DIRS[0]).join(CACHE_FILE);
        PathCache {
            root,
            cache_path,
            cache: BTreeMap::new(),
            changed: false,
        }
    }

    /// Build the cache file for an existing marker directory by walking
    /// the tree, then flush it and drop the in-memory map.
    ///
    /// The file contains one `identifier\tpath` line per single-segment
    /// identifier.
    pub fn init(&mut self) -> Result<()> {
        self.cache.clear();
        self.rebuild()?;
        self.write_file()?;
        self.cache.clear();
        self.changed = false;
        Ok(())
    }

    /// Load the cache file, building it first if missing.
    pub fn connect(&mut self) -> Result<()> {
        if !self.cache_path.exists() {
            self.init()
                .map_err(|e| Error::Connection(format!("cannot build id cache: {e}")))?;
        }
        self.changed = false;
        let contents = fs::read_to_string(&self.cache_path)?;
        for line in contents.lines() {
            if let Some((id, path)) = line.split_once('\t') {
                self.cache.insert(id.to_string(), path.to_string());
            }
        }
        Ok(())
    }

    /// Flush the cache file if anything changed, then drop the map.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.changed {
            self.write_file()?;
        }
        self.cache.clear();
        self.changed = false;
        Ok(())
    }

    /// Remove the cache file.
    pub fn destroy(&mut self) -> Result<()> {
        if self.cache_path.exists() {
            fs::remove_file(&self.cache_path)?;
        }
        Ok(())
    }

    /// Absolute path for `id`, re-initializing once on a lookup miss
    /// before failing.
    pub fn path(&mut self, id: &str) -> Result<PathBuf> {
        let rel = self.rel_path(id)?;
        Ok(self.root.join(rel))
    }

    /// Path for `id` relative to the tree root.
    pub fn rel_path(&mut self, id: &str) -> Result<PathBuf> {
        let (uuid, extra) = match id.split_once('/') {
            Some((uuid, extra)) => (uuid, Some(extra)),
            None => (id, None),
        };
        if !self.cache.contains_key(uuid) {
            self.rebuild()?;
            if !self.cache.contains_key(uuid) {
                return Err(Error::UnknownId(uuid.to_string()));
            }
        }
        let mut path = PathBuf::from(&self.cache[uuid]);
        if let Some(extra) = extra {
            path.push(extra);
        }
        Ok(path)
    }

    /// Record a path for a new single-segment identifier and return it.
    ///
    /// The path is the parent's next spacer subdirectory (or the root
    /// marker directory without a parent) joined with the identifier.
    /// Multi-segment identifiers are never cached; their paths are
    /// always derived from the leading segment.
    pub fn add(&mut self, id: &str, parent: Option<&str>) -> Result<PathBuf> {
        if id.contains('/') || self.cache.contains_key(id) {
            return self.path(id);
        }
        let rel = match parent {
            None => PathBuf::from(SPACER_DIRS[0]).join(id),
            Some(parent) => {
                if parent.contains('/') {
                    return Err(Error::UnknownId(parent.to_string()));
                }
                let parent_rel = self.rel_path(parent)?;
                let spacer = child_spacer(&parent_rel)?;
                parent_rel.join(spacer).join(id)
            }
        };
        self.cache
            .insert(id.to_string(), path_to_string(&rel));
        self.changed = true;
        Ok(self.root.join(rel))
    }

    /// Drop the cache entry for a single-segment identifier. A no-op for
    /// multi-segment identifiers and unknown ids.
    pub fn remove(&mut self, id: &str) {
        if id.contains('/') {
            return;
        }
        if self.cache.remove(id).is_some() {
            self.changed = true;
        }
    }

    /// Drop every cache entry whose path starts with `prefix` (relative
    /// to the root). Used when a subtree is removed recursively.
    pub fn remove_prefix(&mut self, prefix: &Path) {
        let prefix = path_to_string(prefix);
        let doomed: Vec<String> = self
            .cache
            .iter()
            .filter(|(_, path)| path.starts_with(&prefix))
            .map(|(id, _)| id.clone())
            .collect();
        for id in doomed {
            self.cache.remove(&id);
            self.changed = true;
        }
    }

    /// Inverse of [`PathCache::path`]: derive the identifier stored at a
    /// path under the root.
    ///
    /// The path must start inside the root marker directory, and the
    /// derived identifier must not terminate in a spacer-directory name.
    pub fn id(&self, path: &Path) -> Result<String> {
        let abs = self.root.join(path);
        let rel = abs
            .strip_prefix(&self.root)
            .map_err(|_| Error::InvalidPath {
                path: abs.clone(),
                within: self.root.display().to_string(),
            })?;
        let rel = path_to_string(rel);
        if rel.is_empty() || !rel.starts_with(SPACER_DIRS[0]) {
            return Err(Error::InvalidPath {
                path: abs,
                within: SPACER_DIRS[0].to_string(),
            });
        }

        let mut remainder = rel.clone();
        let mut id: Option<String> = None;
        for spacer in SPACER_DIRS {
            let prefix = format!("{spacer}/");
            if !remainder.starts_with(&prefix) {
                break;
            }
            let rest = remainder[prefix.len()..].to_string();
            id = Some(rest.clone());
            match rest.split_once('/') {
                None => break,
                Some((_uuid, tail)) => remainder = tail.to_string(),
            }
        }
        let id = id.ok_or(Error::InvalidPath {
            path: abs.clone(),
            within: SPACER_DIRS[0].to_string(),
        })?;

        for spacer in SPACER_DIRS {
            if id == spacer || id.ends_with(&format!("/{spacer}")) {
                return Err(Error::SpacerCollision {
                    path: abs,
                    spacer: spacer.to_string(),
                });
            }
        }
        Ok(id)
    }

    /// Walk the marker directory merging every single-segment identifier
    /// found into the map, marking the cache dirty on any change.
    fn rebuild(&mut self) -> Result<()> {
        let spaced_root = self.root.join(SPACER_DIRS[0]);
        for entry in WalkDir::new(&spaced_root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_dir() || entry.path() == spaced_root.as_path() {
                continue;
            }
            let id = match self.id(entry.path()) {
                Ok(id) => id,
                Err(Error::InvalidPath { .. }) | Err(Error::SpacerCollision { .. }) => continue,
                Err(e) => return Err(e),
            };
            if id.contains('/') {
                continue;
            }
            let rel = match entry.path().strip_prefix(&self.root) {
                Ok(rel) => path_to_string(rel),
                Err(_) => continue,
            };
            if let Some(previous) = self.cache.get(&id) {
                if *previous != rel {
                    warn!("multiple paths for {}:\n  {}\n  {}", id, previous, rel);
                    self.cache.insert(id, rel);
                    self.changed = true;
                }
            } else {
                self.cache.insert(id, rel);
                self.changed = true;
            }
        }
        Ok(())
    }

    fn write_file(&self) -> Result<()> {
        let mut out = String::new();
        for (id, path) in &self.cache {
            out.push_str(id);
            out.push('\t');
            out.push_str(path);
            out.push('\n');
        }
        fs::write(&self.cache_path, out)?;
        Ok(())
    }
}

/// The spacer name separating `parent`'s children from it, derived from
/// the parent's own position in the spacer sequence.
fn child_spacer(parent_rel: &Path) -> Result<&'static str> {
    let components: Vec<String> = parent_rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let parent_spacer = components
        .len()
        .checked_sub(2)
        .map(|i| components[i].clone())
        .ok_or_else(|| Error::Other(format!("malformed cached path {parent_rel:?}")))?;
    let index = SPACER_DIRS
        .iter()
        .position(|s| *s == parent_spacer)
        .ok_or_else(|| Error::Other(format!("no spacer in cached path {parent_rel:?}")))?;
    SPACER_DIRS.get(index + 1).copied().ok_or_else(|| {
        Error::Other(format!(
            "identifiers under {parent_spacer:?} cannot have children"
        ))
    })
}

fn path_to_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.join("/")
}
