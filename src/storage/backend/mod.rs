//! Version-control adapters.
//!
//! Each adapter translates the storage contract's primitives into
//! invocations of one external history tool and parses its textual
//! output back into the normalized model. The `none` adapter implements
//! the same contract over the plain filesystem, so callers always get a
//! working store even without a history tool.

pub mod darcs;
pub mod git;
pub mod hg;
pub mod monotone;
pub mod none;

pub use darcs::Darcs;
pub use git::Git;
pub use hg::Hg;
pub use monotone::Monotone;
pub use none::NoVcs;

use std::path::{Path, PathBuf};

use crate::exec::{self, Output};
use crate::{Error, Result};

/// Primitive operations every concrete history-tool adapter implements.
///
/// All tool-agnostic logic (path cache lifecycle, generic get/set/commit
/// plumbing, revision-aware identifier lookup) lives in
/// [`crate::storage::Store`]; adapters only cover the steps that differ
/// per tool. Paths handed to adapters are relative to the repository
/// root resolved by [`Backend::root`].
pub trait Backend {
    /// Adapter name, used for selection and error messages.
    fn name(&self) -> &'static str;

    /// Whether this adapter keeps history at all.
    fn versioned(&self) -> bool {
        true
    }

    /// Installed tool version, or `None` when the tool is unavailable.
    fn version(&self) -> Option<String>;

    /// Whether the external tool is installed on this machine.
    fn installed(&self) -> bool {
        self.version().is_some()
    }

    /// The tool's configured user identity (e.g. `Jane <jane@example.com>`),
    /// if it has one.
    fn user_id(&self) -> Option<String> {
        None
    }

    /// Whether `path` (or an ancestor) is recognized as a repository of
    /// this tool.
    fn detect(&self, path: &Path) -> bool;

    /// Resolve the repository root containing `path` and remember it as
    /// the working directory for every later invocation.
    fn root(&mut self, path: &Path) -> Result<PathBuf>;

    /// Begin versioning the tree based at `path`.
    fn init(&mut self, path: &Path) -> Result<()>;

    /// Remove whatever [`Backend::init`] created.
    fn destroy(&mut self) -> Result<()>;

    /// Register the already-created file or directory at `path`.
    fn add(&self, path: &Path) -> Result<()>;

    /// Unregister the file at `path`. Filesystem removal is the store's
    /// job; adapters only update their own bookkeeping.
    fn remove(&self, path: &Path) -> Result<()>;

    /// Notify the tool that the versioned file at `path` changed.
    fn update(&self, path: &Path) -> Result<()>;

    /// File contents at `path` as of `revision`.
    fn read_file(&self, path: &Path, revision: &str) -> Result<Vec<u8>>;

    /// Flat listing of every path tracked at `revision`, for tools whose
    /// query interface is a manifest. `Ok(None)` means the tool answers
    /// directory queries directly and lookups should walk instead.
    fn manifest(&self, _revision: &str) -> Result<Option<Vec<String>>> {
        Ok(None)
    }

    /// Whether `path` was a directory as of `revision`.
    fn is_dir_at(&self, path: &Path, revision: &str) -> Result<bool>;

    /// Names inside the directory `path` as of `revision`.
    fn list_dir_at(&self, path: &Path, revision: &str) -> Result<Vec<String>>;

    /// Commit the working tree using the contents of `message_file`.
    ///
    /// Returns the new revision id, `Ok(None)` when the backend keeps no
    /// history, and [`Error::EmptyCommit`] when nothing changed and
    /// `allow_empty` is false. Tools that cannot record an empty commit
    /// return the most recent existing revision instead.
    fn commit(&self, message_file: &Path, allow_empty: bool) -> Result<Option<String>>;

    /// Name of the revision at signed relative `index`, or `Ok(None)` on
    /// a miss (out of range, or no commits yet).
    fn revision_id(&self, index: i64) -> Result<Option<String>>;

    /// Unified diff from `revision` to the current working tree.
    fn diff(&self, revision: &str) -> Result<String>;
}

/// The supported adapters, in no particular order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Darcs,
    Git,
    Hg,
    Monotone,
    None,
}

/// Detection preference order tried by [`detect_backend`] when the
/// caller supplies no explicit ordering.
pub const DEFAULT_ORDER: [BackendKind; 4] = [
    BackendKind::Darcs,
    BackendKind::Git,
    BackendKind::Hg,
    BackendKind::Monotone,
];

impl BackendKind {
    /// Parse an adapter name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "darcs" => Some(Self::Darcs),
            "git" => Some(Self::Git),
            "hg" | "mercurial" => Some(Self::Hg),
            "monotone" | "mtn" => Some(Self::Monotone),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Darcs => "darcs",
            Self::Git => "git",
            Self::Hg => "hg",
            Self::Monotone => "monotone",
            Self::None => "none",
        }
    }

    /// Instantiate the adapter.
    pub fn create(self) -> Box<dyn Backend> {
        match self {
            Self::Darcs => Box::new(Darcs::new()),
            Self::Git => Box::new(Git::new()),
            Self::Hg => Box::new(Hg::new()),
            Self::Monotone => Box::new(Monotone::new()),
            Self::None => Box::new(NoVcs::new()),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pick the first adapter in `order` that recognizes `path`, falling
/// back to the no-history adapter.
pub fn detect_backend(path: &Path, order: &[BackendKind]) -> Box<dyn Backend> {
    for kind in order {
        let backend = kind.create();
        if backend.detect(path) {
            return backend;
        }
    }
    Box::new(NoVcs::new())
}

/// Instantiate an adapter by name.
pub fn backend_by_name(name: &str) -> Option<Box<dyn Backend>> {
    BackendKind::from_name(name).map(BackendKind::create)
}

/// Run this adapter's external client in `cwd`.
pub(crate) fn invoke_client(
    client: &str,
    cwd: &Path,
    args: &[&str],
    expect: &[i32],
) -> Result<Output> {
    exec::invoke(client, args, cwd, None, expect)
}

/// Pick a revision by signed relative index from an oldest-first list.
///
/// `1` is the very first revision, `-1` the newest; `0` and any index
/// past either end miss.
pub(crate) fn pick_revision(revisions: &[String], index: i64) -> Option<String> {
    let len = revisions.len() as i64;
    let position = if index > 0 {
        index - 1
    } else if index < 0 {
        len + index
    } else {
        return None;
    };
    if position < 0 || position >= len {
        return None;
    }
    revisions.get(position as usize).cloned()
}

/// Find `name` in `path` or any of its parents, returning the match.
pub(crate) fn search_parent_directories(path: &Path, name: &str) -> Option<PathBuf> {
    let mut dir = if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent()?.to_path_buf()
    };
    loop {
        let candidate = dir.join(name);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Whether any of the needles occurs in `haystack`.
pub(crate) fn any_in(needles: &[&str], haystack: &str) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Resolve a directory to run client commands in: the path itself, or
/// its parent when it names a file.
pub(crate) fn containing_dir(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.to_path_buf()
    } else {
        path.parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Fallback user identity assembled from the environment when the tool
/// has none configured.
pub(crate) fn fallback_user_id() -> String {
    let name = std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "user".to_string());
    if let Ok(email) = std::env::var("EMAIL") {
        return format!("{name} <{email}>");
    }
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{name} <{name}@{host}>")
}

/// Shared repository-root bookkeeping for rooted adapters.
pub(crate) fn require_repo(repo: &Option<PathBuf>) -> Result<&Path> {
    repo.as_deref().ok_or(Error::NotRooted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_kind_name_round_trip() {
        for kind in [
            BackendKind::Darcs,
            BackendKind::Git,
            BackendKind::Hg,
            BackendKind::Monotone,
            BackendKind::None,
        ] {
            assert_eq!(BackendKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(BackendKind::from_name("cvs"), None);
    }

    #[test]
    fn test_detect_falls_back_to_none() {
        let temp = TempDir::new().unwrap();
        let backend = detect_backend(temp.path(), &DEFAULT_ORDER);
        assert_eq!(backend.name(), "none");
        assert!(!backend.versioned());
    }

    #[test]
    fn test_detect_respects_order() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        let backend = detect_backend(temp.path(), &DEFAULT_ORDER);
        assert_eq!(backend.name(), "git");
        // An explicit empty order skips detection entirely.
        let backend = detect_backend(temp.path(), &[]);
        assert_eq!(backend.name(), "none");
    }

    #[test]
    fn test_pick_revision() {
        let revisions: Vec<String> = ["r1", "r2", "r3"].iter().map(|s| s.to_string()).collect();
        assert_eq!(pick_revision(&revisions, 1).as_deref(), Some("r1"));
        assert_eq!(pick_revision(&revisions, 3).as_deref(), Some("r3"));
        assert_eq!(pick_revision(&revisions, -1).as_deref(), Some("r3"));
        assert_eq!(pick_revision(&revisions, -3).as_deref(), Some("r1"));
        assert_eq!(pick_revision(&revisions, 0), None);
        assert_eq!(pick_revision(&revisions, 4), None);
        assert_eq!(pick_revision(&revisions, -4), None);
    }

    #[test]
    fn test_search_parent_directories() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        fs::create_dir(temp.path().join(".marker")).unwrap();
        assert_eq!(
            search_parent_directories(&nested, ".marker"),
            Some(temp.path().join(".marker"))
        );
        assert_eq!(search_parent_directories(&nested, ".absent-marker"), None);
    }
}
