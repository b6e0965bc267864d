//! The no-history adapter.
//!
//! Implements the adapter contract over the plain filesystem so callers
//! get a working store in trees no history tool owns. Everything that
//! needs history reports an invalid revision or unsupported operation.

use std::path::{Path, PathBuf};

use super::{Backend, containing_dir, require_repo};
use crate::{Error, Result};

pub struct NoVcs {
    repo: Option<PathBuf>,
}

impl NoVcs {
    pub fn new() -> Self {
        NoVcs { repo: None }
    }

    fn no_revisions(&self, operation: &str) -> Error {
        Error::NotSupported {
            name: "none",
            operation: operation.to_string(),
        }
    }
}

impl Default for NoVcs {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for NoVcs {
    fn name(&self) -> &'static str {
        "none"
    }

    fn versioned(&self) -> bool {
        false
    }

    fn version(&self) -> Option<String> {
        Some("0".to_string())
    }

    fn detect(&self, _path: &Path) -> bool {
        true
    }

    fn root(&mut self, path: &Path) -> Result<PathBuf> {
        let root = containing_dir(path);
        self.repo = Some(root.clone());
        Ok(root)
    }

    fn init(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        Ok(())
    }

    fn add(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn remove(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn update(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn read_file(&self, _path: &Path, revision: &str) -> Result<Vec<u8>> {
        let _ = require_repo(&self.repo)?;
        Err(Error::InvalidRevision(format!(
            "{revision}: the none backend does not support revision specifiers"
        )))
    }

    fn is_dir_at(&self, _path: &Path, revision: &str) -> Result<bool> {
        Err(Error::InvalidRevision(revision.to_string()))
    }

    fn list_dir_at(&self, _path: &Path, revision: &str) -> Result<Vec<String>> {
        Err(Error::InvalidRevision(revision.to_string()))
    }

    fn commit(&self, _message_file: &Path, _allow_empty: bool) -> Result<Option<String>> {
        Ok(None)
    }

    fn revision_id(&self, _index: i64) -> Result<Option<String>> {
        Ok(None)
    }

    fn diff(&self, _revision: &str) -> Result<String> {
        Err(self.no_revisions("diff"))
    }
}
