//! Mercurial adapter.
//!
//! Shells out to the `hg` client. Mercurial's revision-aware queries go
//! through its manifest: a flat listing of every tracked file, from
//! which directory structure is reconstructed.

use std::fs;
use std::path::{Path, PathBuf};

use super::{
    Backend, any_in, containing_dir, invoke_client, require_repo, search_parent_directories,
};
use crate::{Error, Result};

const CLIENT: &str = "hg";

pub struct Hg {
    repo: Option<PathBuf>,
}

impl Hg {
    pub fn new() -> Self {
        Hg { repo: None }
    }

    fn client(&self, args: &[&str], expect: &[i32]) -> Result<crate::exec::Output> {
        let repo = require_repo(&self.repo)?;
        invoke_client(CLIENT, repo, args, expect)
    }

    fn manifest_files(&self, revision: &str) -> Result<Vec<String>> {
        let out = self.client(&["manifest", "--rev", revision], &[0])?;
        Ok(out.stdout.lines().map(str::to_string).collect())
    }
}

impl Default for Hg {
    fn default() -> Self {
        Self::new()
    }
}

/// First-level child names of `path` reconstructed from a flat manifest
/// file listing.
fn children_from_manifest(files: &[String], path: &str) -> Vec<String> {
    let prefix = format!("{}/", path.trim_end_matches('/'));
    let mut children: Vec<String> = files
        .iter()
        .filter_map(|f| f.strip_prefix(&prefix))
        .map(|rest| rest.split('/').next().unwrap_or(rest).to_string())
        .collect();
    children.sort_unstable();
    children.dedup();
    children
}

impl Backend for Hg {
    fn name(&self) -> &'static str {
        "hg"
    }

    fn version(&self) -> Option<String> {
        let out = invoke_client(CLIENT, Path::new("."), &["--version", "--quiet"], &[0]).ok()?;
        let first = out.stdout.lines().next()?.trim().to_string();
        // "Mercurial Distributed SCM (version 6.4.5)" -> "6.4.5"
        if let Some(start) = first.find("(version ") {
            let rest = &first[start + "(version ".len()..];
            if let Some(end) = rest.find(')') {
                return Some(rest[..end].to_string());
            }
        }
        Some(first)
    }

    fn user_id(&self) -> Option<String> {
        let out = self.client(&["showconfig", "ui.username"], &[0, 1]).ok()?;
        let username = out.stdout.trim();
        if username.is_empty() {
            None
        } else {
            Some(username.to_string())
        }
    }

    fn detect(&self, path: &Path) -> bool {
        search_parent_directories(path, ".hg").is_some()
    }

    fn root(&mut self, path: &Path) -> Result<PathBuf> {
        let cwd = containing_dir(path);
        let out = invoke_client(CLIENT, &cwd, &["root"], &[0])?;
        let root = PathBuf::from(out.stdout.trim());
        self.repo = Some(root.clone());
        Ok(root)
    }

    fn init(&mut self, path: &Path) -> Result<()> {
        invoke_client(CLIENT, path, &["init"], &[0])?;
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        let repo = require_repo(&self.repo)?;
        let vcs_dir = repo.join(".hg");
        if vcs_dir.exists() {
            fs::remove_dir_all(&vcs_dir)?;
        }
        Ok(())
    }

    fn add(&self, path: &Path) -> Result<()> {
        self.client(&["add", &path.to_string_lossy()], &[0])?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.client(&["rm", "--force", &path.to_string_lossy()], &[0])?;
        Ok(())
    }

    fn update(&self, _path: &Path) -> Result<()> {
        // Mercurial notices content changes on its own.
        Ok(())
    }

    fn read_file(&self, path: &Path, revision: &str) -> Result<Vec<u8>> {
        let out = self.client(&["cat", "-r", revision, &path.to_string_lossy()], &[0])?;
        Ok(out.stdout.into_bytes())
    }

    fn manifest(&self, revision: &str) -> Result<Option<Vec<String>>> {
        Ok(Some(self.manifest_files(revision)?))
    }

    fn is_dir_at(&self, path: &Path, revision: &str) -> Result<bool> {
        // The manifest lists files only; a tracked path that is absent
        // from it can only be a directory.
        let files = self.manifest_files(revision)?;
        let path = path.to_string_lossy();
        Ok(!files.iter().any(|f| *f == path))
    }

    fn list_dir_at(&self, path: &Path, revision: &str) -> Result<Vec<String>> {
        let files = self.manifest_files(revision)?;
        Ok(children_from_manifest(&files, &path.to_string_lossy()))
    }

    fn commit(&self, message_file: &Path, allow_empty: bool) -> Result<Option<String>> {
        let message_file = message_file.to_string_lossy();
        let out = self.client(&["commit", "--logfile", &message_file], &[0, 1])?;
        if any_in(&["nothing changed"], &out.stdout) && !allow_empty {
            return Err(Error::EmptyCommit);
        }
        // Mercurial records no empty revision; an allowed empty commit
        // reports the most recent existing one.
        self.revision_id(-1)
    }

    fn revision_id(&self, index: i64) -> Result<Option<String>> {
        if index == 0 {
            return Ok(None);
        }
        // Positive indexes are 1-based from the first commit; mercurial's
        // own local numbering is 0-based, negatives count back from tip.
        let rev = if index > 0 { index - 1 } else { index };
        let out = self.client(&["identify", "--rev", &rev.to_string(), "--id"], &[0, 255])?;
        if out.status != 0 {
            if any_in(&["unknown revision", "abort:"], &out.stderr) {
                return Ok(None);
            }
            return Err(Error::CommandFailed {
                command: format!("hg identify --rev {rev} --id"),
                status: out.status,
                stdout: out.stdout,
                stderr: out.stderr,
            });
        }
        let id = out.stdout.trim().to_string();
        if id == "000000000000" {
            // Before the initial commit.
            return Ok(None);
        }
        Ok(Some(id))
    }

    fn diff(&self, revision: &str) -> Result<String> {
        let out = self.client(&["diff", "-r", revision, "--git"], &[0])?;
        Ok(out.stdout)
    }
}
