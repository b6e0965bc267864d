//! Git adapter.
//!
//! Shells out to the `git` client, one process per primitive.

use std::fs;
use std::path::{Path, PathBuf};

use super::{
    Backend, any_in, containing_dir, invoke_client, pick_revision, require_repo,
    search_parent_directories,
};
use crate::{Error, Result};

const CLIENT: &str = "git";

pub struct Git {
    repo: Option<PathBuf>,
}

impl Git {
    pub fn new() -> Self {
        Git { repo: None }
    }

    fn client(&self, args: &[&str], expect: &[i32]) -> Result<crate::exec::Output> {
        let repo = require_repo(&self.repo)?;
        invoke_client(CLIENT, repo, args, expect)
    }

    /// Hash of every commit reachable from HEAD, oldest first, or `None`
    /// before the first commit.
    fn revisions(&self) -> Result<Option<Vec<String>>> {
        let out = self.client(&["rev-list", "--first-parent", "--reverse", "HEAD"], &[0, 128])?;
        if out.status == 128 {
            if out
                .stderr
                .starts_with("fatal: ambiguous argument 'HEAD': unknown ")
            {
                return Ok(None);
            }
            return Err(Error::CommandFailed {
                command: "git rev-list --first-parent --reverse HEAD".to_string(),
                status: out.status,
                stdout: out.stdout,
                stderr: out.stderr,
            });
        }
        Ok(Some(out.stdout.lines().map(str::to_string).collect()))
    }
}

impl Default for Git {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for Git {
    fn name(&self) -> &'static str {
        "git"
    }

    fn version(&self) -> Option<String> {
        let out = invoke_client(CLIENT, Path::new("."), &["--version"], &[0]).ok()?;
        Some(out.stdout.trim().to_string())
    }

    fn user_id(&self) -> Option<String> {
        let name = self
            .client(&["config", "user.name"], &[0, 1])
            .ok()
            .filter(|o| o.status == 0)
            .map(|o| o.stdout.trim_end_matches('\n').to_string())
            .unwrap_or_default();
        let email = self
            .client(&["config", "user.email"], &[0, 1])
            .ok()
            .filter(|o| o.status == 0)
            .map(|o| o.stdout.trim_end_matches('\n').to_string())
            .unwrap_or_default();
        if name.is_empty() && email.is_empty() {
            return None;
        }
        if email.is_empty() {
            Some(name)
        } else if name.is_empty() {
            Some(email)
        } else {
            Some(format!("{name} <{email}>"))
        }
    }

    fn detect(&self, path: &Path) -> bool {
        search_parent_directories(path, ".git").is_some()
    }

    fn root(&mut self, path: &Path) -> Result<PathBuf> {
        let cwd = containing_dir(path);
        let out = invoke_client(CLIENT, &cwd, &["rev-parse", "--show-toplevel"], &[0])?;
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
        let vcs_dir = repo.join(".git");
        if vcs_dir.exists() {
            fs::remove_dir_all(&vcs_dir)?;
        }
        Ok(())
    }

    fn add(&self, path: &Path) -> Result<()> {
        let repo = require_repo(&self.repo)?;
        if repo.join(path).is_dir() {
            // Git tracks files only; directories appear with their contents.
            return Ok(());
        }
        self.client(&["add", &path.to_string_lossy()], &[0])?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let repo = require_repo(&self.repo)?;
        if repo.join(path).is_dir() {
            return Ok(());
        }
        self.client(&["rm", "-f", &path.to_string_lossy()], &[0])?;
        Ok(())
    }

    fn update(&self, path: &Path) -> Result<()> {
        self.add(path)
    }

    fn read_file(&self, path: &Path, revision: &str) -> Result<Vec<u8>> {
        let spec = format!("{}:{}", revision, path.to_string_lossy());
        let out = self.client(&["show", &spec], &[0])?;
        Ok(out.stdout.into_bytes())
    }

    fn is_dir_at(&self, path: &Path, revision: &str) -> Result<bool> {
        let spec = format!("{}:{}", revision, path.to_string_lossy());
        let out = self.client(&["ls-tree", &spec], &[0, 128])?;
        if out.status != 0 {
            if out.stderr.contains("not a tree object") {
                return Ok(false);
            }
            return Err(Error::CommandFailed {
                command: format!("git ls-tree {spec}"),
                status: out.status,
                stdout: out.stdout,
                stderr: out.stderr,
            });
        }
        Ok(true)
    }

    fn list_dir_at(&self, path: &Path, revision: &str) -> Result<Vec<String>> {
        let spec = format!("{}:{}", revision, path.to_string_lossy());
        let out = self.client(&["ls-tree", "--name-only", &spec], &[0])?;
        Ok(out
            .stdout
            .trim_end_matches('\n')
            .lines()
            .map(str::to_string)
            .collect())
    }

    fn commit(&self, message_file: &Path, allow_empty: bool) -> Result<Option<String>> {
        let message_file = message_file.to_string_lossy();
        if allow_empty {
            self.client(&["commit", "--allow-empty", "--file", &message_file], &[0])?;
        } else {
            let out = self.client(&["commit", "--file", &message_file], &[0, 1])?;
            if out.status != 0 {
                if any_in(
                    &["nothing to commit", "nothing added to commit"],
                    &out.stdout,
                ) {
                    return Err(Error::EmptyCommit);
                }
                return Err(Error::CommandFailed {
                    command: "git commit".to_string(),
                    status: out.status,
                    stdout: out.stdout,
                    stderr: out.stderr,
                });
            }
        }
        self.revision_id(-1)
    }

    fn revision_id(&self, index: i64) -> Result<Option<String>> {
        match self.revisions()? {
            Some(revisions) => Ok(pick_revision(&revisions, index)),
            None => Ok(None),
        }
    }

    fn diff(&self, revision: &str) -> Result<String> {
        let out = self.client(&["diff", revision], &[0])?;
        Ok(out.stdout)
    }
}
