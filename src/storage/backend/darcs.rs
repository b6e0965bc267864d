//! Darcs adapter.
//!
//! Shells out to the `darcs` client. Darcs names revisions by patch
//! name rather than hash, notices file modifications and removals on
//! its own, and only grew revision-aware queries over time, so several
//! primitives are gated on the installed version.

use std::cell::OnceCell;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::{
    Backend, any_in, fallback_user_id, invoke_client, pick_revision, require_repo,
    search_parent_directories,
};
use crate::storage::version;
use crate::{Error, Result};

const CLIENT: &str = "darcs";

static RECORDED_PATCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Finished recording patch '(.*)'").unwrap());

pub struct Darcs {
    repo: Option<PathBuf>,
    cached_version: OnceCell<Option<String>>,
}

impl Darcs {
    pub fn new() -> Self {
        Darcs {
            repo: None,
            cached_version: OnceCell::new(),
        }
    }

    fn client(&self, args: &[&str], expect: &[i32]) -> Result<crate::exec::Output> {
        let repo = require_repo(&self.repo)?;
        invoke_client(CLIENT, repo, args, expect)
    }

    /// Strictly newer than `other`? False when the version is unknown.
    fn version_gt(&self, other: &str) -> bool {
        match self.version() {
            Some(installed) => version::compare_str(&installed, other) == Ordering::Greater,
            None => false,
        }
    }

    fn unsupported(&self, operation: &str, floor: &str) -> Error {
        Error::NotSupported {
            name: "darcs",
            operation: format!("{operation} (requires darcs > {floor})"),
        }
    }

    /// Patch names in the repository, oldest first.
    fn revisions(&self) -> Result<Vec<String>> {
        let out = self.client(&["changes"], &[0])?;
        let mut names = patch_names(&out.stdout);
        names.reverse();
        Ok(names)
    }
}

impl Default for Darcs {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract patch names from `darcs changes` output (newest first).
fn patch_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix("  * "))
        .map(str::to_string)
        .collect()
}

/// Normalize a `darcs show files` line to a root-relative path.
fn normalize_listing(line: &str) -> Option<&str> {
    let line = line.trim_end();
    if line.is_empty() || line == "." {
        return None;
    }
    Some(line.strip_prefix("./").unwrap_or(line))
}

impl Backend for Darcs {
    fn name(&self) -> &'static str {
        "darcs"
    }

    fn version(&self) -> Option<String> {
        self.cached_version
            .get_or_init(|| {
                let out = invoke_client(CLIENT, Path::new("."), &["--version"], &[0]).ok()?;
                out.stdout.split_whitespace().next().map(str::to_string)
            })
            .clone()
    }

    fn user_id(&self) -> Option<String> {
        // Per-repository prefs take precedence over the user's home
        // prefs, author over email.
        let repo_prefs = self.repo.as_ref().map(|r| r.join("_darcs/prefs"));
        let home_prefs = dirs::home_dir().map(|h| h.join(".darcs"));
        for pref_file in ["author", "email"] {
            for prefs_dir in [&repo_prefs, &home_prefs].into_iter().flatten() {
                let pref_path = prefs_dir.join(pref_file);
                if let Ok(contents) = std::fs::read_to_string(&pref_path) {
                    let contents = contents.trim();
                    if !contents.is_empty() {
                        return Some(contents.to_string());
                    }
                }
            }
        }
        for env_variable in ["DARCS_EMAIL", "EMAIL"] {
            if let Ok(value) = std::env::var(env_variable) {
                return Some(value);
            }
        }
        None
    }

    fn detect(&self, path: &Path) -> bool {
        search_parent_directories(path, "_darcs").is_some()
    }

    fn root(&mut self, path: &Path) -> Result<PathBuf> {
        let darcs_dir = search_parent_directories(path, "_darcs").ok_or_else(|| {
            Error::UnableToRoot {
                vcs: "darcs".to_string(),
                path: path.to_path_buf(),
            }
        })?;
        let root = darcs_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        self.repo = Some(root.clone());
        Ok(root)
    }

    fn init(&mut self, path: &Path) -> Result<()> {
        invoke_client(CLIENT, path, &["init"], &[0])?;
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        let repo = require_repo(&self.repo)?;
        let vcs_dir = repo.join("_darcs");
        if vcs_dir.exists() {
            std::fs::remove_dir_all(&vcs_dir)?;
        }
        Ok(())
    }

    fn add(&self, path: &Path) -> Result<()> {
        let repo = require_repo(&self.repo)?;
        if repo.join(path).is_dir() {
            return Ok(());
        }
        let path = path.to_string_lossy();
        if self.version_gt("0.9.10") {
            self.client(&["add", "--boring", &path], &[0])?;
        } else {
            // Ancient darcs lacks --boring.
            self.client(&["add", &path], &[0])?;
        }
        Ok(())
    }

    fn remove(&self, _path: &Path) -> Result<()> {
        // Darcs notices removal once the file disappears from disk.
        Ok(())
    }

    fn update(&self, _path: &Path) -> Result<()> {
        // Darcs notices content changes on its own.
        Ok(())
    }

    fn read_file(&self, path: &Path, revision: &str) -> Result<Vec<u8>> {
        if !self.version_gt("2.0.0") {
            return Err(self.unsupported("reading files at a revision", "2.0.0"));
        }
        let out = self.client(
            &[
                "show",
                "contents",
                "--patch",
                revision,
                &path.to_string_lossy(),
            ],
            &[0],
        )?;
        Ok(out.stdout.into_bytes())
    }

    fn is_dir_at(&self, path: &Path, revision: &str) -> Result<bool> {
        if !self.version_gt("2.3.1") {
            return Err(self.unsupported("directory queries at a revision", "2.3.1"));
        }
        let out = self.client(
            &[
                "show",
                "files",
                "--no-files",
                "--no-pending",
                "--patch",
                revision,
            ],
            &[0],
        )?;
        let path = path.to_string_lossy();
        Ok(out
            .stdout
            .lines()
            .filter_map(normalize_listing)
            .any(|dir| dir == path))
    }

    fn list_dir_at(&self, path: &Path, revision: &str) -> Result<Vec<String>> {
        if !self.version_gt("2.3.1") {
            return Err(self.unsupported("directory listings at a revision", "2.3.1"));
        }
        let path = path.to_string_lossy();
        let path = path.trim_end_matches('/');
        let out = self.client(
            &["show", "files", "--no-pending", "--patch", revision, path],
            &[0],
        )?;
        let prefix = format!("{path}/");
        let mut children = Vec::new();
        for entry in out.stdout.lines().filter_map(normalize_listing) {
            if entry == path {
                continue;
            }
            if let Some(rest) = entry.strip_prefix(&prefix) {
                if !rest.is_empty() && !rest.contains('/') {
                    children.push(rest.to_string());
                }
            }
        }
        Ok(children)
    }

    fn commit(&self, message_file: &Path, allow_empty: bool) -> Result<Option<String>> {
        let author = match self.user_id() {
            Some(id) if id.contains('@') => id,
            Some(id) => format!("{id} <{id}@invalid.com>"),
            None => fallback_user_id(),
        };
        let message_file = message_file.to_string_lossy();
        let out = self.client(
            &[
                "record",
                "--all",
                "--author",
                &author,
                "--logfile",
                &message_file,
            ],
            &[0, 1],
        )?;
        if any_in(&["No changes!"], &out.stdout) {
            if !allow_empty {
                return Err(Error::EmptyCommit);
            }
            // Darcs records no empty patch; report the last real one.
            return self.revision_id(-1);
        }
        let captured = RECORDED_PATCH
            .captures(&out.stdout)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::CommandFailed {
                command: "darcs record".to_string(),
                status: out.status,
                stdout: out.stdout.clone(),
                stderr: out.stderr.clone(),
            })?;
        Ok(Some(captured))
    }

    fn revision_id(&self, index: i64) -> Result<Option<String>> {
        Ok(pick_revision(&self.revisions()?, index))
    }

    fn diff(&self, revision: &str) -> Result<String> {
        let revisions = self.revisions()?;
        let position = revisions
            .iter()
            .position(|r| r == revision)
            .ok_or_else(|| Error::InvalidRevision(revision.to_string()))?;
        let out = if position + 1 < revisions.len() {
            // Diff every patch after `revision` against the working tree.
            self.client(
                &[
                    "diff",
                    "--unified",
                    "--from-patch",
                    &revisions[position + 1],
                ],
                &[0],
            )?
        } else {
            self.client(&["diff", "--unified"], &[0])?
        };
        Ok(out.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_names_newest_first() {
        let output = "\
Tue Jan  5 09:00:00 UTC 2021  Jane <jane@example.com>
  * second patch

Mon Jan  4 12:00:00 UTC 2021  Jane <jane@example.com>
  * first patch
";
        assert_eq!(patch_names(output), vec!["second patch", "first patch"]);
    }

    #[test]
    fn test_recorded_patch_scraping() {
        let output = "Finished recording patch 'fix the widget'\n";
        let name = RECORDED_PATCH
            .captures(output)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .unwrap();
        assert_eq!(name, "fix the widget");
    }

    #[test]
    fn test_normalize_listing() {
        assert_eq!(normalize_listing("."), None);
        assert_eq!(normalize_listing(""), None);
        assert_eq!(normalize_listing("./.bt/abc"), Some(".bt/abc"));
        assert_eq!(normalize_listing(".bt/abc"), Some(".bt/abc"));
    }

    #[test]
    fn test_detect_without_metadata_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let backend = Darcs::new();
        assert!(!backend.detect(temp.path()));
        std::fs::create_dir(temp.path().join("_darcs")).unwrap();
        assert!(backend.detect(temp.path()));
    }

    #[test]
    fn test_root_finds_repository_above() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("_darcs")).unwrap();
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        let mut backend = Darcs::new();
        assert_eq!(backend.root(&nested).unwrap(), temp.path());
    }
}
