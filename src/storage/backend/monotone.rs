//! Monotone adapter.
//!
//! Shells out to the `mtn` client through its automation interface.
//! Monotone keeps its database outside the workspace, so initialization
//! creates a database file and a signing key alongside the tree, and
//! later invocations carry `--db`/`--key`/`--keydir` when this process
//! created them.

use std::cell::OnceCell;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use super::{
    Backend, any_in, containing_dir, invoke_client, pick_revision, require_repo,
    search_parent_directories,
};
use crate::storage::version;
use crate::{Error, Result};

const CLIENT: &str = "mtn";
const BRANCH: &str = "bugtrail";
const KEY: &str = "bugtrail@localhost";
const DB_FILE: &str = "bugtrail.db";
const KEY_DIR: &str = "_monotone_keys";

pub struct Monotone {
    repo: Option<PathBuf>,
    db_path: Option<PathBuf>,
    key_dir: Option<PathBuf>,
    cached_version: OnceCell<Option<String>>,
}

impl Monotone {
    pub fn new() -> Self {
        Monotone {
            repo: None,
            db_path: None,
            key_dir: None,
            cached_version: OnceCell::new(),
        }
    }

    /// Invoke the client with the database/key options this process set
    /// up, if any; an existing workspace supplies its own.
    fn client(&self, args: &[&str], expect: &[i32]) -> Result<crate::exec::Output> {
        let repo = require_repo(&self.repo)?;
        let mut full: Vec<String> = Vec::new();
        if let Some(db) = &self.db_path {
            full.push("--db".to_string());
            full.push(db.display().to_string());
        }
        if self.key_dir.is_some() {
            full.push("--key".to_string());
            full.push(KEY.to_string());
        }
        if let Some(key_dir) = &self.key_dir {
            full.push("--keydir".to_string());
            full.push(key_dir.display().to_string());
        }
        full.extend(args.iter().map(|a| a.to_string()));
        let refs: Vec<&str> = full.iter().map(String::as_str).collect();
        invoke_client(CLIENT, repo, &refs, expect)
    }

    /// Fail unless the automation interface version is at least `floor`.
    fn require_version_ge(&self, floor: &str) -> Result<()> {
        let installed = self.version().ok_or_else(|| Error::NotSupported {
            name: "monotone",
            operation: "version discovery".to_string(),
        })?;
        let floor_full = format!("{floor}.0");
        if version::compare_str(&installed, &floor_full) == Ordering::Less {
            return Err(Error::NotSupported {
                name: "monotone",
                operation: format!(
                    "this operation with automation interface {installed} (requires {floor_full})"
                ),
            });
        }
        Ok(())
    }

    fn current_revision(&self) -> Result<String> {
        self.require_version_ge("2.0")?;
        let out = self.client(&["automate", "get_base_revision_id"], &[0])?;
        Ok(out.stdout.trim().to_string())
    }

    /// Directories and files tracked at `revision`, from the manifest.
    fn dirs_and_files(&self, revision: &str) -> Result<(Vec<String>, Vec<String>)> {
        self.require_version_ge("2.0")?;
        let out = self.client(&["automate", "get_manifest_of", revision], &[0])?;
        Ok(parse_manifest(&out.stdout))
    }
}

impl Default for Monotone {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `automate get_manifest_of` output into (dirs, files).
///
/// Entries look like `dir ""`, `dir ".bt/abc"`, `file ".bt/abc/values"`;
/// the empty name is the tree root, kept as `.`.
fn parse_manifest(output: &str) -> (Vec<String>, Vec<String>) {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for line in output.lines() {
        let Some((kind, value)) = line.trim().split_once(' ') else {
            continue;
        };
        let value = value.trim();
        if value.len() < 2 || !value.starts_with('"') || !value.ends_with('"') {
            continue;
        }
        let mut name = value[1..value.len() - 1].to_string();
        if name.is_empty() {
            name = ".".to_string();
        }
        match kind {
            "dir" => dirs.push(name),
            "file" => files.push(name),
            _ => {}
        }
    }
    (dirs, files)
}

/// The name of the first key in the `[private keys]` section of
/// `mtn list keys` output; lines read `<hash> <key name>`.
fn first_private_key(output: &str) -> Option<String> {
    let mut in_private = false;
    for line in output.lines() {
        let line = line.trim();
        if in_private && !line.is_empty() {
            return line.split_once(' ').map(|(_, key)| key.to_string());
        }
        if line == "[private keys]" {
            in_private = true;
        }
    }
    None
}

/// First-level child names of `path` among manifest entries.
fn children_of(dirs: &[String], files: &[String], path: &str) -> Vec<String> {
    let mut children = Vec::new();
    for entry in dirs.iter().chain(files.iter()) {
        if entry == "." || entry == path {
            continue;
        }
        let rest = if path == "." {
            entry.as_str()
        } else {
            match entry.strip_prefix(&format!("{path}/")) {
                Some(rest) => rest,
                None => continue,
            }
        };
        if !rest.is_empty() && !rest.contains('/') {
            children.push(rest.to_string());
        }
    }
    children
}

impl Backend for Monotone {
    fn name(&self) -> &'static str {
        "monotone"
    }

    fn version(&self) -> Option<String> {
        self.cached_version
            .get_or_init(|| {
                let cwd = self
                    .repo
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("."));
                let out =
                    invoke_client(CLIENT, &cwd, &["automate", "interface_version"], &[0]).ok()?;
                // The interface version is two-part; pad it so gates can
                // compare three-part floors.
                Some(format!("{}.0", out.stdout.trim()))
            })
            .clone()
    }

    fn user_id(&self) -> Option<String> {
        let out = self.client(&["list", "keys"], &[0]).ok()?;
        first_private_key(&out.stdout)
    }

    fn detect(&self, path: &Path) -> bool {
        search_parent_directories(path, "_MTN").is_some()
    }

    fn root(&mut self, path: &Path) -> Result<PathBuf> {
        let root = if self
            .version()
            .map(|v| version::compare_str(&v, "8.0.0") != Ordering::Less)
            .unwrap_or(false)
        {
            let cwd = containing_dir(path);
            let out = invoke_client(CLIENT, &cwd, &["automate", "get_workspace_root"], &[0])?;
            PathBuf::from(out.stdout.trim())
        } else {
            let mtn_dir =
                search_parent_directories(path, "_MTN").ok_or_else(|| Error::UnableToRoot {
                    vcs: "monotone".to_string(),
                    path: path.to_path_buf(),
                })?;
            mtn_dir
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        };
        self.repo = Some(root.clone());
        Ok(root)
    }

    fn init(&mut self, path: &Path) -> Result<()> {
        self.require_version_ge("4.0")?;
        let db_path = path.join(DB_FILE);
        let key_dir = path.join(KEY_DIR);
        invoke_client(
            CLIENT,
            path,
            &["db", "init", "--db", &db_path.display().to_string()],
            &[0],
        )?;
        fs::create_dir(&key_dir)?;
        invoke_client(
            CLIENT,
            path,
            &[
                "--db",
                &db_path.display().to_string(),
                "--keydir",
                &key_dir.display().to_string(),
                "automate",
                "genkey",
                KEY,
                "",
            ],
            &[0],
        )?;
        invoke_client(
            CLIENT,
            path,
            &[
                "--db",
                &db_path.display().to_string(),
                "--key",
                KEY,
                "--keydir",
                &key_dir.display().to_string(),
                "setup",
                "--branch",
                BRANCH,
                ".",
            ],
            &[0],
        )?;
        self.db_path = Some(db_path);
        self.key_dir = Some(key_dir);
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        let repo = require_repo(&self.repo)?;
        for dir in [repo.join("_MTN"), repo.join(KEY_DIR)] {
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
        }
        let db = repo.join(DB_FILE);
        if db.exists() {
            fs::remove_file(&db)?;
        }
        Ok(())
    }

    fn add(&self, path: &Path) -> Result<()> {
        let repo = require_repo(&self.repo)?;
        if repo.join(path).is_dir() {
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
        self.client(&["rm", &path.to_string_lossy()], &[0])?;
        Ok(())
    }

    fn update(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn read_file(&self, path: &Path, revision: &str) -> Result<Vec<u8>> {
        self.require_version_ge("4.0")?;
        let out = self.client(
            &[
                "automate",
                "get_file_of",
                &path.to_string_lossy(),
                "--revision",
                revision,
            ],
            &[0],
        )?;
        Ok(out.stdout.into_bytes())
    }

    fn manifest(&self, revision: &str) -> Result<Option<Vec<String>>> {
        let (dirs, files) = self.dirs_and_files(revision)?;
        let mut all = dirs;
        all.extend(files);
        Ok(Some(all))
    }

    fn is_dir_at(&self, path: &Path, revision: &str) -> Result<bool> {
        let (dirs, _) = self.dirs_and_files(revision)?;
        let path = path.to_string_lossy();
        Ok(dirs.iter().any(|d| *d == path))
    }

    fn list_dir_at(&self, path: &Path, revision: &str) -> Result<Vec<String>> {
        let (dirs, files) = self.dirs_and_files(revision)?;
        Ok(children_of(&dirs, &files, &path.to_string_lossy()))
    }

    fn commit(&self, message_file: &Path, allow_empty: bool) -> Result<Option<String>> {
        let message_file = message_file.to_string_lossy();
        let args: Vec<&str> = vec!["commit", "--message-file", message_file.as_ref()];
        let out = self.client(&args, &[0, 1])?;
        if out.status == 1 {
            if !any_in(&["no changes to commit"], &out.stderr) {
                return Err(Error::CommandFailed {
                    command: "mtn commit".to_string(),
                    status: out.status,
                    stdout: out.stdout,
                    stderr: out.stderr,
                });
            }
            if !allow_empty {
                return Err(Error::EmptyCommit);
            }
            // Monotone records no empty revision; report the last one.
        }
        Ok(Some(self.current_revision()?))
    }

    fn revision_id(&self, index: i64) -> Result<Option<String>> {
        let current = self.current_revision()?;
        let out = self.client(&["automate", "ancestors", &current], &[0])?;
        let mut revs: Vec<String> = out.stdout.lines().map(str::to_string).collect();
        revs.push(current);
        let mut args: Vec<&str> = vec!["automate", "toposort"];
        args.extend(revs.iter().map(String::as_str));
        let out = self.client(&args, &[0])?;
        let ordered: Vec<String> = out.stdout.lines().map(str::to_string).collect();
        Ok(pick_revision(&ordered, index))
    }

    fn diff(&self, revision: &str) -> Result<String> {
        let out = self.client(&["-r", revision, "diff"], &[0])?;
        Ok(out.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"format_version "1"

dir ""

dir ".bt"

dir ".bt/abc"

file ".bt/abc/values"
 content [da39a3ee5e6b4b0d3255bfef95601890afd80709]

dir ".bt/abc/bugs"

dir ".bt/abc/bugs/123"

file ".bt/abc/bugs/123/values"
 content [da39a3ee5e6b4b0d3255bfef95601890afd80709]
"#;

    #[test]
    fn test_parse_manifest() {
        let (dirs, files) = parse_manifest(MANIFEST);
        assert_eq!(
            dirs,
            vec![".", ".bt", ".bt/abc", ".bt/abc/bugs", ".bt/abc/bugs/123"]
        );
        assert_eq!(files, vec![".bt/abc/values", ".bt/abc/bugs/123/values"]);
    }

    #[test]
    fn test_children_of() {
        let (dirs, files) = parse_manifest(MANIFEST);
        assert_eq!(children_of(&dirs, &files, "."), vec![".bt"]);
        assert_eq!(children_of(&dirs, &files, ".bt/abc"), vec!["bugs", "values"]);
        assert_eq!(children_of(&dirs, &files, ".bt/abc/bugs"), vec!["123"]);
    }

    #[test]
    fn test_first_private_key() {
        let output = "\
[public keys]
aaaa0000 someone@example.com
[private keys]
f7791378b49dfb47a740e9588848b510de58f64f john@doe.com
";
        assert_eq!(first_private_key(output).as_deref(), Some("john@doe.com"));
        assert_eq!(first_private_key("[public keys]\naaaa0000 x\n"), None);
    }

    #[test]
    fn test_detect_without_metadata_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let backend = Monotone::new();
        assert!(!backend.detect(temp.path()));
        std::fs::create_dir(temp.path().join("_MTN")).unwrap();
        assert!(backend.detect(temp.path()));
    }
}
