//! User configuration for bugtrail.
//!
//! An optional TOML file at `~/.config/bugtrail/config.toml`:
//!
//! ```toml
//! # Force one backend instead of detecting.
//! vcs = "git"
//! # Detection preference order (default: darcs, git, hg, monotone).
//! vcs_order = ["git", "hg"]
//! # Identity override for commits.
//! user = "Jane Doe <jane@example.com>"
//! ```
//!
//! Precedence for the backend choice: `--vcs` flag > `vcs` key >
//! detection over `vcs_order`.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::storage::backend::{BackendKind, DEFAULT_ORDER};
use crate::{Error, Result};

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Backend forced for every operation.
    pub vcs: Option<String>,
    /// Detection preference order.
    pub vcs_order: Option<Vec<String>>,
    /// User identity override.
    pub user: Option<String>,
}

impl Config {
    /// Load the user config file, or defaults when there is none.
    pub fn load() -> Result<Config> {
        match config_path() {
            Some(path) if path.exists() => Self::from_toml(&fs::read_to_string(&path)?),
            _ => Ok(Config::default()),
        }
    }

    /// Parse config file contents.
    pub fn from_toml(contents: &str) -> Result<Config> {
        toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))
    }

    /// The detection preference order, resolved to backend kinds.
    pub fn order(&self) -> Result<Vec<BackendKind>> {
        match &self.vcs_order {
            None => Ok(DEFAULT_ORDER.to_vec()),
            Some(names) => names
                .iter()
                .map(|name| {
                    BackendKind::from_name(name)
                        .ok_or_else(|| Error::Config(format!("unknown vcs {name:?}")))
                })
                .collect(),
        }
    }
}

/// Location of the user config file.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("bugtrail/config.toml"))
}
