//! CLI argument definitions for bugtrail.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Bugtrail - versioned hierarchical storage for bug tracking.
#[derive(Parser, Debug)]
#[command(name = "bt")]
#[command(
    author,
    version,
    about = "Versioned hierarchical storage for distributed bug tracking",
    long_about = None
)]
pub struct Cli {
    /// Run as if bt was started in <path> instead of the current directory.
    /// Can also be set via the BT_REPO environment variable.
    #[arg(short = 'C', long = "repo", global = true, env = "BT_REPO")]
    pub repo_path: Option<PathBuf>,

    /// Force a specific version-control backend (git, hg, darcs,
    /// monotone, none) instead of detecting one.
    #[arg(long = "vcs", global = true)]
    pub vcs: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize versioned storage in the repository root
    ///
    /// Auto-detects any supported version-control tool; without one,
    /// records are stored unversioned.
    Init,

    /// Remove the storage tree and its versioning metadata
    Destroy,

    /// Create storage for a new identifier
    Add {
        /// Identifier to create (e.g. a fresh uuid)
        id: String,

        /// Identifier owning the new one
        #[arg(long)]
        parent: Option<String>,

        /// Create a directory able to hold children instead of a file
        #[arg(long)]
        directory: bool,
    },

    /// Print the raw content stored for an identifier
    Get {
        id: String,

        /// Read the content as of this revision instead of the working tree
        #[arg(long)]
        revision: Option<String>,
    },

    /// Write content for an identifier (from the argument, or stdin)
    Set {
        id: String,

        /// Content to store; read from stdin when omitted
        value: Option<String>,
    },

    /// Remove an identifier
    Remove {
        id: String,

        /// Remove the identifier's whole subtree
        #[arg(long)]
        recursive: bool,
    },

    /// List the children of an identifier (or the top-level containers)
    List {
        id: Option<String>,

        /// List as of this revision instead of the working tree
        #[arg(long)]
        revision: Option<String>,
    },

    /// Commit pending storage changes
    Commit {
        /// One-line commit summary
        summary: String,

        /// Longer commit body
        #[arg(long)]
        body: Option<String>,

        /// Allow recording a commit with no changes
        #[arg(long)]
        allow_empty: bool,
    },

    /// Resolve a signed relative revision index to a revision id
    ///
    /// Index 1 is the very first revision, -1 the newest.
    Revision {
        #[arg(allow_hyphen_values = true)]
        index: i64,
    },

    /// Show identifiers added/modified/removed since a revision
    Changed { revision: String },

    /// Print the user identity used for commits
    User,
}
