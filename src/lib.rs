//! Bugtrail - versioned hierarchical storage for distributed bug tracking.
//!
//! This library provides the core functionality for the `bt` CLI tool:
//! a storage tree that persists hierarchical records (bug directories,
//! bugs, comments) as plain files inside a working tree, optionally
//! layered on top of whatever version-control tool already owns that
//! tree so that history, diffing, and distributed synchronization come
//! for free.

pub mod cli;
pub mod commands;
pub mod config;
pub mod exec;
pub mod storage;
pub mod unidiff;


/// Library-level error type for bugtrail operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage not rooted")]
    NotRooted,

    #[error("storage not connected")]
    NotConnected,

    #[error("unable to root {vcs} storage at {path}")]
    UnableToRoot { vcs: String, path: std::path::PathBuf },

    #[error("connection error: {0}")]
    Connection(String),

    #[error(
        "unsupported storage version {found:?}, expected {expected:?}: \
         use a bugtrail release matching the on-disk tree"
    )]
    StorageVersion { found: String, expected: String },

    #[error("unknown identifier: {0}")]
    UnknownId(String),

    #[error("path {path:?} not inside {within:?}")]
    InvalidPath {
        path: std::path::PathBuf,
        within: String,
    },

    #[error("path {path:?} collides with spacer directory {spacer:?}")]
    SpacerCollision {
        path: std::path::PathBuf,
        spacer: String,
    },

    #[error("identifier names a directory: {0}")]
    IsDirectory(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("invalid revision: {0}")]
    InvalidRevision(String),

    #[error("nothing to commit")]
    EmptyCommit,

    #[error("command failed ({status}): {command}\n{stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stdout: String,
        stderr: String,
    },

    #[error("diff parse error: {0}")]
    DiffParse(String),

    #[error("the {name} backend does not support {operation}")]
    NotSupported {
        name: &'static str,
        operation: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for bugtrail operations.
pub type Result<T> = std::result::Result<T, Error>;
