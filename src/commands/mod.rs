//! Implementations of the CLI verbs, thin wrappers over the storage
//! contract.

use std::io::{Read, Write};
use std::path::Path;

use crate::config::Config;
use crate::storage::{Store, backend_by_name, detect_backend};
use crate::{Error, Result};

/// Pick the adapter: explicit flag, then config, then detection over
/// the configured preference order.
fn choose_backend(
    repo: &Path,
    vcs: Option<&str>,
    config: &Config,
) -> Result<Box<dyn crate::storage::backend::Backend>> {
    match vcs.or(config.vcs.as_deref()) {
        Some(name) => {
            backend_by_name(name).ok_or_else(|| Error::Config(format!("unknown vcs {name:?}")))
        }
        None => Ok(detect_backend(repo, &config.order()?)),
    }
}

/// Root and connect a store for an existing tree.
fn open_store(repo: &Path, vcs: Option<&str>, config: &Config) -> Result<Store> {
    let backend = choose_backend(repo, vcs, config)?;
    let mut store = Store::new(repo, backend);
    store.root()?;
    store.connect()?;
    Ok(store)
}

pub fn init(repo: &Path, vcs: Option<&str>, config: &Config) -> Result<()> {
    let backend = choose_backend(repo, vcs, config)?;
    let mut store = Store::new(repo, backend);
    store.init()?;
    if store.versioned() {
        println!("Using {} for revision control.", store.backend_name());
    } else {
        println!("No revision control detected.");
    }
    println!("Directory initialized.");
    store.disconnect()
}

pub fn destroy(repo: &Path, vcs: Option<&str>, config: &Config) -> Result<()> {
    let backend = choose_backend(repo, vcs, config)?;
    let mut store = Store::new(repo, backend);
    store.root()?;
    store.destroy()?;
    println!("Storage removed.");
    Ok(())
}

pub fn add(
    repo: &Path,
    vcs: Option<&str>,
    config: &Config,
    id: &str,
    parent: Option<&str>,
    directory: bool,
) -> Result<()> {
    let mut store = open_store(repo, vcs, config)?;
    store.add(id, parent, directory)?;
    store.disconnect()
}

pub fn get(
    repo: &Path,
    vcs: Option<&str>,
    config: &Config,
    id: &str,
    revision: Option<&str>,
) -> Result<()> {
    let mut store = open_store(repo, vcs, config)?;
    let contents = store.get(id, revision)?;
    std::io::stdout().write_all(&contents)?;
    store.disconnect()
}

pub fn set(
    repo: &Path,
    vcs: Option<&str>,
    config: &Config,
    id: &str,
    value: Option<&str>,
) -> Result<()> {
    let contents = match value {
        Some(value) => value.as_bytes().to_vec(),
        None => {
            let mut buffer = Vec::new();
            std::io::stdin().read_to_end(&mut buffer)?;
            buffer
        }
    };
    let mut store = open_store(repo, vcs, config)?;
    store.set(id, &contents)?;
    store.disconnect()
}

pub fn remove(
    repo: &Path,
    vcs: Option<&str>,
    config: &Config,
    id: &str,
    recursive: bool,
) -> Result<()> {
    let mut store = open_store(repo, vcs, config)?;
    if recursive {
        store.recursive_remove(id)?;
    } else {
        store.remove(id)?;
    }
    store.disconnect()
}

pub fn list(
    repo: &Path,
    vcs: Option<&str>,
    config: &Config,
    id: Option<&str>,
    revision: Option<&str>,
) -> Result<()> {
    let mut store = open_store(repo, vcs, config)?;
    for child in store.children(id, revision)? {
        println!("{child}");
    }
    store.disconnect()
}

pub fn commit(
    repo: &Path,
    vcs: Option<&str>,
    config: &Config,
    summary: &str,
    body: Option<&str>,
    allow_empty: bool,
) -> Result<()> {
    let mut store = open_store(repo, vcs, config)?;
    match store.commit(summary, body, allow_empty)? {
        Some(revision) => println!("Committed {revision}"),
        None => println!("Committed (no revision control)."),
    }
    store.disconnect()
}

pub fn revision(repo: &Path, vcs: Option<&str>, config: &Config, index: i64) -> Result<()> {
    let mut store = open_store(repo, vcs, config)?;
    let revision = store.revision_id(index)?;
    println!("{revision}");
    store.disconnect()
}

pub fn changed(repo: &Path, vcs: Option<&str>, config: &Config, revision: &str) -> Result<()> {
    let mut store = open_store(repo, vcs, config)?;
    let changes = store.changed(revision)?;
    println!("Added:");
    for id in &changes.added {
        println!("  {id}");
    }
    println!("Modified:");
    for id in &changes.modified {
        println!("  {id}");
    }
    println!("Removed:");
    for id in &changes.removed {
        println!("  {id}");
    }
    store.disconnect()
}

pub fn user(repo: &Path, vcs: Option<&str>, config: &Config) -> Result<()> {
    if let Some(user) = &config.user {
        println!("{user}");
        return Ok(());
    }
    let backend = choose_backend(repo, vcs, config)?;
    let mut store = Store::new(repo, backend);
    store.root()?;
    println!("{}", store.user_id());
    Ok(())
}
