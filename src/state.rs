//! Store file persistence
//!
//! The configuration store lives in one JSON file in the state directory.
//! Writes go to a sibling temp file first and are renamed into place.

use anyhow::{Context, Result};
use declarative::MemoryStore;
use std::fs;
use std::path::Path;

/// Load the store, or an empty one if the file doesn't exist yet
pub fn load_store(path: &Path) -> Result<MemoryStore> {
    if !path.exists() {
        log::debug!("Store file {} does not exist, starting empty", path.display());
        return Ok(MemoryStore::new());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read store file: {}", path.display()))?;
    let store = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse store file: {}", path.display()))?;

    log::debug!("Loaded store from {}", path.display());
    Ok(store)
}

pub fn save_store(path: &Path, store: &MemoryStore) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
    }

    let content = serde_json::to_string_pretty(store).context("Failed to serialize store")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)
        .with_context(|| format!("Failed to write store file: {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace store file: {}", path.display()))?;

    log::debug!("Saved store to {}", path.display());
    Ok(())
}
