use anyhow::{Context, Result};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Saves a serializable object to a file atomically.
///
/// The JSON is written to a sibling temporary file, synced to disk, then
/// renamed over the target, so readers only ever observe a complete file.
///
/// # Arguments
///
/// * `path` - The target file path.
/// * `state` - The object to serialize and save.
pub fn save_state<T: Serialize>(path: &Path, state: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let json = serde_json::to_vec_pretty(state).context("Failed to serialize state")?;

    let temp_path = path.with_extension("tmp");
    {
        let mut temp_file = std::fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create {}", temp_path.display()))?;
        temp_file
            .write_all(&json)
            .context("Failed to write temp file")?;
        temp_file.sync_all().context("Failed to sync temp file")?;
    }

    std::fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to move state into {}", path.display()))?;

    Ok(())
}

/// Loads a deserializable object from a file.
///
/// # Returns
///
/// * `Err` if the file doesn't exist, cannot be read, or deserialization fails.
pub fn load_state<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = std::io::BufReader::new(file);
    let state = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to deserialize {}", path.display()))?;
    Ok(state)
}

/// Loads state, falling back to `fallback()` when the file is missing or
/// unreadable. A corrupt file is logged and left in place for inspection.
pub fn load_state_or_default<T, F>(path: &Path, fallback: F) -> T
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    if !path.exists() {
        return fallback();
    }
    match load_state(path) {
        Ok(state) => state,
        Err(e) => {
            warn!("Ignoring unreadable state at {}: {:#}", path.display(), e);
            fallback()
        }
    }
}

/// Appends one JSON document as a single line. Used for audit trails that
/// must survive restarts and are never rewritten.
pub fn append_json_line<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let line = serde_json::to_string(record).context("Failed to serialize record")?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    writeln!(file, "{}", line).context("Failed to append record")?;
    file.sync_data().context("Failed to sync audit log")?;
    Ok(())
}
