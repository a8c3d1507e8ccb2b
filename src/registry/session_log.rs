//! Session log persistence.
//!
//! The log is written to a sibling temporary file first and renamed into
//! place, so readers never observe a partially written document.

use crate::registry::types::SessionLog;
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub(crate) fn write_session_log(path: &Path, log: &SessionLog) -> Result<u64> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let content = serde_json::to_vec_pretty(log).context("Failed to serialize session log")?;
    let temp_path = temp_path_for(path);

    if let Err(e) = fs::write(&temp_path, &content) {
        let _ = fs::remove_file(&temp_path);
        return Err(e)
            .with_context(|| format!("Failed to write session log: {}", temp_path.display()));
    }
    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e)
            .with_context(|| format!("Failed to move session log into place: {}", path.display()));
    }

    debug!("Session log written: {} bytes to {}", content.len(), path.display());
    Ok(content.len() as u64)
}

pub fn read_session_log(path: &Path) -> Result<SessionLog> {
    let content = fs::read(path)
        .with_context(|| format!("Failed to read session log: {}", path.display()))?;
    serde_json::from_slice(&content).context("Failed to deserialize session log")
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("session_log"));
    file_name.push(".tmp");
    path.with_file_name(file_name)
}
