use std::fs;
use std::path::Path;

use tracing::info;

use crate::models::TrackerData;

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Serialize all tracker data as pretty-printed JSON.
pub fn to_json(data: &TrackerData) -> Result<String, BackupError> {
    Ok(serde_json::to_string_pretty(data)?)
}

pub fn from_json(json: &str) -> Result<TrackerData, BackupError> {
    Ok(serde_json::from_str(json)?)
}

/// Write a full backup to `path`, replacing any existing file.
pub fn write_backup(path: &Path, data: &TrackerData) -> Result<(), BackupError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, to_json(data)?)?;
    info!(path = %path.display(), users = data.users.len(), "backup written");
    Ok(())
}

/// Read a backup. The caller replaces its whole history with the result.
pub fn read_backup(path: &Path) -> Result<TrackerData, BackupError> {
    let json = fs::read_to_string(path)?;
    let data = from_json(&json)?;
    info!(path = %path.display(), users = data.users.len(), "backup read");
    Ok(data)
}
