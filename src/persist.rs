use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Ensures a directory exists, creating parents as needed. Grounded on the
/// teacher's `session_store.rs` file-based persistence idiom, generalized
/// to the directories this crate persists into.
pub async fn ensure_dir(path: &Path) -> Result<(), CoreError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| CoreError::Other(e.into()))
}

pub fn content_hash_path(dir: &Path, hash: &str) -> PathBuf {
    dir.join(format!("{hash}.bincode"))
}

pub async fn write_bincode<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), CoreError> {
    let bytes = bincode::serialize(value).map_err(|e| CoreError::Other(e.into()))?;
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| CoreError::Other(e.into()))
}

pub async fn read_bincode<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, CoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let value = bincode::deserialize(&bytes).map_err(|e| CoreError::Other(e.into()))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CoreError::Other(e.into())),
    }
}

pub async fn list_entries(dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let mut out = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(CoreError::Other(e.into())),
    };
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CoreError::Other(e.into()))?
    {
        out.push(entry.path());
    }
    Ok(out)
}
