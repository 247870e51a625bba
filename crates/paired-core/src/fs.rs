//! Async JSON file helpers with atomic replace.

use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};

use crate::traits::StorageError;

/// Read and deserialize a JSON file.
///
/// A missing or blank file yields `Ok(None)`.
///
/// # Errors
/// Returns error on I/O failure or malformed content.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&content)?))
}

/// Like [`read_json`], but unreadable content falls back to `T::default()`.
///
/// Only I/O errors other than not-found are returned.
///
/// # Errors
/// Returns error if the file exists but cannot be read.
pub async fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StorageError> {
    match read_json(path).await {
        Ok(value) => Ok(value.unwrap_or_default()),
        Err(StorageError::Serialization(e)) => {
            tracing::warn!(path = %path.display(), "Malformed JSON, using default: {e}");
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
///
/// Writes to a sibling temp file then renames it over the target, creating
/// parent directories as needed.
///
/// # Errors
/// Returns error on serialization or I/O failure.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let content = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &content).await
}

/// Atomically replace `path` with `content`.
///
/// # Errors
/// Returns error on I/O failure.
pub async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, content).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let value: Option<Vec<String>> = read_json(&dir.path().join("nope.json")).await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("data.json");
        let mut data = HashMap::new();
        data.insert("k".to_string(), 3);

        write_json_atomic(&path, &data).await.unwrap();
        let back: HashMap<String, i32> = read_json(&path).await.unwrap().unwrap();
        assert_eq!(back, data);

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            read_json::<Vec<i32>>(&path).await,
            Err(StorageError::Serialization(_))
        ));
        let fallback: Vec<i32> = read_json_or_default(&path).await.unwrap();
        assert!(fallback.is_empty());
    }
}
