use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs;

use hns_scout_core::PartitionKey;

use crate::{PartitionBackend, StoreError};

const EXTENSION: &str = "json";

/// Stores each partition as `<key>.json` inside one directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Opens the backend, creating the directory on first run.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &PartitionKey) -> PathBuf {
        self.root.join(format!("{key}.{EXTENSION}"))
    }
}

#[async_trait]
impl PartitionBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn read(&self, key: &PartitionKey) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(body) => Ok(Some(body)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, key: &PartitionKey, body: &str) -> Result<(), StoreError> {
        // Keys never start with '.', so the temp name cannot collide with a partition.
        let staging = self.root.join(format!(".{key}.{EXTENSION}.tmp"));
        fs::write(&staging, body).await?;
        fs::rename(&staging, self.path_for(key)).await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<PartitionKey>, StoreError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Ok(key) = PartitionKey::new(stem) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_creates_missing_directory() {
        let dir = TempDir::new().expect("temp dir");
        let root = dir.path().join("nested").join("available");

        let backend = FileBackend::open(&root).await.expect("open");

        assert!(root.is_dir());
        assert_eq!(backend.root(), root.as_path());
        assert!(backend.keys().await.expect("keys").is_empty());
    }

    #[tokio::test]
    async fn read_missing_partition_is_none() {
        let dir = TempDir::new().expect("temp dir");
        let backend = FileBackend::open(dir.path()).await.expect("open");
        let key = PartitionKey::new("2024-01-01").expect("key");

        assert!(backend.read(&key).await.expect("read").is_none());
    }

    #[tokio::test]
    async fn write_replaces_document_and_leaves_no_staging_file() {
        let dir = TempDir::new().expect("temp dir");
        let backend = FileBackend::open(dir.path()).await.expect("open");
        let key = PartitionKey::new("2024-01-01").expect("key");

        backend.write(&key, "[]").await.expect("first write");
        backend.write(&key, "{}").await.expect("second write");

        assert_eq!(backend.read(&key).await.expect("read").as_deref(), Some("{}"));
        let keys = backend.keys().await.expect("keys");
        assert_eq!(keys, vec![key]);
        assert!(!dir.path().join(".2024-01-01.json.tmp").exists());
    }
}
