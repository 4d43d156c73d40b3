mod file;
mod sqlite;

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use sqlx::migrate::MigrateError;
use thiserror::Error;
use tracing::{debug, warn};

use hns_scout_core::{Partition, PartitionError, PartitionKey};

pub use file::FileBackend;
pub use sqlite::SqliteBackend;

/// Raw key-value access to partition documents.
///
/// Backends only move JSON text around; decoding, legacy upgrades and merging
/// happen in [`PartitionStore`] so every backend behaves the same.
#[async_trait]
pub trait PartitionBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns the stored document, or `None` when the partition does not exist yet.
    async fn read(&self, key: &PartitionKey) -> Result<Option<String>, StoreError>;

    /// Replaces the whole document for `key`.
    async fn write(&self, key: &PartitionKey, body: &str) -> Result<(), StoreError>;

    /// Lists every partition currently stored.
    async fn keys(&self) -> Result<Vec<PartitionKey>, StoreError>;
}

/// Errors surfaced by partition backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("cannot update partition: {0}")]
    Partition(#[from] PartitionError),
}

/// Result of filing a discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    AlreadyPresent,
}

impl RecordOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::AlreadyPresent => "already_present",
        }
    }
}

/// Read/merge/write access to date partitions on top of any [`PartitionBackend`].
///
/// There is no locking: two writers racing on the same partition resolve as
/// last-write-wins on the whole document.
#[derive(Clone)]
pub struct PartitionStore {
    backend: Arc<dyn PartitionBackend>,
}

impl PartitionStore {
    pub fn new(backend: Arc<dyn PartitionBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Files `domain` under `title` in the partition for `key`.
    ///
    /// A missing or unparsable partition is treated as empty and rewritten. Every
    /// entry of a readable partition is kept, whatever its shape.
    pub async fn record(
        &self,
        key: &PartitionKey,
        title: Option<&str>,
        domain: &str,
    ) -> Result<RecordOutcome, StoreError> {
        let mut partition = match self.backend.read(key).await? {
            Some(raw) => self.decode_lenient(key, &raw),
            None => Partition::new(),
        };

        if !partition.insert(title, domain)? {
            return Ok(RecordOutcome::AlreadyPresent);
        }

        let body = partition.to_json_pretty()?;
        self.backend.write(key, &body).await?;
        debug!(stage = "storage", backend = self.backend.name(), key = %key, entries = partition.len(), "partition updated");
        Ok(RecordOutcome::Inserted)
    }

    /// Loads one partition; missing or undecodable documents come back empty.
    pub async fn load(&self, key: &PartitionKey) -> Result<Partition, StoreError> {
        Ok(match self.backend.read(key).await? {
            Some(raw) => self.decode_lenient(key, &raw),
            None => Partition::new(),
        })
    }

    /// Loads every stored partition.
    ///
    /// A partition that cannot be read or decoded is reported as empty instead
    /// of failing the whole listing.
    pub async fn load_all(&self) -> Result<BTreeMap<PartitionKey, Partition>, StoreError> {
        let keys = self.backend.keys().await?;
        let mut partitions = BTreeMap::new();
        for key in keys {
            let partition = match self.load(&key).await {
                Ok(partition) => partition,
                Err(err) => {
                    warn!(stage = "storage", backend = self.backend.name(), key = %key, error = %err, "failed to read partition");
                    Partition::new()
                }
            };
            partitions.insert(key, partition);
        }
        Ok(partitions)
    }

    fn decode_lenient(&self, key: &PartitionKey, raw: &str) -> Partition {
        match Partition::from_json(raw) {
            Ok(partition) => partition,
            Err(err) => {
                warn!(stage = "storage", backend = self.backend.name(), key = %key, error = %err, "partition is unparsable, treating as empty");
                Partition::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hns_scout_core::DEFAULT_GROUP;
    use tempfile::TempDir;

    async fn file_store() -> (TempDir, PartitionStore) {
        let dir = TempDir::new().expect("temp dir");
        let backend = FileBackend::open(dir.path().join("available"))
            .await
            .expect("open backend");
        (dir, PartitionStore::new(Arc::new(backend)))
    }

    fn key(raw: &str) -> PartitionKey {
        PartitionKey::new(raw).expect("valid key")
    }

    #[tokio::test]
    async fn recording_twice_keeps_one_entry() {
        let (_dir, store) = file_store().await;
        let day = key("2024-05-01");

        let first = store.record(&day, Some("picks"), "alpha").await.expect("record");
        let second = store.record(&day, Some("picks"), "alpha").await.expect("record");

        assert_eq!(first, RecordOutcome::Inserted);
        assert_eq!(second, RecordOutcome::AlreadyPresent);
        let partition = store.load(&day).await.expect("load");
        assert_eq!(partition.group("picks"), Some(vec!["alpha"]));
    }

    #[tokio::test]
    async fn blank_title_files_under_default_group() {
        let (_dir, store) = file_store().await;
        let day = key("2024-05-01");

        store.record(&day, Some("  "), "alpha").await.expect("record");
        store.record(&day, None, "beta").await.expect("record");

        let partition = store.load(&day).await.expect("load");
        assert_eq!(
            partition.group(DEFAULT_GROUP),
            Some(vec!["alpha", "beta"])
        );
    }

    #[tokio::test]
    async fn legacy_partition_is_upgraded_on_write() {
        let (dir, store) = file_store().await;
        let path = dir.path().join("available").join("2024-05-01.json");
        tokio::fs::write(&path, r#"["foo.com","bar.com"]"#)
            .await
            .expect("seed legacy file");

        store
            .record(&key("2024-05-01"), Some("new"), "baz")
            .await
            .expect("record");

        let raw = tokio::fs::read_to_string(&path).await.expect("read back");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(
            value,
            serde_json::json!({ "General": ["foo.com", "bar.com"], "new": ["baz"] })
        );
    }

    #[tokio::test]
    async fn off_shape_entries_are_kept_on_write() {
        let (dir, store) = file_store().await;
        let path = dir.path().join("available").join("2024-05-01.json");
        tokio::fs::write(&path, r#"{"General":["keep.com"],"Picks":["x.com", 5]}"#)
            .await
            .expect("seed partition");

        store
            .record(&key("2024-05-01"), Some("new"), "baz")
            .await
            .expect("record");

        let raw = tokio::fs::read_to_string(&path).await.expect("read back");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(
            value,
            serde_json::json!({
                "General": ["keep.com"],
                "Picks": ["x.com", 5],
                "new": ["baz"]
            })
        );
    }

    #[tokio::test]
    async fn non_list_group_rejects_write_and_keeps_file() {
        let (dir, store) = file_store().await;
        let path = dir.path().join("available").join("2024-05-01.json");
        let seeded = r#"{"General":["keep.com"],"Odd":7}"#;
        tokio::fs::write(&path, seeded).await.expect("seed partition");

        let err = store
            .record(&key("2024-05-01"), Some("Odd"), "baz")
            .await
            .expect_err("group is not a list");

        assert!(matches!(err, StoreError::Partition(PartitionError::GroupShape(_))));
        let raw = tokio::fs::read_to_string(&path).await.expect("read back");
        assert_eq!(raw, seeded);
    }

    #[tokio::test]
    async fn corrupt_partition_is_replaced() {
        let (dir, store) = file_store().await;
        let path = dir.path().join("available").join("2024-05-01.json");
        tokio::fs::write(&path, "{ definitely not json")
            .await
            .expect("seed corrupt file");

        let outcome = store
            .record(&key("2024-05-01"), None, "alpha")
            .await
            .expect("corrupt data is not fatal");

        assert_eq!(outcome, RecordOutcome::Inserted);
        let partition = store.load(&key("2024-05-01")).await.expect("load");
        assert_eq!(partition.len(), 1);
    }

    #[tokio::test]
    async fn load_all_substitutes_empty_for_bad_partitions() {
        let (dir, store) = file_store().await;
        let root = dir.path().join("available");
        tokio::fs::write(root.join("2024-05-01.json"), r#"["foo.com","bar.com"]"#)
            .await
            .expect("seed legacy");
        tokio::fs::write(root.join("2024-05-02.json"), "garbage")
            .await
            .expect("seed garbage");
        tokio::fs::write(root.join("notes.txt"), "ignored")
            .await
            .expect("seed other file");

        let all = store.load_all().await.expect("listing");

        assert_eq!(all.len(), 2);
        assert_eq!(
            all[&key("2024-05-01")].group(DEFAULT_GROUP),
            Some(vec!["foo.com", "bar.com"])
        );
        assert!(all[&key("2024-05-02")].is_empty());
    }

    #[tokio::test]
    async fn sqlite_backend_merges_like_files() {
        let dir = TempDir::new().expect("temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("scout.db").display());
        let backend = SqliteBackend::connect(&url).await.expect("connect");
        let store = PartitionStore::new(Arc::new(backend));
        let day = key("2024-05-01");

        store.record(&day, None, "alpha").await.expect("record");
        store.record(&day, None, "alpha").await.expect("record");
        store.record(&day, Some("x"), "beta").await.expect("record");

        let all = store.load_all().await.expect("listing");
        assert_eq!(all.len(), 1);
        assert_eq!(all[&day].len(), 2);
        assert_eq!(store.backend_name(), "sqlite");
    }
}
