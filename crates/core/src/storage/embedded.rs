//! Embedded store over redb, for single-node deployments.

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::kv::KvStore;

const RECORDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
// Unix-second deadlines for keys scheduled to expire; a key past its
// deadline reads as absent and is purged on the next write touching it.
const DEADLINES_TABLE: TableDefinition<&str, i64> = TableDefinition::new("deadlines");

/// Single-file [`KvStore`] using redb.
#[derive(Clone)]
pub struct RedbKvStore {
    db: Arc<Database>,
}

impl RedbKvStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).context("Failed to create store directory")?;
            }
        }

        let db = Database::create(&path).context("Failed to create redb database")?;

        // Initialize tables
        let write_txn = db.begin_write().context("Failed to begin write transaction")?;
        {
            let _records_table = write_txn
                .open_table(RECORDS_TABLE)
                .context("Failed to open records table")?;
            let _deadlines_table = write_txn
                .open_table(DEADLINES_TABLE)
                .context("Failed to open deadlines table")?;
        }
        write_txn.commit().context("Failed to commit transaction")?;

        Ok(Self { db: Arc::new(db) })
    }
}

fn expired(deadline: Option<i64>) -> bool {
    deadline.is_some_and(|deadline| deadline <= Utc::now().timestamp())
}

#[async_trait::async_trait]
impl KvStore for RedbKvStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;

        let deadlines = read_txn
            .open_table(DEADLINES_TABLE)
            .context("Failed to open deadlines table")?;
        let deadline = deadlines
            .get(key)
            .context("Failed to read deadline")?
            .map(|guard| guard.value());
        if expired(deadline) {
            return Ok(None);
        }

        let records = read_txn
            .open_table(RECORDS_TABLE)
            .context("Failed to open records table")?;
        match records.get(key).context("Failed to get record")? {
            Some(guard) => Ok(Some(Bytes::copy_from_slice(guard.value()))),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<()> {
        let write_txn = self.db.begin_write().context("Failed to begin write")?;
        {
            let mut records = write_txn
                .open_table(RECORDS_TABLE)
                .context("Failed to open records table")?;
            records
                .insert(key, value.as_ref())
                .context("Failed to insert record")?;

            let mut deadlines = write_txn
                .open_table(DEADLINES_TABLE)
                .context("Failed to open deadlines table")?;
            deadlines
                .remove(key)
                .context("Failed to clear deadline")?;
        }
        write_txn.commit().context("Failed to commit")?;
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: Bytes) -> Result<bool> {
        // The occupancy check and the insert share one serialized write
        // transaction, which is what makes this a safe allocation primitive.
        let write_txn = self.db.begin_write().context("Failed to begin write")?;
        let won = {
            let mut records = write_txn
                .open_table(RECORDS_TABLE)
                .context("Failed to open records table")?;
            let mut deadlines = write_txn
                .open_table(DEADLINES_TABLE)
                .context("Failed to open deadlines table")?;

            let deadline = deadlines
                .get(key)
                .context("Failed to read deadline")?
                .map(|guard| guard.value());
            let occupied = !expired(deadline)
                && records.get(key).context("Failed to get record")?.is_some();

            if occupied {
                false
            } else {
                records
                    .insert(key, value.as_ref())
                    .context("Failed to insert record")?;
                deadlines
                    .remove(key)
                    .context("Failed to clear deadline")?;
                true
            }
        };
        write_txn.commit().context("Failed to commit")?;
        Ok(won)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let write_txn = self.db.begin_write().context("Failed to begin write")?;
        {
            let mut records = write_txn
                .open_table(RECORDS_TABLE)
                .context("Failed to open records table")?;
            records.remove(key).context("Failed to remove record")?;

            let mut deadlines = write_txn
                .open_table(DEADLINES_TABLE)
                .context("Failed to open deadlines table")?;
            deadlines
                .remove(key)
                .context("Failed to clear deadline")?;
        }
        write_txn.commit().context("Failed to commit")?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read().context("Failed to begin read")?;
        let records = read_txn
            .open_table(RECORDS_TABLE)
            .context("Failed to open records table")?;
        let deadlines = read_txn
            .open_table(DEADLINES_TABLE)
            .context("Failed to open deadlines table")?;

        let mut keys = Vec::new();
        for item in records
            .range::<&str>(prefix..)
            .context("Failed to range over records")?
        {
            let (key_guard, _value) = item.context("Failed to read item")?;
            let key = key_guard.value();
            if !key.starts_with(prefix) {
                break;
            }
            let deadline = deadlines
                .get(key)
                .context("Failed to read deadline")?
                .map(|guard| guard.value());
            if !expired(deadline) {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let write_txn = self.db.begin_write().context("Failed to begin write")?;
        {
            let records = write_txn
                .open_table(RECORDS_TABLE)
                .context("Failed to open records table")?;
            let present = records.get(key).context("Failed to get record")?.is_some();

            if present {
                let deadline = Utc::now().timestamp() + ttl.as_secs() as i64;
                let mut deadlines = write_txn
                    .open_table(DEADLINES_TABLE)
                    .context("Failed to open deadlines table")?;
                deadlines
                    .insert(key, deadline)
                    .context("Failed to insert deadline")?;
            }
        }
        write_txn.commit().context("Failed to commit")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_store() -> (NamedTempFile, RedbKvStore) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = RedbKvStore::new(temp_file.path().to_path_buf()).unwrap();
        (temp_file, store)
    }

    #[tokio::test]
    async fn round_trip_and_delete() {
        let (_guard, store) = test_store();

        store.put("workflow:1", Bytes::from("a")).await.unwrap();
        assert_eq!(store.get("workflow:1").await.unwrap(), Some(Bytes::from("a")));
        assert!(store.exists("workflow:1").await.unwrap());

        store.delete("workflow:1").await.unwrap();
        assert_eq!(store.get("workflow:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_if_absent_only_wins_once() {
        let (_guard, store) = test_store();

        assert!(store.put_if_absent("k", Bytes::from("first")).await.unwrap());
        assert!(!store.put_if_absent("k", Bytes::from("second")).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from("first")));
    }

    #[tokio::test]
    async fn scan_prefix_stays_within_the_namespace() {
        let (_guard, store) = test_store();

        store.put("job:w:a", Bytes::from("1")).await.unwrap();
        store.put("job:w:b", Bytes::from("2")).await.unwrap();
        store.put("job:x:c", Bytes::from("3")).await.unwrap();
        store.put("workflow:w", Bytes::from("4")).await.unwrap();

        let keys = store.scan_prefix("job:w:").await.unwrap();
        assert_eq!(keys, vec!["job:w:a".to_string(), "job:w:b".to_string()]);
    }

    #[tokio::test]
    async fn expired_records_read_as_absent() {
        let (_guard, store) = test_store();

        store.put("k", Bytes::from("v")).await.unwrap();
        store.expire("k", Duration::from_secs(0)).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
        assert!(store.scan_prefix("k").await.unwrap().is_empty());
        assert!(store.put_if_absent("k", Bytes::from("new")).await.unwrap());
    }

    #[tokio::test]
    async fn overwrite_clears_a_pending_expiry() {
        let (_guard, store) = test_store();

        store.put("k", Bytes::from("v")).await.unwrap();
        store.expire("k", Duration::from_secs(0)).await.unwrap();
        store.put("k", Bytes::from("w")).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from("w")));
    }

    #[tokio::test]
    async fn expiring_a_missing_key_is_a_no_op() {
        let (_guard, store) = test_store();
        store.expire("missing", Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get("missing").await.unwrap(), None);
    }
}
