use crate::domain::ports::StateStore;
use crate::error::StorageFault;
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;

/// Column Family holding the wallet's cached state.
pub const CF_WALLET_STATE: &str = "wallet_state";

impl From<rocksdb::Error> for StorageFault {
    fn from(e: rocksdb::Error) -> Self {
        StorageFault::new(format!("rocksdb: {e}"))
    }
}

/// A persistent state store backed by RocksDB.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbStateStore {
    db: Arc<DB>,
}

impl RocksDbStateStore {
    /// Opens or creates a RocksDB instance at the specified path, ensuring
    /// the wallet column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageFault> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_state = ColumnFamilyDescriptor::new(CF_WALLET_STATE, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_state])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn column(&self) -> Result<&rocksdb::ColumnFamily, StorageFault> {
        self.db
            .cf_handle(CF_WALLET_STATE)
            .ok_or_else(|| StorageFault::new("wallet_state column family not found"))
    }
}

#[async_trait]
impl StateStore for RocksDbStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageFault> {
        let cf = self.column()?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StorageFault::new(format!("value of {key} is not UTF-8: {e}"))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageFault> {
        let cf = self.column()?;
        self.db.put_cf(cf, key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageFault> {
        let cf = self.column()?;
        self.db.delete_cf(cf, key.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDbStateStore::open(dir.path()).expect("Failed to open RocksDB");
        assert!(store.db.cf_handle(CF_WALLET_STATE).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_state_store() {
        let dir = tempdir().unwrap();
        let store = RocksDbStateStore::open(dir.path()).unwrap();

        store
            .set("session.accountRef", "primary".to_string())
            .await
            .unwrap();
        assert_eq!(
            store.get("session.accountRef").await.unwrap().as_deref(),
            Some("primary")
        );
        assert!(store.get("walletBalance").await.unwrap().is_none());

        store.remove("session.accountRef").await.unwrap();
        assert!(store.get("session.accountRef").await.unwrap().is_none());
        store.remove("session.accountRef").await.unwrap();
    }

    #[tokio::test]
    async fn test_rocksdb_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDbStateStore::open(dir.path()).unwrap();
            store.set("walletBalance", "{}".to_string()).await.unwrap();
        }
        let store = RocksDbStateStore::open(dir.path()).unwrap();
        assert_eq!(store.get("walletBalance").await.unwrap().as_deref(), Some("{}"));
    }
}
