//! RocksDB backend

use crate::error::{StorageError, StorageResult};
use crate::kv::{BatchOp, Column, KeyValueStore, WriteBatch};
use parking_lot::RwLock;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options,
    WriteBatch as RocksBatch,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

type RocksDB = DBWithThreadMode<MultiThreaded>;

/// Database tuning
#[derive(Clone, Debug)]
pub struct DbConfig {
    /// Create database if missing
    pub create_if_missing: bool,
    /// Maximum number of open files
    pub max_open_files: i32,
    /// Write buffer size
    pub write_buffer_size: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            max_open_files: 512,
            write_buffer_size: 64 * 1024 * 1024,
        }
    }
}

/// RocksDB store with one column family per [`Column`]
pub struct RocksStore {
    db: RwLock<Option<RocksDB>>,
    path: PathBuf,
}

impl RocksStore {
    /// Open (creating if needed) a store at `path`
    pub fn open(path: impl AsRef<Path>, config: DbConfig) -> StorageResult<Self> {
        let store = Self {
            db: RwLock::new(None),
            path: path.as_ref().to_path_buf(),
        };
        store.reopen(config)?;
        Ok(store)
    }

    /// Open the underlying database if it is closed
    pub fn reopen(&self, config: DbConfig) -> StorageResult<()> {
        let mut guard = self.db.write();
        if guard.is_some() {
            return Err(StorageError::AlreadyOpen);
        }

        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);
        opts.set_write_buffer_size(config.write_buffer_size);

        let descriptors: Vec<ColumnFamilyDescriptor> = Column::ALL
            .iter()
            .map(|col| ColumnFamilyDescriptor::new(col.name(), Options::default()))
            .collect();

        let db = RocksDB::open_cf_descriptors(&opts, &self.path, descriptors)?;
        tracing::debug!(path = ?self.path, "opened rocksdb");
        *guard = Some(db);
        Ok(())
    }

    /// Close the database; later calls fail with [`StorageError::NotOpen`]
    pub fn close(&self) {
        *self.db.write() = None;
    }

    /// Check if the database is open
    pub fn is_open(&self) -> bool {
        self.db.read().is_some()
    }

    /// Database path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cf<'a>(db: &'a RocksDB, column: Column) -> StorageResult<Arc<BoundColumnFamily<'a>>> {
        db.cf_handle(column.name())
            .ok_or_else(|| StorageError::InvalidColumnFamily(column.name().to_string()))
    }
}

impl KeyValueStore for RocksStore {
    fn get(&self, column: Column, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StorageError::NotOpen)?;
        let cf = Self::cf(db, column)?;
        Ok(db.get_cf(&cf, key)?)
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StorageError::NotOpen)?;
        let cf = Self::cf(db, column)?;
        db.put_cf(&cf, key, value)?;
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> StorageResult<()> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StorageError::NotOpen)?;
        let cf = Self::cf(db, column)?;
        db.delete_cf(&cf, key)?;
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(StorageError::NotOpen)?;

        let mut rocks_batch = RocksBatch::default();
        for op in batch.operations {
            match op {
                BatchOp::Put { column, key, value } => {
                    rocks_batch.put_cf(&Self::cf(db, column)?, &key, &value);
                }
                BatchOp::Delete { column, key } => {
                    rocks_batch.delete_cf(&Self::cf(db, column)?, &key);
                }
            }
        }
        db.write(rocks_batch)?;
        Ok(())
    }
}
