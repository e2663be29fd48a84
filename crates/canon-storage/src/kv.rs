//! Column-partitioned key-value store abstraction

use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Logical column a key lives in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Column {
    /// Blocks, block info records, receipts, canonical index, head pointers
    Chain,
    /// World-state snapshots keyed by state root
    State,
}

impl Column {
    /// Every column, in creation order
    pub const ALL: [Column; 2] = [Column::Chain, Column::State];

    /// Column family name
    pub fn name(&self) -> &'static str {
        match self {
            Column::Chain => "chain",
            Column::State => "state",
        }
    }
}

/// Byte-oriented store the chain core persists through
pub trait KeyValueStore: Send + Sync {
    /// Get a value
    fn get(&self, column: Column, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Put a value
    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Delete a value
    fn delete(&self, column: Column, key: &[u8]) -> StorageResult<()>;

    /// Apply a batch atomically
    fn write(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Check whether a key exists
    fn contains(&self, column: Column, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(column, key)?.is_some())
    }
}

/// Batch operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BatchOp {
    Put {
        column: Column,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        column: Column,
        key: Vec<u8>,
    },
}

/// Ordered set of writes applied together
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    pub(crate) operations: Vec<BatchOp>,
}

impl WriteBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put
    pub fn put(&mut self, column: Column, key: &[u8], value: &[u8]) {
        self.operations.push(BatchOp::Put {
            column,
            key: key.to_vec(),
            value: value.to_vec(),
        });
    }

    /// Queue a delete
    pub fn delete(&mut self, column: Column, key: &[u8]) {
        self.operations.push(BatchOp::Delete {
            column,
            key: key.to_vec(),
        });
    }

    /// Number of queued operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<(Column, Vec<u8>), Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys across all columns
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the store holds nothing
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().get(&(column, key.to_vec())).cloned())
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.data
            .write()
            .insert((column, key.to_vec()), value.to_vec());
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> StorageResult<()> {
        self.data.write().remove(&(column, key.to_vec()));
        Ok(())
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut data = self.data.write();
        for op in batch.operations {
            match op {
                BatchOp::Put { column, key, value } => {
                    data.insert((column, key), value);
                }
                BatchOp::Delete { column, key } => {
                    data.remove(&(column, key));
                }
            }
        }
        Ok(())
    }
}
