//! The external store seam.
//!
//! The persistence engine lives outside the core; the runtime consumes it
//! only through this trait. Two tables: named roots (bytes → bytes) and
//! content-addressed blobs (secure hash → bytes). [`MemoryStore`] is the
//! in-process implementation used by tests and storeless environments
//! that still want transactions.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::error::RuntimeError;

/// Width of a content address.
pub const BLOB_HASH_LEN: usize = 32;

/// A content address: the secure hash of a blob.
pub type BlobHash = [u8; BLOB_HASH_LEN];

/// Store layer failure, wrapped into [`RuntimeError::Store`] at the
/// runtime boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("store failure: {0}")]
pub struct StoreError(pub String);

impl From<StoreError> for RuntimeError {
    fn from(e: StoreError) -> RuntimeError {
        tracing::warn!(target: "runic_vm::store", error = %e, "store layer failure");
        RuntimeError::Store
    }
}

/// Key-value persistence consumed by transactions and stowage.
///
/// Implementations own their durability and locking strategy; the
/// runtime serializes access through the environment.
pub trait Store {
    /// Read a named root. Unwritten keys read as `None`.
    fn read_root(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write (`Some`) or delete (`None`) a named root.
    fn write_root(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<(), StoreError>;

    /// Fetch a content-addressed blob.
    fn read_blob(&self, hash: &BlobHash) -> Result<Option<Vec<u8>>, StoreError>;

    /// Publish a content-addressed blob.
    fn write_blob(&mut self, hash: BlobHash, data: Vec<u8>) -> Result<(), StoreError>;

    /// Flush prior writes; `durable` demands they reach stable storage
    /// before returning.
    fn sync(&mut self, durable: bool) -> Result<(), StoreError>;
}

/// In-memory [`Store`]: hash maps, no durability.
#[derive(Default)]
pub struct MemoryStore {
    roots: HashMap<Vec<u8>, Vec<u8>>,
    blobs: HashMap<BlobHash, Vec<u8>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Number of named roots currently present.
    pub fn root_count(&self) -> usize {
        self.roots.len()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("roots", &self.roots.len())
            .field("blobs", &self.blobs.len())
            .finish()
    }
}

impl Store for MemoryStore {
    fn read_root(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.roots.get(key).cloned())
    }

    fn write_root(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<(), StoreError> {
        match value {
            Some(v) => {
                self.roots.insert(key.to_vec(), v.to_vec());
            }
            None => {
                self.roots.remove(key);
            }
        }
        Ok(())
    }

    fn read_blob(&self, hash: &BlobHash) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.get(hash).cloned())
    }

    fn write_blob(&mut self, hash: BlobHash, data: Vec<u8>) -> Result<(), StoreError> {
        self.blobs.insert(hash, data);
        Ok(())
    }

    fn sync(&mut self, _durable: bool) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_write_read_delete() {
        let mut s = MemoryStore::new();
        assert_eq!(s.read_root(b"k").expect("read"), None);
        s.write_root(b"k", Some(b"v")).expect("write");
        assert_eq!(s.read_root(b"k").expect("read"), Some(b"v".to_vec()));
        s.write_root(b"k", None).expect("delete");
        assert_eq!(s.read_root(b"k").expect("read"), None);
        assert_eq!(s.root_count(), 0);
    }

    #[test]
    fn blobs_round_trip() {
        let mut s = MemoryStore::new();
        let hash = [7u8; BLOB_HASH_LEN];
        assert_eq!(s.read_blob(&hash).expect("read"), None);
        s.write_blob(hash, vec![1, 2, 3]).expect("write");
        assert_eq!(s.read_blob(&hash).expect("read"), Some(vec![1, 2, 3]));
    }
}
