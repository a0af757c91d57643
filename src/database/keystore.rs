//! Encrypted-key-by-index storage surface (spec §6 persisted layout).
//!
//! Key management itself — deriving keys, choosing an encryption scheme —
//! is out of scope for this crate; this module only defines the storage
//! shape an external keystore would fill: opaque, already-encrypted blobs
//! addressed by a small integer index.

use parking_lot::RwLock;
use std::collections::HashMap;

use super::DbError;

pub trait KeyStore: Send + Sync {
    fn get_encrypted_key(&self, index: u32) -> Result<Option<Vec<u8>>, DbError>;
    fn put_encrypted_key(&self, index: u32, blob: &[u8]) -> Result<(), DbError>;
    fn next_index(&self) -> Result<u32, DbError>;
}

#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    entries: RwLock<HashMap<u32, Vec<u8>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn get_encrypted_key(&self, index: u32) -> Result<Option<Vec<u8>>, DbError> {
        Ok(self.entries.read().get(&index).cloned())
    }

    fn put_encrypted_key(&self, index: u32, blob: &[u8]) -> Result<(), DbError> {
        self.entries.write().insert(index, blob.to_vec());
        Ok(())
    }

    fn next_index(&self) -> Result<u32, DbError> {
        Ok(self.entries.read().keys().max().map_or(0, |m| m + 1))
    }
}
