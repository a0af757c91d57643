//! Persisted key-value layout (spec §6): a `Repository` trait abstracting
//! over block storage, per-height fork bookkeeping, account state, and
//! contract code, with an in-memory implementation for tests and an
//! optional RocksDB-backed one for production.

pub mod keystore;
pub mod memory;
#[cfg(feature = "database")]
pub mod rocksdb_repo;

use sha2::{Digest, Sha512};

use crate::blockchain::account::AccountState;
use crate::blockchain::block::Block;
use crate::blockchain::block_info::BlockInfo;
use crate::crypto::{Address, Hash256};

pub use memory::MemoryRepository;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Abstraction over the node's persisted state. Implementations must be
/// safe for concurrent reads; writes happen on the manager thread only
/// (spec §5), so the trait does not need interior write-serialization of
/// its own beyond what each backend provides.
pub trait Repository: Send + Sync {
    fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, DbError>;
    fn put_block(&self, block: &Block) -> Result<(), DbError>;

    /// All `BlockInfo` records at a height; more than one during a fork.
    fn get_block_infos_at_height(&self, height: u64) -> Result<Vec<BlockInfo>, DbError>;
    fn put_block_info(&self, info: &BlockInfo) -> Result<(), DbError>;

    fn get_account(&self, address: &Address) -> Result<AccountState, DbError>;
    fn put_account(&self, address: &Address, state: &AccountState) -> Result<(), DbError>;

    fn get_code(&self, hash: &Hash256) -> Result<Option<Vec<u8>>, DbError>;
    fn put_code(&self, hash: &Hash256, code: &[u8]) -> Result<(), DbError>;

    fn best_block_hash(&self) -> Result<Option<Hash256>, DbError>;
    fn set_best_block_hash(&self, hash: &Hash256) -> Result<(), DbError>;
}

/// Serialize with a SHA-512 checksum appended: `<u32:len><bytes...><[u8;64]>`.
/// Used by disk-backed repository implementations to catch bit rot; the
/// in-memory repository has no need for it.
pub fn serialize_with_checksum<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, DbError> {
    let bytes = bincode::serialize(value)?;
    let mut out = Vec::with_capacity(4 + bytes.len() + 64);
    let len = u32::try_from(bytes.len()).map_err(|_| DbError::Corrupt("value too large".into()))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&bytes);
    out.extend_from_slice(&Sha512::digest(&bytes));
    Ok(out)
}

/// Verify a checksummed blob written by `serialize_with_checksum` and return
/// the raw (still-encoded) payload.
pub fn verify_and_strip_checksum(data: &[u8]) -> Result<Vec<u8>, DbError> {
    if data.len() < 4 + 64 {
        return Err(DbError::Corrupt("blob too small".into()));
    }
    let mut len_le = [0u8; 4];
    len_le.copy_from_slice(&data[..4]);
    let len = u32::from_le_bytes(len_le) as usize;
    if data.len() != 4 + len + 64 {
        return Err(DbError::Corrupt("length mismatch".into()));
    }
    let payload = &data[4..4 + len];
    let checksum = &data[4 + len..];
    if Sha512::digest(payload).as_slice() != checksum {
        return Err(DbError::Corrupt("checksum mismatch".into()));
    }
    Ok(payload.to_vec())
}
