//! Block headers and blocks: the unit of consensus.
//!
//! The mining preimage has a fixed 84-byte layout distinct from the
//! canonical storage encoding (spec §6) — only the fields that actually
//! gate proof-of-work are hashed, in a fixed big-endian order.

use crate::crypto::{double_sha256, merkle_root, Hash256};
use serde::{Deserialize, Serialize};

use super::transaction::Transaction;

pub const MINING_PREIMAGE_LEN: usize = 84;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub height: u64,
    pub parent_hash: Hash256,
    pub coinbase: crate::crypto::Address,
    pub timestamp: u32,
    /// Compact (exponent, mantissa) difficulty, see `crate::consensus::difficulty`.
    pub difficulty_compact: u64,
    pub nonce: u32,
    pub total_difficulty: u64,
    pub state_root: Hash256,
    pub trx_trie_root: Hash256,
}

impl BlockHeader {
    /// Assembles the 84-byte mining preimage in the fixed field order
    /// (version, parent-hash, trx-trie-root, time, difficulty, nonce).
    pub fn mining_preimage(&self) -> [u8; MINING_PREIMAGE_LEN] {
        let mut buf = [0u8; MINING_PREIMAGE_LEN];
        buf[0..4].copy_from_slice(&self.version.to_be_bytes());
        buf[4..36].copy_from_slice(self.parent_hash.as_bytes());
        buf[36..68].copy_from_slice(self.trx_trie_root.as_bytes());
        buf[68..72].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[72..80].copy_from_slice(&self.difficulty_compact.to_be_bytes());
        buf[80..84].copy_from_slice(&self.nonce.to_be_bytes());
        buf
    }

    /// Header hash: double-SHA256 of the mining preimage.
    pub fn hash(&self) -> Hash256 {
        double_sha256(&self.mining_preimage())
    }

    /// Lowercase hex of the header hash, the form used for target comparison.
    pub fn hash_hex(&self) -> String {
        self.hash().to_hex()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    /// Carried as raw bytes per spec §3 ("gas-limit-bytes"); interpreted as a
    /// big-endian integer by callers that need the numeric gas limit.
    #[serde(with = "serde_bytes")]
    pub gas_limit_bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BlockValidationError {
    #[error("trx-trie-root does not match the merkle root of the contained transactions")]
    TrxTrieRootMismatch,
    #[error("total-difficulty does not equal parent.total_difficulty + difficulty")]
    TotalDifficultyMismatch,
}

impl Block {
    pub fn id(&self) -> Hash256 {
        self.header.hash()
    }

    fn computed_trx_trie_root(&self) -> Hash256 {
        let ids: Vec<Hash256> = self.transactions.iter().map(Transaction::id).collect();
        merkle_root(&ids)
    }

    /// Invariant: `trx_trie_root` equals the merkle digest of `transactions`.
    pub fn check_trx_trie_root(&self) -> Result<(), BlockValidationError> {
        if self.header.trx_trie_root != self.computed_trx_trie_root() {
            return Err(BlockValidationError::TrxTrieRootMismatch);
        }
        Ok(())
    }

    /// Invariant: `total_difficulty == parent_total_difficulty + difficulty`.
    ///
    /// `difficulty` here is the header's raw 64-bit difficulty value, not the
    /// compact target — total difficulty accumulates the difficulty itself.
    pub fn check_total_difficulty(
        &self,
        parent_total_difficulty: u64,
    ) -> Result<(), BlockValidationError> {
        let expected = parent_total_difficulty.saturating_add(self.header.difficulty_compact);
        if self.header.total_difficulty != expected {
            return Err(BlockValidationError::TotalDifficultyMismatch);
        }
        Ok(())
    }

    pub fn validate_invariants(
        &self,
        parent_total_difficulty: u64,
    ) -> Result<(), BlockValidationError> {
        self.check_trx_trie_root()?;
        self.check_total_difficulty(parent_total_difficulty)
    }
}
