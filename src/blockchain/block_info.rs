//! Per-block bookkeeping the chain engine keeps alongside stored blocks:
//! which branch a block belongs to and its accumulated difficulty.

use crate::crypto::Hash256;
use serde::{Deserialize, Serialize};

/// Chain-engine metadata for one stored block. Several `BlockInfo` records
/// can share a height during a fork; at most one has `is_main = true`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockInfo {
    pub hash: Hash256,
    pub height: u64,
    pub parent_hash: Hash256,
    pub is_main: bool,
    pub total_difficulty: u64,
}

impl BlockInfo {
    pub fn genesis(hash: Hash256, total_difficulty: u64) -> Self {
        Self {
            hash,
            height: 0,
            parent_hash: Hash256::ZERO,
            is_main: true,
            total_difficulty,
        }
    }
}
