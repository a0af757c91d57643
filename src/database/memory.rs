//! In-memory `Repository`, used by tests and as a reference implementation.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::blockchain::account::AccountState;
use crate::blockchain::block::Block;
use crate::blockchain::block_info::BlockInfo;
use crate::crypto::{Address, Hash256};

use super::{DbError, Repository};

#[derive(Debug, Default)]
pub struct MemoryRepository {
    blocks: RwLock<HashMap<Hash256, Block>>,
    block_infos_by_height: RwLock<HashMap<u64, Vec<BlockInfo>>>,
    accounts: RwLock<HashMap<Address, AccountState>>,
    code: RwLock<HashMap<Hash256, Vec<u8>>>,
    best_block_hash: RwLock<Option<Hash256>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Repository for MemoryRepository {
    fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, DbError> {
        Ok(self.blocks.read().get(hash).cloned())
    }

    fn put_block(&self, block: &Block) -> Result<(), DbError> {
        self.blocks.write().insert(block.id(), block.clone());
        Ok(())
    }

    fn get_block_infos_at_height(&self, height: u64) -> Result<Vec<BlockInfo>, DbError> {
        Ok(self
            .block_infos_by_height
            .read()
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }

    fn put_block_info(&self, info: &BlockInfo) -> Result<(), DbError> {
        let mut by_height = self.block_infos_by_height.write();
        let entries = by_height.entry(info.height).or_default();
        if let Some(existing) = entries.iter_mut().find(|e| e.hash == info.hash) {
            *existing = info.clone();
        } else {
            entries.push(info.clone());
        }
        Ok(())
    }

    fn get_account(&self, address: &Address) -> Result<AccountState, DbError> {
        Ok(self
            .accounts
            .read()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    fn put_account(&self, address: &Address, state: &AccountState) -> Result<(), DbError> {
        self.accounts.write().insert(*address, state.clone());
        Ok(())
    }

    fn get_code(&self, hash: &Hash256) -> Result<Option<Vec<u8>>, DbError> {
        Ok(self.code.read().get(hash).cloned())
    }

    fn put_code(&self, hash: &Hash256, code: &[u8]) -> Result<(), DbError> {
        self.code.write().insert(*hash, code.to_vec());
        Ok(())
    }

    fn best_block_hash(&self) -> Result<Option<Hash256>, DbError> {
        Ok(*self.best_block_hash.read())
    }

    fn set_best_block_hash(&self, hash: &Hash256) -> Result<(), DbError> {
        *self.best_block_hash.write() = Some(*hash);
        Ok(())
    }
}
