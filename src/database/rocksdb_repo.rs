//! RocksDB-backed `Repository`, column-family per record kind.

use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use std::path::Path;

use crate::blockchain::account::{AccountState, AccountStateRecord};
use crate::blockchain::block::Block;
use crate::blockchain::block_info::BlockInfo;
use crate::crypto::{Address, Hash256};

use super::{serialize_with_checksum, verify_and_strip_checksum, DbError, Repository};

const CF_BLOCKS: &str = "blocks";
const CF_BLOCK_INFOS: &str = "block_infos";
const CF_ACCOUNTS: &str = "accounts";
const CF_CODE: &str = "code";
const CF_META: &str = "meta";

const BEST_BLOCK_KEY: &[u8] = b"best_block_hash";

pub struct RocksDbRepository {
    db: DB,
}

impl RocksDbRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [CF_BLOCKS, CF_BLOCK_INFOS, CF_ACCOUNTS, CF_CODE, CF_META]
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, cfs)
            .map_err(|e| DbError::Backend(e.to_string()))?;
        Ok(Self { db })
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, DbError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| DbError::Backend(format!("missing column family {name}")))
    }
}

impl Repository for RocksDbRepository {
    fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, DbError> {
        let cf = self.cf(CF_BLOCKS)?;
        match self
            .db
            .get_cf(cf, hash.as_bytes())
            .map_err(|e| DbError::Backend(e.to_string()))?
        {
            Some(blob) => {
                let payload = verify_and_strip_checksum(&blob)?;
                Ok(Some(bincode::deserialize(&payload)?))
            }
            None => Ok(None),
        }
    }

    fn put_block(&self, block: &Block) -> Result<(), DbError> {
        let cf = self.cf(CF_BLOCKS)?;
        let blob = serialize_with_checksum(block)?;
        self.db
            .put_cf(cf, block.id().as_bytes(), blob)
            .map_err(|e| DbError::Backend(e.to_string()))
    }

    fn get_block_infos_at_height(&self, height: u64) -> Result<Vec<BlockInfo>, DbError> {
        let cf = self.cf(CF_BLOCK_INFOS)?;
        match self
            .db
            .get_cf(cf, height.to_be_bytes())
            .map_err(|e| DbError::Backend(e.to_string()))?
        {
            Some(blob) => {
                let payload = verify_and_strip_checksum(&blob)?;
                Ok(bincode::deserialize(&payload)?)
            }
            None => Ok(Vec::new()),
        }
    }

    fn put_block_info(&self, info: &BlockInfo) -> Result<(), DbError> {
        let mut infos = self.get_block_infos_at_height(info.height)?;
        if let Some(existing) = infos.iter_mut().find(|e| e.hash == info.hash) {
            *existing = info.clone();
        } else {
            infos.push(info.clone());
        }
        let cf = self.cf(CF_BLOCK_INFOS)?;
        let blob = serialize_with_checksum(&infos)?;
        self.db
            .put_cf(cf, info.height.to_be_bytes(), blob)
            .map_err(|e| DbError::Backend(e.to_string()))
    }

    fn get_account(&self, address: &Address) -> Result<AccountState, DbError> {
        let cf = self.cf(CF_ACCOUNTS)?;
        match self
            .db
            .get_cf(cf, address.as_bytes())
            .map_err(|e| DbError::Backend(e.to_string()))?
        {
            Some(blob) => {
                let payload = verify_and_strip_checksum(&blob)?;
                let record: AccountStateRecord = bincode::deserialize(&payload)?;
                Ok(AccountState::from(&record))
            }
            None => Ok(AccountState::empty()),
        }
    }

    fn put_account(&self, address: &Address, state: &AccountState) -> Result<(), DbError> {
        let cf = self.cf(CF_ACCOUNTS)?;
        let record = AccountStateRecord::from(state);
        let blob = serialize_with_checksum(&record)?;
        self.db
            .put_cf(cf, address.as_bytes(), blob)
            .map_err(|e| DbError::Backend(e.to_string()))
    }

    fn get_code(&self, hash: &Hash256) -> Result<Option<Vec<u8>>, DbError> {
        let cf = self.cf(CF_CODE)?;
        self.db
            .get_cf(cf, hash.as_bytes())
            .map_err(|e| DbError::Backend(e.to_string()))
    }

    fn put_code(&self, hash: &Hash256, code: &[u8]) -> Result<(), DbError> {
        let cf = self.cf(CF_CODE)?;
        self.db
            .put_cf(cf, hash.as_bytes(), code)
            .map_err(|e| DbError::Backend(e.to_string()))
    }

    fn best_block_hash(&self) -> Result<Option<Hash256>, DbError> {
        let cf = self.cf(CF_META)?;
        match self
            .db
            .get_cf(cf, BEST_BLOCK_KEY)
            .map_err(|e| DbError::Backend(e.to_string()))?
        {
            Some(bytes) if bytes.len() == 32 => {
                let mut arr = [0u8; 32];
                arr.copy_from_slice(&bytes);
                Ok(Some(Hash256::from_bytes(arr)))
            }
            Some(_) => Err(DbError::Corrupt("best block hash has wrong length".into())),
            None => Ok(None),
        }
    }

    fn set_best_block_hash(&self, hash: &Hash256) -> Result<(), DbError> {
        let cf = self.cf(CF_META)?;
        self.db
            .put_cf(cf, BEST_BLOCK_KEY, hash.as_bytes())
            .map_err(|e| DbError::Backend(e.to_string()))
    }
}
