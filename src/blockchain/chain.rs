//! Chain engine: block import, fork-choice, and candidate-block assembly
//! (spec §4.3). Consensus-shape rejection (bad signature, bad nonce order,
//! wrong difficulty, ...) is an expected `ChainImportOutcome::Invalid`, never
//! an exception. A repository failure, or a transaction that fails to
//! execute once a block has been accepted onto the activated branch, is an
//! `Err` (spec §7) — the latter signals the chain is no longer in a
//! consistent state and must not be silently treated as a successful best-
//! block switch.
//!
//! World-state caveat: the repository holds a single mutable account-state
//! view, not one per branch. Extending the current best chain applies
//! transactions against that view directly; switching to a different branch
//! replays the newly-activated blocks' transactions on top of it without
//! first undoing the deactivated branch's effects. This satisfies the
//! fork-choice invariants (best-by-total-difficulty, exactly one `is_main`
//! per height) but does not guarantee exact state-root equality across deep
//! reorgs — a production engine would snapshot state per branch point.

use std::collections::HashMap;
use std::sync::Arc;

use num_bigint::BigUint;

use crate::consensus::difficulty::{retarget, DifficultyParams};
use crate::consensus::pow::header_meets_target;
use crate::crypto::{merkle_root, Address, Hash256};
use crate::database::{DbError, Repository};

use super::account::AccountState;
use super::block::{Block, BlockHeader};
use super::block_info::BlockInfo;
use super::executor::{ExecutionOutcome, StateExecutor};
use super::reward::block_reward;
use super::transaction::Transaction;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("execution failed while activating the best chain: {0}")]
    Execution(String),
}

/// Typed import result (spec §7): consensus rejection is an expected
/// outcome, never a thrown error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainImportOutcome {
    /// Imported and became (or extended) the main chain.
    BestBlock,
    /// Imported onto a side branch; did not overtake the main chain.
    NonBestBlock,
    /// Already known; no-op.
    Exist,
    /// Rejected; the block is not stored.
    Invalid(String),
}

pub struct ChainEngine<R: Repository, E: StateExecutor> {
    repo: Arc<R>,
    executor: Arc<E>,
    difficulty_params: DifficultyParams,
}

impl<R: Repository, E: StateExecutor> ChainEngine<R, E> {
    /// Opens the engine against `repo`, seeding `genesis` if the repository
    /// is empty.
    pub fn new(repo: Arc<R>, executor: Arc<E>, genesis: Block) -> Result<Self, ChainError> {
        let engine = Self {
            repo,
            executor,
            difficulty_params: DifficultyParams::default(),
        };
        if engine.repo.best_block_hash()?.is_none() {
            let hash = genesis.id();
            engine.repo.put_block(&genesis)?;
            engine
                .repo
                .put_block_info(&BlockInfo::genesis(hash, genesis.header.total_difficulty))?;
            engine.repo.set_best_block_hash(&hash)?;
        }
        Ok(engine)
    }

    pub fn get_best_block(&self) -> Result<Block, ChainError> {
        let hash = self
            .repo
            .best_block_hash()?
            .ok_or_else(|| ChainError::Db(DbError::Corrupt("no best block set".into())))?;
        self.repo
            .get_block(&hash)?
            .ok_or_else(|| ChainError::Db(DbError::Corrupt("best block hash not stored".into())))
    }

    fn block_info_by_hash(&self, hash: &Hash256, height: u64) -> Result<Option<BlockInfo>, ChainError> {
        Ok(self
            .repo
            .get_block_infos_at_height(height)?
            .into_iter()
            .find(|info| info.hash == *hash))
    }

    pub fn block_exists(&self, hash: &Hash256) -> Result<bool, ChainError> {
        Ok(self.repo.get_block(hash)?.is_some())
    }

    /// The main-chain block at `height`, if any.
    pub fn main_chain_block_at(&self, height: u64) -> Result<Option<Block>, ChainError> {
        let Some(info) = self
            .repo
            .get_block_infos_at_height(height)?
            .into_iter()
            .find(|info| info.is_main)
        else {
            return Ok(None);
        };
        self.repo.get_block(&info.hash)
    }

    /// Main-chain blocks for `[from_height, from_height + count)`, used to
    /// answer `GET_BLOCKS` (spec §4.5).
    pub fn main_chain_blocks(&self, from_height: u64, count: u32) -> Result<Vec<Block>, ChainError> {
        let mut out = Vec::new();
        for height in from_height..from_height.saturating_add(count as u64) {
            match self.main_chain_block_at(height)? {
                Some(block) => out.push(block),
                None => break,
            }
        }
        Ok(out)
    }

    /// Main-chain headers for `[from_height, from_height + count)`, used to
    /// answer `GET_BLOCK_HEADERS` (spec §4.5).
    pub fn main_chain_headers(&self, from_height: u64, count: u32) -> Result<Vec<BlockHeader>, ChainError> {
        Ok(self
            .main_chain_blocks(from_height, count)?
            .into_iter()
            .map(|b| b.header)
            .collect())
    }

    /// Retarget from `parent`'s difficulty and the candidate block's
    /// timestamp, per the spec-fixed per-block schedule (SPEC_FULL §4.3).
    pub fn calculate_block_difficulty(&self, parent: &BlockHeader, block_timestamp: u32) -> u64 {
        retarget(
            parent.difficulty_compact as u32,
            parent.timestamp,
            block_timestamp,
            &self.difficulty_params,
        ) as u64
    }

    /// Applies `transactions` in order against the live world-state,
    /// crediting `coinbase` with the block reward afterward, and returns the
    /// resulting state root.
    fn execute(
        &self,
        coinbase: &Address,
        height: u64,
        transactions: &[Transaction],
    ) -> Result<Hash256, (usize, String)> {
        let mut state_root = Hash256::ZERO;
        for (i, tx) in transactions.iter().enumerate() {
            let tracked = self.executor.start_tracking();
            match self.executor.apply(tracked, tx) {
                ExecutionOutcome::Committed { state_root: root } => state_root = root,
                ExecutionOutcome::Reverted { reason } => return Err((i, reason)),
                ExecutionOutcome::Unsupported => {
                    return Err((i, "contract execution is unsupported".to_string()))
                }
            }
        }
        let mut coinbase_state = self
            .repo
            .get_account(coinbase)
            .unwrap_or_else(|_| AccountState::empty());
        coinbase_state.balance += block_reward(height);
        let _ = self.repo.put_account(coinbase, &coinbase_state);
        Ok(state_root)
    }

    fn validate_transaction_shape(tx: &Transaction) -> Result<(), String> {
        if !tx.sender_matches_public_key() {
            return Err("sender does not match embedded public key".to_string());
        }
        tx.verify_signature()
            .map_err(|e| format!("signature invalid: {e}"))
    }

    /// Checks that each sender's transactions within `transactions` form a
    /// strictly increasing nonce sequence starting at that sender's current
    /// on-chain nonce (spec §4.3 step 2: "nonce monotonicity per sender").
    fn validate_nonce_monotonicity(&self, transactions: &[Transaction]) -> Result<Option<String>, ChainError> {
        let mut expected: HashMap<Address, BigUint> = HashMap::new();
        for tx in transactions {
            let next = match expected.get(&tx.sender) {
                Some(n) => n.clone(),
                None => self.repo.get_account(&tx.sender)?.nonce,
            };
            if tx.nonce_value() != next {
                return Ok(Some(format!(
                    "transaction from {:?} has nonce {} but the expected next nonce is {next}",
                    tx.sender,
                    tx.nonce_value(),
                )));
            }
            expected.insert(tx.sender, next + 1u8);
        }
        Ok(None)
    }

    /// Imports `block`. Only a repository failure is an `Err`; consensus
    /// rejection is returned as `ChainImportOutcome::Invalid`.
    pub fn import_block(&self, block: Block) -> Result<ChainImportOutcome, ChainError> {
        let hash = block.id();
        if self.repo.get_block(&hash)?.is_some() {
            return Ok(ChainImportOutcome::Exist);
        }

        let parent = match self.repo.get_block(&block.header.parent_hash)? {
            Some(parent) => parent,
            None => return Ok(ChainImportOutcome::Invalid("unknown parent".to_string())),
        };
        let parent_info = match self.block_info_by_hash(&block.header.parent_hash, parent.header.height)? {
            Some(info) => info,
            None => {
                return Ok(ChainImportOutcome::Invalid(
                    "parent has no block-info record".to_string(),
                ))
            }
        };

        if let Err(e) = block.validate_invariants(parent_info.total_difficulty) {
            return Ok(ChainImportOutcome::Invalid(e.to_string()));
        }

        let expected_difficulty = self.calculate_block_difficulty(&parent.header, block.header.timestamp);
        if block.header.difficulty_compact != expected_difficulty {
            return Ok(ChainImportOutcome::Invalid(
                "difficulty does not match the retarget schedule".to_string(),
            ));
        }

        if !header_meets_target(&block.header) {
            return Ok(ChainImportOutcome::Invalid(
                "header hash does not meet its target".to_string(),
            ));
        }

        for tx in &block.transactions {
            if let Err(reason) = Self::validate_transaction_shape(tx) {
                return Ok(ChainImportOutcome::Invalid(reason));
            }
        }

        if let Some(reason) = self.validate_nonce_monotonicity(&block.transactions)? {
            return Ok(ChainImportOutcome::Invalid(reason));
        }

        self.repo.put_block(&block)?;
        let info = BlockInfo {
            hash,
            height: block.header.height,
            parent_hash: block.header.parent_hash,
            is_main: false,
            total_difficulty: block.header.total_difficulty,
        };
        self.repo.put_block_info(&info)?;

        let best = self.get_best_block()?;
        if block.header.total_difficulty <= best.header.total_difficulty {
            return Ok(ChainImportOutcome::NonBestBlock);
        }

        self.switch_best_chain(&best, &block)?;
        Ok(ChainImportOutcome::BestBlock)
    }

    /// Walks both chains back to their common ancestor, flips `is_main` on
    /// every block along the deactivated and activated paths, replays the
    /// newly-activated branch's transactions (see module docs for the
    /// world-state caveat), and updates the best-block pointer.
    fn switch_best_chain(&self, old_best: &Block, new_best: &Block) -> Result<(), ChainError> {
        let mut deactivate = Vec::new();
        let mut activate = Vec::new();

        let mut a = old_best.clone();
        let mut b = new_best.clone();
        while a.id() != b.id() {
            if a.header.height >= b.header.height {
                deactivate.push(a.clone());
                a = match self.repo.get_block(&a.header.parent_hash)? {
                    Some(p) => p,
                    None => break,
                };
            } else {
                activate.push(b.clone());
                b = match self.repo.get_block(&b.header.parent_hash)? {
                    Some(p) => p,
                    None => break,
                };
            }
        }
        activate.reverse();

        for block in &deactivate {
            if let Some(mut info) = self.block_info_by_hash(&block.id(), block.header.height)? {
                info.is_main = false;
                self.repo.put_block_info(&info)?;
            }
        }
        for block in &activate {
            if let Some(mut info) = self.block_info_by_hash(&block.id(), block.header.height)? {
                info.is_main = true;
                self.repo.put_block_info(&info)?;
            }
            if let Err((idx, reason)) =
                self.execute(&block.header.coinbase, block.header.height, &block.transactions)
            {
                return Err(ChainError::Execution(format!(
                    "block {} transaction {idx}: {reason}",
                    block.id()
                )));
            }
        }

        self.repo.set_best_block_hash(&new_best.id())
    }

    /// Composes a candidate block on top of the current best block (spec
    /// §4.3 `generateNewBlock`): height/parent from the tip, coinbase from
    /// the caller, trx-trie-root from `pending_txs`, nonce left at 0 for the
    /// miner to fill in.
    pub fn generate_new_block(
        &self,
        coinbase: Address,
        pending_txs: Vec<Transaction>,
        timestamp: u32,
    ) -> Result<Block, ChainError> {
        let parent = self.get_best_block()?;
        let trx_trie_root = merkle_root(&pending_txs.iter().map(Transaction::id).collect::<Vec<_>>());
        let difficulty = self.calculate_block_difficulty(&parent.header, timestamp);

        let header = BlockHeader {
            version: parent.header.version,
            height: parent.header.height + 1,
            parent_hash: parent.id(),
            coinbase,
            timestamp,
            difficulty_compact: difficulty,
            nonce: 0,
            total_difficulty: 0,
            state_root: parent.header.state_root,
            trx_trie_root,
        };

        Ok(Block {
            header,
            transactions: pending_txs,
            gas_limit_bytes: parent.gas_limit_bytes.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::pow::search_for_nonce;
    use crate::database::MemoryRepository;
    use ed25519_dalek::{Keypair, Signer};
    use rand::rngs::OsRng;

    use super::super::executor::ValueTransferExecutor;

    fn genesis_block() -> Block {
        Block {
            header: BlockHeader {
                version: 1,
                height: 0,
                parent_hash: Hash256::ZERO,
                coinbase: Address::ZERO,
                timestamp: 1_700_000_000,
                difficulty_compact: 0x1f00_ffff,
                nonce: 0,
                total_difficulty: 0,
                state_root: Hash256::ZERO,
                trx_trie_root: Hash256::ZERO,
            },
            transactions: Vec::new(),
            gas_limit_bytes: Vec::new(),
        }
    }

    fn engine() -> ChainEngine<MemoryRepository, ValueTransferExecutor> {
        let repo = Arc::new(MemoryRepository::new());
        let executor = Arc::new(ValueTransferExecutor::new());
        ChainEngine::new(repo, executor, genesis_block()).unwrap()
    }

    fn mine_child(engine: &ChainEngine<MemoryRepository, ValueTransferExecutor>, timestamp: u32) -> Block {
        let mut block = engine
            .generate_new_block(Address::ZERO, Vec::new(), timestamp)
            .unwrap();
        let nonce = search_for_nonce(&mut block.header, || true).expect("trivial difficulty hits");
        block.header.nonce = nonce;
        block.header.total_difficulty = block.header.difficulty_compact;
        block
    }

    #[test]
    fn genesis_is_seeded_as_best() {
        let engine = engine();
        let best = engine.get_best_block().unwrap();
        assert_eq!(best.header.height, 0);
    }

    #[test]
    fn importing_child_extends_best_chain() {
        let engine = engine();
        let child = mine_child(&engine, 1_700_000_010);
        let outcome = engine.import_block(child.clone()).unwrap();
        assert_eq!(outcome, ChainImportOutcome::BestBlock);
        assert_eq!(engine.get_best_block().unwrap().id(), child.id());
    }

    #[test]
    fn reimporting_known_block_is_exist() {
        let engine = engine();
        let child = mine_child(&engine, 1_700_000_010);
        engine.import_block(child.clone()).unwrap();
        assert_eq!(
            engine.import_block(child).unwrap(),
            ChainImportOutcome::Exist
        );
    }

    fn mine_child_of(
        engine: &ChainEngine<MemoryRepository, ValueTransferExecutor>,
        parent: &Block,
        timestamp: u32,
    ) -> Block {
        let difficulty = engine.calculate_block_difficulty(&parent.header, timestamp);
        let mut header = BlockHeader {
            version: parent.header.version,
            height: parent.header.height + 1,
            parent_hash: parent.id(),
            coinbase: Address::ZERO,
            timestamp,
            difficulty_compact: difficulty,
            nonce: 0,
            total_difficulty: 0,
            state_root: parent.header.state_root,
            trx_trie_root: Hash256::ZERO,
        };
        let nonce = search_for_nonce(&mut header, || true).expect("trivial difficulty hits");
        header.nonce = nonce;
        header.total_difficulty = parent.header.total_difficulty + difficulty;
        Block {
            header,
            transactions: Vec::new(),
            gas_limit_bytes: parent.gas_limit_bytes.clone(),
        }
    }

    #[test]
    fn tied_total_difficulty_keeps_the_first_imported_tip() {
        let engine = engine();
        let genesis = engine.get_best_block().unwrap();

        let a = mine_child_of(&engine, &genesis, 1_700_000_010);
        let b = mine_child_of(&engine, &genesis, 1_700_000_010);
        assert_eq!(a.header.total_difficulty, b.header.total_difficulty);

        assert_eq!(engine.import_block(a.clone()).unwrap(), ChainImportOutcome::BestBlock);
        assert_eq!(engine.import_block(b).unwrap(), ChainImportOutcome::NonBestBlock);
        assert_eq!(engine.get_best_block().unwrap().id(), a.id());
    }

    #[test]
    fn deeper_fork_overtakes_the_tied_sibling() {
        let engine = engine();
        let genesis = engine.get_best_block().unwrap();

        let a = mine_child_of(&engine, &genesis, 1_700_000_010);
        assert_eq!(engine.import_block(a.clone()).unwrap(), ChainImportOutcome::BestBlock);

        let b = mine_child_of(&engine, &genesis, 1_700_000_010);
        assert_eq!(engine.import_block(b.clone()).unwrap(), ChainImportOutcome::NonBestBlock);
        assert_eq!(engine.get_best_block().unwrap().id(), a.id());

        let b2 = mine_child_of(&engine, &b, 1_700_000_020);
        assert!(b2.header.total_difficulty > a.header.total_difficulty);
        assert_eq!(engine.import_block(b2.clone()).unwrap(), ChainImportOutcome::BestBlock);
        assert_eq!(engine.get_best_block().unwrap().id(), b2.id());
    }

    #[test]
    fn rejects_block_with_wrong_difficulty() {
        let engine = engine();
        let mut child = mine_child(&engine, 1_700_000_010);
        child.header.difficulty_compact = 0x1d00_ffff;
        // invalidate cached nonce/hash relationship by leaving nonce as-is;
        // difficulty mismatch is checked before the PoW check.
        let outcome = engine.import_block(child).unwrap();
        assert!(matches!(outcome, ChainImportOutcome::Invalid(_)));
    }

    fn signed_tx(keypair: &Keypair, receiver: Address, amount: u128, nonce: u64) -> Transaction {
        let sender = Address::from_public_key(keypair.public.as_bytes());
        let mut tx = Transaction {
            sender,
            receiver,
            amount,
            timestamp_millis: 1_700_000_000_000,
            public_key: keypair.public.as_bytes().to_vec(),
            signature: Vec::new(),
            nonce: nonce.to_be_bytes().to_vec(),
            gas_price: 1,
            gas_limit: 21_000,
            data: Vec::new(),
        };
        let preimage = bincode::serialize(&tx.id()).unwrap();
        tx.signature = keypair.sign(&preimage).to_bytes().to_vec();
        tx
    }

    fn mine_child_with_txs(
        engine: &ChainEngine<MemoryRepository, ValueTransferExecutor>,
        parent: &Block,
        timestamp: u32,
        transactions: Vec<Transaction>,
    ) -> Block {
        let difficulty = engine.calculate_block_difficulty(&parent.header, timestamp);
        let trx_trie_root = merkle_root(&transactions.iter().map(Transaction::id).collect::<Vec<_>>());
        let mut header = BlockHeader {
            version: parent.header.version,
            height: parent.header.height + 1,
            parent_hash: parent.id(),
            coinbase: Address::ZERO,
            timestamp,
            difficulty_compact: difficulty,
            nonce: 0,
            total_difficulty: 0,
            state_root: parent.header.state_root,
            trx_trie_root,
        };
        let nonce = search_for_nonce(&mut header, || true).expect("trivial difficulty hits");
        header.nonce = nonce;
        header.total_difficulty = parent.header.total_difficulty + difficulty;
        Block {
            header,
            transactions,
            gas_limit_bytes: parent.gas_limit_bytes.clone(),
        }
    }

    #[test]
    fn out_of_order_sender_nonce_is_rejected_at_import() {
        let engine = engine();
        let genesis = engine.get_best_block().unwrap();
        let keypair = Keypair::generate(&mut OsRng {});
        let receiver = Address([7u8; crate::crypto::ADDRESS_LEN]);

        // Nonce 2 skips the sender's expected next nonce of 0.
        let tx = signed_tx(&keypair, receiver, 1, 2);
        let child = mine_child_with_txs(&engine, &genesis, 1_700_000_010, vec![tx]);

        let outcome = engine.import_block(child).unwrap();
        assert!(matches!(outcome, ChainImportOutcome::Invalid(_)));
    }

    #[test]
    fn duplicate_nonce_within_a_block_is_rejected_at_import() {
        let engine = engine();
        let genesis = engine.get_best_block().unwrap();
        let keypair = Keypair::generate(&mut OsRng {});
        let receiver = Address([7u8; crate::crypto::ADDRESS_LEN]);

        let first = signed_tx(&keypair, receiver, 1, 0);
        let second = signed_tx(&keypair, receiver, 1, 0);
        let child = mine_child_with_txs(&engine, &genesis, 1_700_000_010, vec![first, second]);

        let outcome = engine.import_block(child).unwrap();
        assert!(matches!(outcome, ChainImportOutcome::Invalid(_)));
    }

    #[test]
    fn activating_a_block_with_a_reverting_transaction_is_an_error() {
        let engine = engine();
        let genesis = engine.get_best_block().unwrap();
        let keypair = Keypair::generate(&mut OsRng {});
        let receiver = Address([7u8; crate::crypto::ADDRESS_LEN]);

        // Sender nonce matches (so import-time shape validation passes), but
        // the sender has no funded balance, so execution reverts once this
        // block is activated onto the best chain.
        let tx = signed_tx(&keypair, receiver, 50, 0);
        let child = mine_child_with_txs(&engine, &genesis, 1_700_000_010, vec![tx]);

        let result = engine.import_block(child);
        assert!(matches!(result, Err(ChainError::Execution(_))));
    }
}
