//! Data model and chain-import engine: blocks, transactions, account state,
//! the pending pool, and the executor collaborator contract.

pub mod account;
pub mod block;
pub mod block_info;
pub mod chain;
pub mod executor;
pub mod pool;
pub mod reward;
pub mod transaction;

pub use account::AccountState;
pub use block::{Block, BlockHeader, BlockValidationError};
pub use block_info::BlockInfo;
pub use chain::{ChainEngine, ChainImportOutcome};
pub use executor::{ExecutionOutcome, PairingEngine, StateExecutor, ValueTransferExecutor};
pub use pool::PendingPool;
pub use transaction::Transaction;
