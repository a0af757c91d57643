//! Crate-wide error aggregate. Each subsystem defines its own typed error
//! (`ChainError`, `SyncError`, `ProtocolError`, `DbError`, `MinerError`);
//! `NodeError` is the aggregate surfaced at the top level (e.g. `main.rs`).

use thiserror::Error;

use crate::blockchain::chain::ChainError;
use crate::database::DbError;
use crate::miner::MinerError;
use crate::network::{ProtocolError, SyncError};

#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Miner(#[from] MinerError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
