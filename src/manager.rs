//! Node lifecycle manager (spec §4.6): owns the peer roster, the pending
//! pool, and the miner-control flag. Guarantees at most one mining task,
//! refuses to mine while syncing, and cancels the miner when a new best
//! block overtakes it.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::blockchain::chain::ChainError;
use crate::blockchain::{ChainEngine, PendingPool, StateExecutor};
use crate::crypto::Address;
use crate::database::Repository;
use crate::miner::{MineHandle, Miner, MinerError};
use crate::network::dispatcher::MinerControl;
use crate::network::{Dispatcher, PeerRoster, SyncManager};

fn now_unix() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the epoch")
        .as_secs() as u32
}

/// Adapts a `MineHandle` slot to the dispatcher's `MinerControl` seam.
struct ManagerMinerControl<R: Repository, E: StateExecutor> {
    miner: Arc<Miner<R, E>>,
    in_flight: RwLock<Option<(u64, MineHandle)>>,
}

impl<R: Repository + 'static, E: StateExecutor + 'static> MinerControl for ManagerMinerControl<R, E> {
    fn working_height(&self) -> Option<u64> {
        self.in_flight.read().as_ref().map(|(h, _)| *h)
    }

    fn cancel(&self) {
        if let Some((_, handle)) = self.in_flight.write().take() {
            handle.stop();
        }
    }
}

pub struct Manager<R: Repository, E: StateExecutor> {
    chain: Arc<ChainEngine<R, E>>,
    pool: Arc<RwLock<PendingPool>>,
    peers: Arc<PeerRoster>,
    sync: Arc<SyncManager>,
    miner_control: Arc<ManagerMinerControl<R, E>>,
    coinbase: Address,
}

impl<R: Repository + Send + Sync + 'static, E: StateExecutor + Send + Sync + 'static> Manager<R, E> {
    pub fn new(chain: Arc<ChainEngine<R, E>>, coinbase: Address) -> Self {
        let miner = Arc::new(Miner::new(Arc::clone(&chain)));
        Self {
            chain,
            pool: Arc::new(RwLock::new(PendingPool::new())),
            peers: Arc::new(PeerRoster::new()),
            sync: Arc::new(SyncManager::new(std::time::Duration::from_secs(60))),
            miner_control: Arc::new(ManagerMinerControl {
                miner,
                in_flight: RwLock::new(None),
            }),
            coinbase,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher<R, E> {
        Dispatcher::new(
            Arc::clone(&self.chain),
            Arc::clone(&self.pool),
            Arc::clone(&self.peers),
            Arc::clone(&self.sync),
            self.miner_control.clone() as Arc<dyn MinerControl>,
        )
    }

    pub fn peers(&self) -> &Arc<PeerRoster> {
        &self.peers
    }

    pub fn pool(&self) -> &Arc<RwLock<PendingPool>> {
        &self.pool
    }

    pub fn sync(&self) -> &Arc<SyncManager> {
        &self.sync
    }

    pub fn is_mining(&self) -> bool {
        self.miner_control.in_flight.read().is_some()
    }

    pub fn is_syncing(&self) -> bool {
        self.sync.phase() != crate::network::SyncPhase::Idle
    }

    /// Starts mining on top of the current best block with a snapshot of the
    /// pending pool. A no-op while syncing; errors if a mining task is
    /// already running.
    pub fn start_mining(&self) -> Result<(), MinerError> {
        if self.is_syncing() {
            return Ok(());
        }
        if self.is_mining() {
            return Err(MinerError::AlreadyMining);
        }

        let height = self
            .chain
            .get_best_block()
            .map(|b| b.header.height + 1)
            .unwrap_or(0);
        let pending_txs = self.pool.read().snapshot();
        let handle = self
            .miner_control
            .miner
            .start(self.coinbase, pending_txs, now_unix())?;
        *self.miner_control.in_flight.write() = Some((height, handle));
        Ok(())
    }

    /// Cancels any in-progress attempt without starting a new one.
    pub fn stop_mining(&self) {
        self.miner_control.cancel();
    }

    /// Imports a block mined or received out-of-band (e.g. from `main.rs`'s
    /// own mining loop, rather than a peer message), applying the same
    /// broadcast/purge rules the dispatcher applies to `NEW_BLOCK`.
    pub fn import_own_block(
        &self,
        block: crate::blockchain::Block,
    ) -> Result<crate::blockchain::ChainImportOutcome, ChainError> {
        let outcome = self.chain.import_block(block.clone())?;
        if outcome == crate::blockchain::ChainImportOutcome::BestBlock {
            self.pool.write().purge_confirmed(&block.transactions);
        }
        Ok(outcome)
    }
}
