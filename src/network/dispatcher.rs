//! Peer message dispatcher (spec §4.5): decodes a frame and routes it.
//! Every handler is fault-isolated — a malformed or rejected message never
//! tears down the connection by itself; only `DISCONNECT` does.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::blockchain::{ChainEngine, ChainImportOutcome, PendingPool, StateExecutor};
use crate::database::Repository;

use super::peer::{Peer, PeerId, PeerRoster};
use super::protocol::{
    GetBlockHeadersPayload, GetBlocksPayload, NetworkMessage, NodeAddress, StatusPayload,
};
use super::sync::{SyncAction, SyncManager};

/// What the dispatcher needs from the mining subsystem; kept as a trait so
/// this module doesn't have to be generic over the miner's executor/repo
/// type parameters.
pub trait MinerControl: Send + Sync {
    /// Height of the block currently being mined, if mining is in progress.
    fn working_height(&self) -> Option<u64>;
    /// Cancels the in-progress attempt, if any.
    fn cancel(&self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    ToPeer(PeerId, NetworkMessage),
    /// Sent to every connected peer other than `except`.
    Broadcast { except: PeerId, message: NetworkMessage },
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DispatchResult {
    pub outbound: Vec<Outbound>,
    pub disconnect: bool,
}

impl DispatchResult {
    fn reply(to: PeerId, message: NetworkMessage) -> Self {
        Self {
            outbound: vec![Outbound::ToPeer(to, message)],
            disconnect: false,
        }
    }

    fn broadcast(except: PeerId, message: NetworkMessage) -> Self {
        Self {
            outbound: vec![Outbound::Broadcast { except, message }],
            disconnect: false,
        }
    }

    fn none() -> Self {
        Self::default()
    }
}

pub struct Dispatcher<R: Repository, E: StateExecutor> {
    chain: Arc<ChainEngine<R, E>>,
    pool: Arc<RwLock<PendingPool>>,
    peers: Arc<PeerRoster>,
    sync: Arc<SyncManager>,
    miner: Arc<dyn MinerControl>,
}

impl<R: Repository, E: StateExecutor> Dispatcher<R, E> {
    pub fn new(
        chain: Arc<ChainEngine<R, E>>,
        pool: Arc<RwLock<PendingPool>>,
        peers: Arc<PeerRoster>,
        sync: Arc<SyncManager>,
        miner: Arc<dyn MinerControl>,
    ) -> Self {
        Self {
            chain,
            pool,
            peers,
            sync,
            miner,
        }
    }

    pub fn handle(&self, from: PeerId, message: NetworkMessage) -> DispatchResult {
        match message {
            NetworkMessage::Disconnect => DispatchResult {
                outbound: Vec::new(),
                disconnect: true,
            },
            NetworkMessage::Status(status) => self.on_status(from, status),
            NetworkMessage::GetNodes => self.on_get_nodes(from),
            NetworkMessage::Nodes(nodes) => self.on_nodes(nodes),
            NetworkMessage::NewTransactions(txs) => self.on_new_transactions(txs),
            NetworkMessage::NewBlock(block) => self.on_new_block(from, block),
            NetworkMessage::GetBlocks(req) => self.on_get_blocks(from, req),
            NetworkMessage::GetBlockHeaders(req) => self.on_get_block_headers(from, req),
            NetworkMessage::Blocks(blocks) => self.on_blocks(blocks),
            NetworkMessage::BlockHeaders(headers) => self.on_block_headers(headers),
        }
    }

    fn our_totals(&self) -> (u64, u64) {
        match self.chain.get_best_block() {
            Ok(block) => (block.header.total_difficulty, block.header.height),
            Err(_) => (0, 0),
        }
    }

    fn on_status(&self, from: PeerId, status: StatusPayload) -> DispatchResult {
        self.peers.update_status(from, &status);

        let (our_td, our_height) = self.our_totals();
        if status.total_difficulty > our_td {
            if self.miner.working_height().is_some() {
                self.miner.cancel();
            }
            match self
                .sync
                .on_peer_status(status.total_difficulty, status.best_height, our_td, our_height)
            {
                SyncAction::RequestBlocks { from_height } => DispatchResult::reply(
                    from,
                    NetworkMessage::GetBlocks(GetBlocksPayload {
                        from_height,
                        count: super::sync::BLOCKS_PER_REQUEST,
                    }),
                ),
                SyncAction::RequestHeaders { from_height, count } => DispatchResult::reply(
                    from,
                    NetworkMessage::GetBlockHeaders(GetBlockHeadersPayload { from_height, count }),
                ),
                SyncAction::Completed | SyncAction::None => DispatchResult::none(),
            }
        } else {
            DispatchResult::none()
        }
    }

    fn on_get_nodes(&self, from: PeerId) -> DispatchResult {
        DispatchResult::reply(from, NetworkMessage::Nodes(self.peers.addresses_excluding(from)))
    }

    fn on_nodes(&self, nodes: Vec<NodeAddress>) -> DispatchResult {
        self.peers.merge_discovered(nodes);
        DispatchResult::none()
    }

    fn on_new_transactions(&self, txs: Vec<crate::blockchain::Transaction>) -> DispatchResult {
        let mut pool = self.pool.write();
        for tx in txs {
            if tx.sender_matches_public_key() && tx.verify_signature().is_ok() {
                pool.admit(tx);
            }
        }
        DispatchResult::none()
    }

    fn on_new_block(&self, from: PeerId, block: crate::blockchain::Block) -> DispatchResult {
        let height = block.header.height;
        match self.chain.import_block(block.clone()) {
            Ok(ChainImportOutcome::BestBlock) => {
                if let Some(working_height) = self.miner.working_height() {
                    if working_height <= height {
                        self.miner.cancel();
                    }
                }
                self.pool.write().purge_confirmed(&block.transactions);
                DispatchResult::broadcast(from, NetworkMessage::NewBlock(block))
            }
            _ => DispatchResult::none(),
        }
    }

    fn on_get_blocks(&self, from: PeerId, req: GetBlocksPayload) -> DispatchResult {
        match self.chain.main_chain_blocks(req.from_height, req.count) {
            Ok(blocks) => DispatchResult::reply(from, NetworkMessage::Blocks(blocks)),
            Err(_) => DispatchResult::none(),
        }
    }

    fn on_get_block_headers(&self, from: PeerId, req: GetBlockHeadersPayload) -> DispatchResult {
        match self.chain.main_chain_headers(req.from_height, req.count) {
            Ok(headers) => DispatchResult::reply(from, NetworkMessage::BlockHeaders(headers)),
            Err(_) => DispatchResult::none(),
        }
    }

    fn on_blocks(&self, blocks: Vec<crate::blockchain::Block>) -> DispatchResult {
        use super::sync::SyncPhase;
        if self.sync.phase() == SyncPhase::InitSyncGetBlocks {
            for block in &blocks {
                let _ = self.chain.import_block(block.clone());
            }
            self.sync.on_blocks(!blocks.is_empty());
        } else {
            for block in blocks {
                let _ = self.chain.import_block(block);
            }
        }
        DispatchResult::none()
    }

    fn on_block_headers(&self, headers: Vec<crate::blockchain::BlockHeader>) -> DispatchResult {
        use super::sync::SyncPhase;
        if self.sync.phase() != SyncPhase::InitSyncGetHeaders {
            return DispatchResult::none();
        }
        if headers.is_empty() {
            self.sync.on_headers(true, 0, false);
            return DispatchResult::none();
        }
        let first = &headers[0];
        let has_local_parent = self
            .chain
            .block_exists(&first.parent_hash)
            .unwrap_or(false);
        match self
            .sync
            .on_headers(false, first.height, has_local_parent)
        {
            SyncAction::RequestBlocks { from_height } => {
                let _ = from_height; // the peer to re-request from is tracked by the manager
                DispatchResult::none()
            }
            _ => DispatchResult::none(),
        }
    }
}

/// Registers a freshly connected peer; returns the id to use for subsequent
/// `handle()` calls.
pub fn register_peer(peers: &PeerRoster, id: PeerId, address: NodeAddress) {
    peers.insert(Peer::new(id, address));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::executor::ValueTransferExecutor;
    use crate::blockchain::{Block, BlockHeader};
    use crate::crypto::{Address, Hash256};
    use crate::database::MemoryRepository;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct NoopMiner(AtomicBool);
    impl MinerControl for NoopMiner {
        fn working_height(&self) -> Option<u64> {
            None
        }
        fn cancel(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn genesis() -> Block {
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

    fn dispatcher() -> Dispatcher<MemoryRepository, ValueTransferExecutor> {
        let repo = Arc::new(MemoryRepository::new());
        let executor = Arc::new(ValueTransferExecutor::new());
        let chain = Arc::new(ChainEngine::new(repo, executor, genesis()).unwrap());
        Dispatcher::new(
            chain,
            Arc::new(RwLock::new(PendingPool::new())),
            Arc::new(PeerRoster::new()),
            Arc::new(SyncManager::new(Duration::from_secs(30))),
            Arc::new(NoopMiner(AtomicBool::new(false))),
        )
    }

    #[test]
    fn get_nodes_replies_with_roster_minus_requester() {
        let d = dispatcher();
        d.peers.insert(Peer::new(2, NodeAddress { host: "h".into(), port: 1 }));
        let result = d.handle(1, NetworkMessage::GetNodes);
        assert_eq!(result.outbound.len(), 1);
        assert!(matches!(&result.outbound[0], Outbound::ToPeer(1, NetworkMessage::Nodes(_))));
    }

    #[test]
    fn disconnect_message_requests_disconnect() {
        let d = dispatcher();
        let result = d.handle(1, NetworkMessage::Disconnect);
        assert!(result.disconnect);
    }

    #[test]
    fn ahead_status_triggers_a_sync_request() {
        let d = dispatcher();
        d.peers.insert(Peer::new(1, NodeAddress { host: "h".into(), port: 1 }));
        let status = StatusPayload {
            protocol_version: 1,
            network_id: 1,
            genesis_hash: Hash256::ZERO,
            best_hash: Hash256::ZERO,
            total_difficulty: 999,
            best_height: 50,
        };
        let result = d.handle(1, NetworkMessage::Status(status));
        assert_eq!(result.outbound.len(), 1);
    }

    #[test]
    fn nodes_message_merges_into_the_discovery_set() {
        let d = dispatcher();
        let addr = NodeAddress { host: "h".into(), port: 9 };
        let result = d.handle(1, NetworkMessage::Nodes(vec![addr.clone()]));
        assert!(result.outbound.is_empty());
        assert_eq!(d.peers.discovered_addresses(), vec![addr]);
    }

    #[test]
    fn get_blocks_returns_main_chain_range() {
        let d = dispatcher();
        let result = d.handle(
            1,
            NetworkMessage::GetBlocks(GetBlocksPayload { from_height: 0, count: 5 }),
        );
        match &result.outbound[0] {
            Outbound::ToPeer(_, NetworkMessage::Blocks(blocks)) => assert_eq!(blocks.len(), 1),
            other => panic!("unexpected outbound: {other:?}"),
        }
    }
}
