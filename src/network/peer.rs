//! Peer metadata and the connected-peer roster (spec §4.5's `GET_NODES`
//! target and §4.6's "manager owns the peer roster").

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use crate::crypto::Hash256;
use crate::network::protocol::{NodeAddress, StatusPayload};

pub type PeerId = u64;

/// What the dispatcher knows about a connected peer, refreshed on each
/// `STATUS` it sends.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: PeerId,
    pub address: NodeAddress,
    pub protocol_version: u32,
    pub network_id: u32,
    pub genesis_hash: Hash256,
    pub best_hash: Hash256,
    pub total_difficulty: u64,
    pub best_height: u64,
}

impl Peer {
    pub fn new(id: PeerId, address: NodeAddress) -> Self {
        Self {
            id,
            address,
            protocol_version: 0,
            network_id: 0,
            genesis_hash: Hash256::ZERO,
            best_hash: Hash256::ZERO,
            total_difficulty: 0,
            best_height: 0,
        }
    }

    pub fn apply_status(&mut self, status: &StatusPayload) {
        self.protocol_version = status.protocol_version;
        self.network_id = status.network_id;
        self.genesis_hash = status.genesis_hash;
        self.best_hash = status.best_hash;
        self.total_difficulty = status.total_difficulty;
        self.best_height = status.best_height;
    }

    pub fn is_ahead_of(&self, our_total_difficulty: u64) -> bool {
        self.total_difficulty > our_total_difficulty
    }
}

/// The set of currently connected peers. A peer's lifetime ends at transport
/// close (spec §3's ownership note); the dispatcher removes it then.
#[derive(Default)]
pub struct PeerRoster {
    peers: RwLock<HashMap<PeerId, Peer>>,
    /// Addresses learned from `NODES` replies but not yet connected to
    /// (spec §4.5: "merge received nodes into discovery set").
    discovered: RwLock<HashSet<NodeAddress>>,
}

impl PeerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges addresses received in a `NODES` message into the discovery set,
    /// skipping ones already connected.
    pub fn merge_discovered(&self, addresses: impl IntoIterator<Item = NodeAddress>) {
        let connected: HashSet<NodeAddress> = self
            .peers
            .read()
            .values()
            .map(|p| p.address.clone())
            .collect();
        let mut discovered = self.discovered.write();
        for address in addresses {
            if !connected.contains(&address) {
                discovered.insert(address);
            }
        }
    }

    /// Addresses awaiting a connection attempt.
    pub fn discovered_addresses(&self) -> Vec<NodeAddress> {
        self.discovered.read().iter().cloned().collect()
    }

    /// Drops an address from the discovery set once a connection has been
    /// attempted (successfully or not).
    pub fn forget_discovered(&self, address: &NodeAddress) {
        self.discovered.write().remove(address);
    }

    pub fn insert(&self, peer: Peer) {
        self.discovered.write().remove(&peer.address);
        self.peers.write().insert(peer.id, peer);
    }

    pub fn remove(&self, id: PeerId) {
        self.peers.write().remove(&id);
    }

    pub fn update_status(&self, id: PeerId, status: &StatusPayload) {
        if let Some(peer) = self.peers.write().get_mut(&id) {
            peer.apply_status(status);
        }
    }

    pub fn get(&self, id: PeerId) -> Option<Peer> {
        self.peers.read().get(&id).cloned()
    }

    /// Roster minus the requester, for `GET_NODES` replies.
    pub fn addresses_excluding(&self, excluded: PeerId) -> Vec<NodeAddress> {
        self.peers
            .read()
            .values()
            .filter(|p| p.id != excluded)
            .map(|p| p.address.clone())
            .collect()
    }

    pub fn ids_excluding(&self, excluded: PeerId) -> Vec<PeerId> {
        self.peers
            .read()
            .keys()
            .copied()
            .filter(|id| *id != excluded)
            .collect()
    }

    pub fn best_total_difficulty(&self) -> Option<(PeerId, u64)> {
        self.peers
            .read()
            .values()
            .map(|p| (p.id, p.total_difficulty))
            .max_by_key(|(_, td)| *td)
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> NodeAddress {
        NodeAddress {
            host: "127.0.0.1".into(),
            port,
        }
    }

    #[test]
    fn addresses_excluding_omits_the_requester() {
        let roster = PeerRoster::new();
        roster.insert(Peer::new(1, addr(1)));
        roster.insert(Peer::new(2, addr(2)));
        let addrs = roster.addresses_excluding(1);
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0].port, 2);
    }

    #[test]
    fn status_update_tracks_total_difficulty() {
        let roster = PeerRoster::new();
        roster.insert(Peer::new(1, addr(1)));
        roster.update_status(
            1,
            &StatusPayload {
                protocol_version: 1,
                network_id: 1,
                genesis_hash: Hash256::ZERO,
                best_hash: Hash256::ZERO,
                total_difficulty: 99,
                best_height: 5,
            },
        );
        assert_eq!(roster.get(1).unwrap().total_difficulty, 99);
        assert_eq!(roster.best_total_difficulty(), Some((1, 99)));
    }

    #[test]
    fn removed_peer_drops_out_of_the_roster() {
        let roster = PeerRoster::new();
        roster.insert(Peer::new(1, addr(1)));
        roster.remove(1);
        assert!(roster.is_empty());
    }

    #[test]
    fn merge_discovered_skips_already_connected_addresses() {
        let roster = PeerRoster::new();
        roster.insert(Peer::new(1, addr(1)));
        roster.merge_discovered([addr(1), addr(2), addr(3)]);
        let mut discovered = roster.discovered_addresses();
        discovered.sort_by_key(|a| a.port);
        assert_eq!(discovered, vec![addr(2), addr(3)]);
    }

    #[test]
    fn connecting_to_a_discovered_address_forgets_it() {
        let roster = PeerRoster::new();
        roster.merge_discovered([addr(2)]);
        roster.insert(Peer::new(2, addr(2)));
        assert!(roster.discovered_addresses().is_empty());
    }
}
