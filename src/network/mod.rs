//! Networking: wire protocol, peer roster, message dispatch, and the sync
//! state machine (spec §4.4–§4.5).

pub mod dispatcher;
pub mod peer;
pub mod protocol;
pub mod sync;

pub use dispatcher::{DispatchResult, Dispatcher, MinerControl, Outbound};
pub use peer::{Peer, PeerId, PeerRoster};
pub use protocol::{
    GetBlockHeadersPayload, GetBlocksPayload, NetworkMessage, NodeAddress, ProtocolError,
    StatusPayload, PROTOCOL_VERSION,
};
pub use sync::{SyncAction, SyncError, SyncManager, SyncPhase};
