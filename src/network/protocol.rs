//! Wire protocol: the ten message codes, their payloads, and length-prefixed
//! framing (spec §4.5). Payloads use the crate's canonical `bincode` codec,
//! the same one used for on-disk storage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blockchain::{Block, BlockHeader, Transaction};
use crate::crypto::Hash256;

/// Maximum accepted frame payload; guards against a malformed length prefix
/// driving an unbounded allocation.
pub const MAX_PAYLOAD_SIZE: usize = 8 * 1024 * 1024;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame payload of {0} bytes exceeds the maximum of {MAX_PAYLOAD_SIZE}")]
    PayloadTooLarge(usize),
    #[error("unknown message code {0}")]
    UnknownCode(u8),
    #[error("malformed payload: {0}")]
    Encoding(#[from] bincode::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusPayload {
    pub protocol_version: u32,
    pub network_id: u32,
    pub genesis_hash: Hash256,
    pub best_hash: Hash256,
    pub total_difficulty: u64,
    pub best_height: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetBlocksPayload {
    pub from_height: u64,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GetBlockHeadersPayload {
    pub from_height: u64,
    pub count: u32,
}

/// One message per spec §4.5's ten wire codes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NetworkMessage {
    Disconnect,
    Status(StatusPayload),
    GetNodes,
    Nodes(Vec<NodeAddress>),
    NewTransactions(Vec<Transaction>),
    NewBlock(Block),
    GetBlocks(GetBlocksPayload),
    Blocks(Vec<Block>),
    GetBlockHeaders(GetBlockHeadersPayload),
    BlockHeaders(Vec<BlockHeader>),
}

impl NetworkMessage {
    fn code(&self) -> u8 {
        match self {
            NetworkMessage::Disconnect => 0,
            NetworkMessage::Status(_) => 1,
            NetworkMessage::GetNodes => 2,
            NetworkMessage::Nodes(_) => 3,
            NetworkMessage::NewTransactions(_) => 4,
            NetworkMessage::NewBlock(_) => 5,
            NetworkMessage::GetBlocks(_) => 6,
            NetworkMessage::Blocks(_) => 7,
            NetworkMessage::GetBlockHeaders(_) => 8,
            NetworkMessage::BlockHeaders(_) => 9,
        }
    }

    /// `[4-byte BE length][1-byte code][payload]`. Length counts the code
    /// byte plus payload, so a receiver can read exactly that many bytes
    /// before decoding. Each arm serializes its concrete payload type
    /// directly (not wrapped in an enum) so `decode_body` can deserialize
    /// that same concrete type back out without an extra discriminant.
    pub fn encode_frame(&self) -> Result<Vec<u8>, ProtocolError> {
        let payload = match self {
            NetworkMessage::Disconnect | NetworkMessage::GetNodes => Vec::new(),
            NetworkMessage::Status(p) => bincode::serialize(p)?,
            NetworkMessage::Nodes(p) => bincode::serialize(p)?,
            NetworkMessage::NewTransactions(p) => bincode::serialize(p)?,
            NetworkMessage::NewBlock(p) => bincode::serialize(p)?,
            NetworkMessage::GetBlocks(p) => bincode::serialize(p)?,
            NetworkMessage::Blocks(p) => bincode::serialize(p)?,
            NetworkMessage::GetBlockHeaders(p) => bincode::serialize(p)?,
            NetworkMessage::BlockHeaders(p) => bincode::serialize(p)?,
        };
        let body_len = 1 + payload.len();
        let mut frame = Vec::with_capacity(4 + body_len);
        frame.extend_from_slice(&(body_len as u32).to_be_bytes());
        frame.push(self.code());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Decodes a length-delimited body (the bytes following the 4-byte
    /// length prefix): the first byte is the code, the rest the payload.
    pub fn decode_body(body: &[u8]) -> Result<Self, ProtocolError> {
        let (&code, payload) = body.split_first().ok_or(ProtocolError::UnknownCode(0))?;
        Ok(match code {
            0 => NetworkMessage::Disconnect,
            1 => NetworkMessage::Status(bincode::deserialize(payload)?),
            2 => NetworkMessage::GetNodes,
            3 => NetworkMessage::Nodes(bincode::deserialize(payload)?),
            4 => NetworkMessage::NewTransactions(bincode::deserialize(payload)?),
            5 => NetworkMessage::NewBlock(bincode::deserialize(payload)?),
            6 => NetworkMessage::GetBlocks(bincode::deserialize(payload)?),
            7 => NetworkMessage::Blocks(bincode::deserialize(payload)?),
            8 => NetworkMessage::GetBlockHeaders(bincode::deserialize(payload)?),
            9 => NetworkMessage::BlockHeaders(bincode::deserialize(payload)?),
            other => return Err(ProtocolError::UnknownCode(other)),
        })
    }

    /// Reads the 4-byte BE length prefix and validates it against the cap,
    /// without touching the body. Callers use this to size their read buffer.
    pub fn read_frame_len(prefix: [u8; 4]) -> Result<usize, ProtocolError> {
        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge(len));
        }
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_a_frame() {
        let msg = NetworkMessage::Status(StatusPayload {
            protocol_version: PROTOCOL_VERSION,
            network_id: 1,
            genesis_hash: Hash256::ZERO,
            best_hash: Hash256::ZERO,
            total_difficulty: 42,
            best_height: 7,
        });
        let frame = msg.encode_frame().unwrap();
        let len = NetworkMessage::read_frame_len(frame[0..4].try_into().unwrap()).unwrap();
        assert_eq!(len, frame.len() - 4);
        let decoded = NetworkMessage::decode_body(&frame[4..]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn empty_messages_roundtrip() {
        for msg in [NetworkMessage::Disconnect, NetworkMessage::GetNodes] {
            let frame = msg.encode_frame().unwrap();
            let decoded = NetworkMessage::decode_body(&frame[4..]).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let huge = ((MAX_PAYLOAD_SIZE + 1) as u32).to_be_bytes();
        assert!(matches!(
            NetworkMessage::read_frame_len(huge),
            Err(ProtocolError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn unknown_code_is_rejected() {
        let body = vec![99u8];
        assert!(matches!(
            NetworkMessage::decode_body(&body),
            Err(ProtocolError::UnknownCode(99))
        ));
    }
}
