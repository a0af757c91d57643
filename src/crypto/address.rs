//! Account addresses and signature verification.
//!
//! Addresses are the low 20 bytes of the SHA-256 hash of an ed25519
//! public key, matching the "key-hash address derivation" collaborator
//! surface described for the core. Contract-creation addresses use the
//! same primitive over `(sender, nonce)`, per the executor contract.

use super::hash::sha256;
use ed25519_dalek::{PublicKey as DalekPublicKey, Signature, Verifier};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const ADDRESS_LEN: usize = 20;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    pub fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Derive an address from a raw ed25519 public key.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let digest = sha256(public_key);
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest.as_bytes()[12..]);
        Address(out)
    }

    /// Contract-creation address: `keccak-like(sender, nonce)` truncated to
    /// 20 bytes (spec §4.7). We use SHA-256 as the "keccak-like" primitive
    /// since the actual hash family is an executor-internal detail out of
    /// scope for this crate.
    pub fn for_contract_creation(sender: &Address, nonce: u64) -> Self {
        let mut preimage = Vec::with_capacity(ADDRESS_LEN + 8);
        preimage.extend_from_slice(&sender.0);
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let digest = sha256(&preimage);
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest.as_bytes()[12..]);
        Address(out)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
            if bytes.len() != ADDRESS_LEN {
                return Err(serde::de::Error::custom("expected 20 bytes of hex"));
            }
            let mut arr = [0u8; ADDRESS_LEN];
            arr.copy_from_slice(&bytes);
            Ok(Address(arr))
        } else {
            let v: Vec<u8> = Deserialize::deserialize(deserializer)?;
            if v.len() != ADDRESS_LEN {
                return Err(serde::de::Error::custom("expected 20 raw bytes"));
            }
            let mut arr = [0u8; ADDRESS_LEN];
            arr.copy_from_slice(&v);
            Ok(Address(arr))
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureVerifyError {
    #[error("malformed public key")]
    MalformedPublicKey,
    #[error("malformed signature")]
    MalformedSignature,
    #[error("signature does not verify")]
    Invalid,
}

/// Verify an ed25519 signature over `message` by `public_key`.
pub fn verify_signature(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureVerifyError> {
    let key = DalekPublicKey::from_bytes(public_key)
        .map_err(|_| SignatureVerifyError::MalformedPublicKey)?;
    let sig =
        Signature::from_bytes(signature).map_err(|_| SignatureVerifyError::MalformedSignature)?;
    key.verify(message, &sig)
        .map_err(|_| SignatureVerifyError::Invalid)
}
