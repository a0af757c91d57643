//! Transactions: immutable, signed value transfers (and, prospectively,
//! contract calls) that mutate the world-state when applied.

use crate::crypto::{double_sha256, verify_signature, Address, Hash256, SignatureVerifyError};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// A signed transaction. Identity is the double-SHA256 of the canonical
/// encoding of every field *except* `signature` — signing covers that same
/// preimage, so identity is stable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub sender: Address,
    pub receiver: Address,
    pub amount: u128,
    pub timestamp_millis: u64,
    #[serde(with = "serde_bytes")]
    pub public_key: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
    /// Per-sender replay nonce, carried as big-endian bytes (spec: "nonce-bytes").
    #[serde(with = "serde_bytes")]
    pub nonce: Vec<u8>,
    pub gas_price: u64,
    pub gas_limit: u64,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// The subset of fields that make up the signed preimage / identity hash.
/// Declared separately so encoding it never accidentally includes `signature`.
#[derive(Serialize)]
struct SignedPreimage<'a> {
    sender: &'a Address,
    receiver: &'a Address,
    amount: u128,
    timestamp_millis: u64,
    #[serde(with = "serde_bytes")]
    public_key: &'a [u8],
    #[serde(with = "serde_bytes")]
    nonce: &'a [u8],
    gas_price: u64,
    gas_limit: u64,
    #[serde(with = "serde_bytes")]
    data: &'a [u8],
}

impl Transaction {
    fn preimage_bytes(&self) -> Vec<u8> {
        let preimage = SignedPreimage {
            sender: &self.sender,
            receiver: &self.receiver,
            amount: self.amount,
            timestamp_millis: self.timestamp_millis,
            public_key: &self.public_key,
            nonce: &self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            data: &self.data,
        };
        bincode::serialize(&preimage).expect("transaction preimage is serializable")
    }

    /// Transaction identity: hash of the canonical encoding without the signature.
    pub fn id(&self) -> Hash256 {
        double_sha256(&self.preimage_bytes())
    }

    /// Full canonical storage/wire encoding (round-trips via `decode`).
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("transaction is serializable")
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// The replay-protection nonce as a big integer, comparable against
    /// `AccountState::nonce`.
    pub fn nonce_value(&self) -> BigUint {
        BigUint::from_bytes_be(&self.nonce)
    }

    /// Verify the signature covers this transaction's preimage and was
    /// produced by the embedded public key. Does *not* check that the
    /// public key hashes to `sender` — callers combine this with
    /// `Address::from_public_key` when that binding matters.
    pub fn verify_signature(&self) -> Result<(), SignatureVerifyError> {
        verify_signature(&self.public_key, &self.preimage_bytes(), &self.signature)
    }

    /// Checks the embedded public key actually derives `sender`.
    pub fn sender_matches_public_key(&self) -> bool {
        Address::from_public_key(&self.public_key) == self.sender
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Keypair, Signer};
    use rand::rngs::OsRng;

    fn signed_transfer(nonce: u64, amount: u128) -> (Transaction, Keypair) {
        let mut csprng = OsRng {};
        let keypair = Keypair::generate(&mut csprng);
        let sender = Address::from_public_key(keypair.public.as_bytes());
        let mut tx = Transaction {
            sender,
            receiver: Address([9u8; crate::crypto::ADDRESS_LEN]),
            amount,
            timestamp_millis: 1_700_000_000_000,
            public_key: keypair.public.as_bytes().to_vec(),
            signature: Vec::new(),
            nonce: nonce.to_be_bytes().to_vec(),
            gas_price: 1,
            gas_limit: 21_000,
            data: Vec::new(),
        };
        let sig = keypair.sign(&tx.preimage_bytes());
        tx.signature = sig.to_bytes().to_vec();
        (tx, keypair)
    }

    #[test]
    fn identity_excludes_signature() {
        let (tx, _kp) = signed_transfer(0, 10);
        let mut other = tx.clone();
        other.signature = vec![0u8; 64];
        assert_eq!(tx.id(), other.id());
    }

    #[test]
    fn signature_verifies_over_preimage() {
        let (tx, _kp) = signed_transfer(1, 10);
        tx.verify_signature().expect("valid signature");
        assert!(tx.sender_matches_public_key());
    }

    #[test]
    fn tampering_with_amount_breaks_signature() {
        let (mut tx, _kp) = signed_transfer(2, 10);
        tx.amount = 999;
        assert!(tx.verify_signature().is_err());
    }

    #[test]
    fn encode_decode_roundtrip() {
        let (tx, _kp) = signed_transfer(3, 55);
        let bytes = tx.encode();
        let back = Transaction::decode(&bytes).unwrap();
        assert_eq!(tx, back);
    }

    #[test]
    fn nonce_value_parses_big_endian_bytes() {
        let (tx, _kp) = signed_transfer(7, 1);
        assert_eq!(tx.nonce_value(), BigUint::from(7u32));
    }
}
