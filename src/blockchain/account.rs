//! Account-state records: the leaves of the world-state mapping addresses
//! to balances, nonces, storage roots, and contract code.

use crate::crypto::Hash256;
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Sentinel for an account with no contract storage.
pub fn empty_state_root() -> Hash256 {
    Hash256::ZERO
}

/// Sentinel for an account with no contract code.
pub fn empty_code_hash() -> Hash256 {
    Hash256::ZERO
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    pub nonce: BigUint,
    pub balance: BigUint,
    pub state_root: Hash256,
    pub code_hash: Hash256,
}

impl AccountState {
    pub fn empty() -> Self {
        Self {
            nonce: BigUint::zero(),
            balance: BigUint::zero(),
            state_root: empty_state_root(),
            code_hash: empty_code_hash(),
        }
    }

    /// A contract is an account with non-empty code.
    pub fn is_contract(&self) -> bool {
        self.code_hash != empty_code_hash()
    }
}

impl Default for AccountState {
    fn default() -> Self {
        Self::empty()
    }
}

/// Wire/storage form: `BigUint` has no native serde impl, so nonce and
/// balance travel as big-endian byte strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountStateRecord {
    pub nonce_be: Vec<u8>,
    pub balance_be: Vec<u8>,
    pub state_root: Hash256,
    pub code_hash: Hash256,
}

impl From<&AccountState> for AccountStateRecord {
    fn from(a: &AccountState) -> Self {
        Self {
            nonce_be: a.nonce.to_bytes_be(),
            balance_be: a.balance.to_bytes_be(),
            state_root: a.state_root,
            code_hash: a.code_hash,
        }
    }
}

impl From<&AccountStateRecord> for AccountState {
    fn from(r: &AccountStateRecord) -> Self {
        Self {
            nonce: BigUint::from_bytes_be(&r.nonce_be),
            balance: BigUint::from_bytes_be(&r.balance_be),
            state_root: r.state_root,
            code_hash: r.code_hash,
        }
    }
}
