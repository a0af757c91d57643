//! World-state & VM collaborator contract (spec §4.7).
//!
//! The chain engine invokes an external executor to apply a transaction
//! against a mutable world-state view obtained via `start_tracking`. Gas
//! accounting, contract-creation address derivation, and code-size limits
//! are the executor's business; the chain engine only observes
//! success/failure and the resulting state root. The actual VM algorithm is
//! out of scope — this module defines the trait seam and a reference
//! implementation limited to value transfers.

use std::collections::HashMap;

use crate::crypto::{Address, Hash256};

use super::account::AccountState;

/// Outcome of applying one transaction against a tracked state view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Applied; state root after commit.
    Committed { state_root: Hash256 },
    /// Rejected; no mutation was committed.
    Reverted { reason: String },
    /// Contract creation/execution is out of scope for this executor.
    Unsupported,
}

/// A mutable view over the world-state, opened via `StateExecutor::start_tracking`.
/// Implementations decide whether mutations are visible to readers before commit.
pub trait TrackedState {
    fn get_account(&self, address: &Address) -> AccountState;
    fn set_account(&mut self, address: Address, state: AccountState);

    /// Finalizes pending mutations and returns the resulting state root.
    fn commit(self: Box<Self>) -> Hash256;

    /// Discards pending mutations; the underlying state is left untouched.
    fn rollback(self: Box<Self>);
}

/// External collaborator: applies transactions to the world-state.
pub trait StateExecutor {
    fn start_tracking(&self) -> Box<dyn TrackedState + '_>;

    fn apply(
        &self,
        tracked: Box<dyn TrackedState + '_>,
        tx: &super::transaction::Transaction,
    ) -> ExecutionOutcome;
}

/// Elliptic-curve pairing check, invoked by contract execution paths this
/// crate does not implement. Declared as a collaborator seam only.
pub trait PairingEngine {
    fn pairing_check(&self, inputs: &[u8]) -> Result<bool, String>;
}

/// In-memory reference `StateExecutor`: value transfers only. Contract
/// creation and calls (non-empty `tx.data` against a contract account, or a
/// zero receiver) return `ExecutionOutcome::Unsupported` rather than
/// attempting VM execution, per the collaborator contract's Non-goal.
#[derive(Debug, Default)]
pub struct ValueTransferExecutor {
    accounts: parking_lot::RwLock<HashMap<Address, AccountState>>,
}

impl ValueTransferExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, address: Address, state: AccountState) {
        self.accounts.write().insert(address, state);
    }

    fn state_root(&self) -> Hash256 {
        let accounts = self.accounts.read();
        let mut entries: Vec<_> = accounts.iter().collect();
        entries.sort_by_key(|(addr, _)| addr.as_bytes().to_vec());
        let mut buf = Vec::new();
        for (addr, state) in entries {
            buf.extend_from_slice(addr.as_bytes());
            buf.extend_from_slice(&state.nonce.to_bytes_be());
            buf.extend_from_slice(&state.balance.to_bytes_be());
        }
        crate::crypto::sha256(&buf)
    }
}

struct MapTrackedState<'a> {
    executor: &'a ValueTransferExecutor,
    pending: HashMap<Address, AccountState>,
}

impl<'a> TrackedState for MapTrackedState<'a> {
    fn get_account(&self, address: &Address) -> AccountState {
        self.pending
            .get(address)
            .cloned()
            .unwrap_or_else(|| self.executor.accounts.read().get(address).cloned().unwrap_or_default())
    }

    fn set_account(&mut self, address: Address, state: AccountState) {
        self.pending.insert(address, state);
    }

    fn commit(self: Box<Self>) -> Hash256 {
        let mut accounts = self.executor.accounts.write();
        for (address, state) in self.pending {
            accounts.insert(address, state);
        }
        drop(accounts);
        self.executor.state_root()
    }

    fn rollback(self: Box<Self>) {}
}

impl StateExecutor for ValueTransferExecutor {
    fn start_tracking(&self) -> Box<dyn TrackedState + '_> {
        Box::new(MapTrackedState {
            executor: self,
            pending: HashMap::new(),
        })
    }

    fn apply(
        &self,
        mut tracked: Box<dyn TrackedState + '_>,
        tx: &super::transaction::Transaction,
    ) -> ExecutionOutcome {
        if !tx.data.is_empty() {
            tracked.rollback();
            return ExecutionOutcome::Unsupported;
        }

        let mut sender_state = tracked.get_account(&tx.sender);
        if sender_state.nonce != tx.nonce_value() {
            tracked.rollback();
            return ExecutionOutcome::Reverted {
                reason: "nonce mismatch".to_string(),
            };
        }
        let amount = num_bigint::BigUint::from(tx.amount);
        if sender_state.balance < amount {
            tracked.rollback();
            return ExecutionOutcome::Reverted {
                reason: "insufficient balance".to_string(),
            };
        }

        sender_state.balance -= &amount;
        sender_state.nonce += 1u8;
        tracked.set_account(tx.sender, sender_state);

        let mut receiver_state = tracked.get_account(&tx.receiver);
        receiver_state.balance += &amount;
        tracked.set_account(tx.receiver, receiver_state);

        let state_root = tracked.commit();
        ExecutionOutcome::Committed { state_root }
    }
}
