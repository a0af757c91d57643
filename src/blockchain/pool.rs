//! Pending-transaction pool: an admission-ordered multiset of unconfirmed
//! transactions, mutated from the manager thread only (spec §5).

use std::collections::VecDeque;

use crate::crypto::Hash256;

use super::transaction::Transaction;

/// Ordered by admission; the order used when composing the next candidate
/// block. A `VecDeque` gives O(1) push-back and cheap front iteration.
#[derive(Debug, Default)]
pub struct PendingPool {
    order: VecDeque<Transaction>,
}

impl PendingPool {
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &Hash256) -> bool {
        self.order.iter().any(|tx| &tx.id() == id)
    }

    /// Admits a transaction at the back of the queue. No-op if already present.
    pub fn admit(&mut self, tx: Transaction) {
        if !self.contains(&tx.id()) {
            self.order.push_back(tx);
        }
    }

    /// A snapshot of pending transactions in admission order, for the miner
    /// to read without taking a lock on the live pool (spec §5: "the miner
    /// reads a snapshot passed at mine() time").
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.order.iter().cloned().collect()
    }

    /// Removes every transaction whose id is in `confirmed`, in place. Called
    /// on import of a new best block, scoped to *that* block's transactions
    /// only — transactions confirmed on a losing fork remain pending.
    pub fn purge_confirmed(&mut self, confirmed: &[Transaction]) {
        if confirmed.is_empty() {
            return;
        }
        let ids: std::collections::HashSet<Hash256> =
            confirmed.iter().map(Transaction::id).collect();
        self.order.retain(|tx| !ids.contains(&tx.id()));
    }
}
