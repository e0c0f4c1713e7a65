//! Debt ledger: per-peer byte and settlement counters.
//!
//! Plain data with no locking. The coordinator worker owns the only
//! instance, which is what makes every mutation here race-free.

use std::collections::HashMap;

use serde::Serialize;

use meter_core::PeerId;

/// Accounting state for one peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Debt {
    /// Amount demanded from the peer and not yet confirmed settled.
    pub requested_amount: u64,
    /// Bytes sent to the peer since the last settlement request.
    pub transferred_bytes: u64,
    /// Bytes ever received from the peer. Bounds incoming claims.
    pub received_bytes: u64,
}

/// A debt record together with its key, for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebtSnapshot {
    pub peer: PeerId,
    #[serde(flatten)]
    pub debt: Debt,
}

#[derive(Debug, Default)]
pub struct DebtLedger {
    debts: HashMap<PeerId, Debt>,
}

impl DebtLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The debt for `peer`, created empty on first reference.
    pub fn get_or_create(&mut self, peer: PeerId) -> &mut Debt {
        self.debts.entry(peer).or_default()
    }

    pub fn get(&self, peer: &PeerId) -> Option<&Debt> {
        self.debts.get(peer)
    }

    pub fn len(&self) -> usize {
        self.debts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.debts.is_empty()
    }

    /// Every record, ordered by peer id.
    pub fn snapshot(&self) -> Vec<DebtSnapshot> {
        let mut all: Vec<DebtSnapshot> = self
            .debts
            .iter()
            .map(|(peer, debt)| DebtSnapshot {
                peer: *peer,
                debt: debt.clone(),
            })
            .collect();
        all.sort_by(|a, b| a.peer.cmp(&b.peer));
        all
    }
}
