//! Settlement reconciliation.
//!
//! Diffs freshly computed transfers against the persisted rows of a group and
//! produces the minimal set of writes. Only pending rows take part: paid rows
//! are history and are never matched, updated or deleted.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{MoneyCents, Settlement};

use super::Transfer;

/// A single write against the settlement store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettlementChange {
    /// New pending row.
    Insert(Transfer),
    /// Amount change of an existing pending row; status is untouched.
    UpdateAmount { id: Uuid, amount: MoneyCents },
    /// Removal of a stale pending row.
    Delete { id: Uuid },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Deletes first, then updates, then inserts.
    pub changes: Vec<SettlementChange>,
    /// Transfers already persisted with the right amount.
    pub unchanged: usize,
}

/// Write counts of one reconciliation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl ReconcileSummary {
    /// `true` when nothing was written.
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn summary(&self) -> ReconcileSummary {
        let mut summary = ReconcileSummary {
            unchanged: self.unchanged,
            ..Default::default()
        };
        for change in &self.changes {
            match change {
                SettlementChange::Insert(_) => summary.inserted += 1,
                SettlementChange::UpdateAmount { .. } => summary.updated += 1,
                SettlementChange::Delete { .. } => summary.deleted += 1,
            }
        }
        summary
    }
}

/// Plans the writes that make the pending rows equal to `transfers`.
pub fn reconcile(transfers: &[Transfer], existing: &[Settlement]) -> ReconcilePlan {
    // First pending row per pair wins; any other one for the same pair is stale.
    let mut pending: HashMap<(&str, &str), &Settlement> = HashMap::new();
    for settlement in existing.iter().filter(|s| s.is_pending()) {
        pending
            .entry((settlement.debtor_id.as_str(), settlement.creditor_id.as_str()))
            .or_insert(settlement);
    }

    let mut kept: HashSet<Uuid> = HashSet::with_capacity(transfers.len());
    let mut updates = Vec::new();
    let mut inserts = Vec::new();
    let mut unchanged = 0;

    for transfer in transfers {
        let key = (transfer.debtor_id.as_str(), transfer.creditor_id.as_str());
        match pending.get(&key) {
            Some(row) => {
                kept.insert(row.id);
                if row.amount == transfer.amount {
                    unchanged += 1;
                } else {
                    updates.push(SettlementChange::UpdateAmount {
                        id: row.id,
                        amount: transfer.amount,
                    });
                }
            }
            None => inserts.push(SettlementChange::Insert(transfer.clone())),
        }
    }

    let mut changes: Vec<SettlementChange> = existing
        .iter()
        .filter(|s| s.is_pending() && !kept.contains(&s.id))
        .map(|s| SettlementChange::Delete { id: s.id })
        .collect();
    changes.extend(updates);
    changes.extend(inserts);

    ReconcilePlan { changes, unchanged }
}
