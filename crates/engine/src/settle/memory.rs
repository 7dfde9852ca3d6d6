//! In-memory [`SettlementLedger`].
//!
//! Holds expenses, settlements and the balance cache in plain collections.
//! Used by the pipeline tests and by embedders that want to preview
//! settlements without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{EngineError, Expense, MoneyCents, ResultEngine, Settlement, SettlementStatus};

use super::{MemberBalances, SettlementChange, SettlementLedger, Transfer};

#[derive(Clone, Debug, Default)]
pub struct MemoryLedger {
    expenses: Vec<Expense>,
    settlements: Vec<Settlement>,
    balances: HashMap<Uuid, MemberBalances>,
    writes: usize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an expense to the ledger (no recompute).
    pub fn insert_expense(&mut self, expense: Expense) {
        self.expenses.push(expense);
    }

    /// Replaces the expense with the same id, returning the previous snapshot.
    pub fn replace_expense(&mut self, expense: Expense) -> Option<Expense> {
        let slot = self.expenses.iter_mut().find(|e| e.id == expense.id)?;
        Some(std::mem::replace(slot, expense))
    }

    /// Removes an expense from the ledger (no recompute).
    pub fn remove_expense(&mut self, expense_id: Uuid) -> Option<Expense> {
        let idx = self.expenses.iter().position(|e| e.id == expense_id)?;
        Some(self.expenses.remove(idx))
    }

    pub fn settlements(&self, group_id: Uuid) -> Vec<&Settlement> {
        self.settlements
            .iter()
            .filter(|s| s.group_id == group_id)
            .collect()
    }

    /// Pending rows of the group as sorted transfers.
    pub fn pending_transfers(&self, group_id: Uuid) -> Vec<Transfer> {
        let mut transfers: Vec<Transfer> = self
            .settlements(group_id)
            .into_iter()
            .filter(|s| s.is_pending())
            .map(Settlement::transfer)
            .collect();
        transfers.sort();
        transfers
    }

    /// Cached balances of the group.
    pub fn balances(&self, group_id: Uuid) -> MemberBalances {
        self.balances.get(&group_id).cloned().unwrap_or_default()
    }

    /// Marks a pending settlement as paid.
    pub fn mark_paid(&mut self, settlement_id: Uuid) -> ResultEngine<()> {
        let settlement = self
            .settlements
            .iter_mut()
            .find(|s| s.id == settlement_id)
            .ok_or_else(|| EngineError::KeyNotFound("settlement not exists".to_string()))?;
        if !settlement.is_pending() {
            return Err(EngineError::SettlementState(
                "settlement already paid".to_string(),
            ));
        }
        settlement.status = SettlementStatus::Paid;
        settlement.updated_at = Utc::now();
        Ok(())
    }

    /// Number of individual store writes performed so far.
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn pending_mut(&mut self, group_id: Uuid, id: Uuid) -> ResultEngine<&mut Settlement> {
        self.settlements
            .iter_mut()
            .find(|s| s.id == id && s.group_id == group_id && s.is_pending())
            .ok_or_else(|| {
                EngineError::SettlementState(format!("settlement {id} is no longer pending"))
            })
    }
}

#[async_trait]
impl SettlementLedger for MemoryLedger {
    async fn lock_group(&mut self, _group_id: Uuid) -> ResultEngine<()> {
        // `&mut self` already grants exclusive access.
        Ok(())
    }

    async fn group_expenses(&mut self, group_id: Uuid) -> ResultEngine<Vec<Expense>> {
        Ok(self
            .expenses
            .iter()
            .filter(|e| e.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn group_settlements(&mut self, group_id: Uuid) -> ResultEngine<Vec<Settlement>> {
        Ok(self.settlements(group_id).into_iter().cloned().collect())
    }

    async fn cached_balances(&mut self, group_id: Uuid) -> ResultEngine<MemberBalances> {
        Ok(self.balances(group_id))
    }

    async fn store_balances(
        &mut self,
        group_id: Uuid,
        updates: &[(String, MoneyCents)],
    ) -> ResultEngine<()> {
        let balances = self.balances.entry(group_id).or_default();
        for (member_id, balance) in updates {
            if balance.is_zero() {
                balances.remove(member_id);
            } else {
                balances.insert(member_id.clone(), *balance);
            }
            self.writes += 1;
        }
        Ok(())
    }

    async fn apply_changes(
        &mut self,
        group_id: Uuid,
        changes: &[SettlementChange],
    ) -> ResultEngine<()> {
        let now = Utc::now();
        for change in changes {
            match change {
                SettlementChange::Insert(transfer) => {
                    self.settlements
                        .push(Settlement::pending(group_id, transfer, now));
                }
                SettlementChange::UpdateAmount { id, amount } => {
                    let row = self.pending_mut(group_id, *id)?;
                    row.amount = *amount;
                    row.updated_at = now;
                }
                SettlementChange::Delete { id } => {
                    self.pending_mut(group_id, *id)?;
                    self.settlements.retain(|s| s.id != *id);
                }
            }
            self.writes += 1;
        }
        Ok(())
    }
}
