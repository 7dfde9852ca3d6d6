//! Settlement pipeline.
//!
//! ```text
//! ledger ──aggregate──▶ balances ──net──▶ transfers ──reconcile──▶ writes
//! ```
//!
//! Two triggers feed the same pipeline:
//!
//! - [`recalculate_full`] re-derives the balances from every expense of the
//!   group;
//! - [`recalculate_incremental`] adjusts the cached balances by one or more
//!   expense snapshots (an edit is a `Remove` of the old snapshot followed by
//!   an `Add` of the new one).
//!
//! For the same ledger content both produce the same balance cache and the
//! same pending settlements. The functions only talk to a
//! [`SettlementLedger`]; transactions and locking belong to the caller.

use uuid::Uuid;

use crate::{Expense, ResultEngine, util::ensure_same_group};

mod aggregate;
mod ledger;
mod memory;
mod netting;
mod reconcile;

pub use aggregate::{BalanceDirection, MemberBalances, aggregate, apply_expense, balance_delta};
pub(crate) use ledger::{load_balances, load_expense, load_expenses, load_settlements};
pub use ledger::{SettlementLedger, SqlLedger};
pub use memory::MemoryLedger;
pub use netting::{Transfer, net_balances};
pub use reconcile::{ReconcilePlan, ReconcileSummary, SettlementChange, reconcile};

/// Recomputes the settlements of a group from its whole ledger.
pub async fn recalculate_full<L>(ledger: &mut L, group_id: Uuid) -> ResultEngine<ReconcileSummary>
where
    L: SettlementLedger + ?Sized,
{
    ledger.lock_group(group_id).await?;
    let expenses = ledger.group_expenses(group_id).await?;
    let balances = aggregate(&expenses)?;
    let cached = ledger.cached_balances(group_id).await?;
    settle(ledger, group_id, &cached, &balances).await
}

/// Recomputes the settlements of a group from the cached balances and a set
/// of expense changes, without reading the ledger.
pub async fn recalculate_incremental<L>(
    ledger: &mut L,
    group_id: Uuid,
    changes: &[(&Expense, BalanceDirection)],
) -> ResultEngine<ReconcileSummary>
where
    L: SettlementLedger + ?Sized,
{
    for (expense, _) in changes {
        ensure_same_group(group_id, expense.group_id)?;
    }

    ledger.lock_group(group_id).await?;
    let cached = ledger.cached_balances(group_id).await?;
    let mut balances = cached.clone();
    for (expense, direction) in changes {
        apply_expense(&mut balances, expense, *direction)?;
    }
    settle(ledger, group_id, &cached, &balances).await
}

async fn settle<L>(
    ledger: &mut L,
    group_id: Uuid,
    cached: &MemberBalances,
    balances: &MemberBalances,
) -> ResultEngine<ReconcileSummary>
where
    L: SettlementLedger + ?Sized,
{
    let transfers = net_balances(balances)?;

    let delta = balance_delta(cached, balances);
    if !delta.is_empty() {
        ledger.store_balances(group_id, &delta).await?;
    }

    let existing = ledger.group_settlements(group_id).await?;
    let plan = reconcile(&transfers, &existing);
    if !plan.is_empty() {
        ledger.apply_changes(group_id, &plan.changes).await?;
    }

    let summary = plan.summary();
    tracing::debug!(
        %group_id,
        balances = balances.len(),
        transfers = transfers.len(),
        inserted = summary.inserted,
        updated = summary.updated,
        deleted = summary.deleted,
        "settlements reconciled"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use proptest::prelude::*;

    use super::*;
    use crate::{EngineError, ExpenseCmd, MoneyCents, SettlementStatus};

    fn expense(group_id: Uuid, payer: &str, cents: i64, members: &[&str]) -> Expense {
        let cmd = ExpenseCmd::new(group_id, payer, MoneyCents::new(cents), Utc::now())
            .split_even(members.iter().copied());
        Expense::new(Uuid::new_v4(), cmd).unwrap()
    }

    fn transfers(values: &[(&str, &str, i64)]) -> Vec<Transfer> {
        let mut out: Vec<Transfer> = values
            .iter()
            .map(|(debtor, creditor, cents)| {
                Transfer::new(*debtor, *creditor, MoneyCents::new(*cents))
            })
            .collect();
        out.sort();
        out
    }

    async fn add(ledger: &mut MemoryLedger, expense: Expense) -> ReconcileSummary {
        let group_id = expense.group_id;
        ledger.insert_expense(expense.clone());
        recalculate_incremental(ledger, group_id, &[(&expense, BalanceDirection::Add)])
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn end_to_end_split_among_three() {
        let group = Uuid::new_v4();
        let mut ledger = MemoryLedger::new();
        ledger.insert_expense(expense(group, "a", 90_00, &["a", "b", "c"]));

        let summary = recalculate_full(&mut ledger, group).await.unwrap();
        assert_eq!(summary.inserted, 2);
        assert_eq!(
            ledger.pending_transfers(group),
            transfers(&[("b", "a", 30_00), ("c", "a", 30_00)])
        );

        ledger.insert_expense(expense(group, "a", 90_00, &["a", "b", "c"]));
        let summary = recalculate_full(&mut ledger, group).await.unwrap();
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.inserted, 0);
        assert_eq!(ledger.settlements(group).len(), 2);
        assert_eq!(
            ledger.pending_transfers(group),
            transfers(&[("b", "a", 60_00), ("c", "a", 60_00)])
        );
    }

    #[tokio::test]
    async fn full_recompute_is_idempotent() {
        let group = Uuid::new_v4();
        let mut ledger = MemoryLedger::new();
        ledger.insert_expense(expense(group, "a", 100_00, &["a", "b", "c"]));
        ledger.insert_expense(expense(group, "c", 12_34, &["a", "d"]));

        recalculate_full(&mut ledger, group).await.unwrap();
        let before = ledger.pending_transfers(group);
        let writes = ledger.writes();

        let summary = recalculate_full(&mut ledger, group).await.unwrap();
        assert!(summary.is_noop());
        assert_eq!(ledger.writes(), writes);
        assert_eq!(ledger.pending_transfers(group), before);
    }

    #[tokio::test]
    async fn deleting_the_only_expense_clears_pending_rows() {
        let group = Uuid::new_v4();
        let mut ledger = MemoryLedger::new();
        let first = expense(group, "a", 90_00, &["a", "b", "c"]);
        add(&mut ledger, first.clone()).await;

        ledger.remove_expense(first.id);
        let summary =
            recalculate_incremental(&mut ledger, group, &[(&first, BalanceDirection::Remove)])
                .await
                .unwrap();

        assert_eq!(summary.deleted, 2);
        assert!(ledger.settlements(group).is_empty());
        assert!(ledger.balances(group).is_empty());
    }

    #[tokio::test]
    async fn paid_rows_survive_recompute() {
        let group = Uuid::new_v4();
        let mut ledger = MemoryLedger::new();
        let first = expense(group, "a", 90_00, &["a", "b", "c"]);
        add(&mut ledger, first.clone()).await;

        let paid_id = ledger
            .settlements(group)
            .into_iter()
            .find(|s| s.debtor_id == "b")
            .map(|s| s.id)
            .unwrap();
        ledger.mark_paid(paid_id).unwrap();
        let paid_before = ledger
            .settlements(group)
            .into_iter()
            .find(|s| s.id == paid_id)
            .cloned()
            .unwrap();

        ledger.remove_expense(first.id);
        recalculate_full(&mut ledger, group).await.unwrap();

        let rows = ledger.settlements(group);
        assert_eq!(rows.len(), 1);
        assert_eq!(*rows[0], paid_before);
        assert_eq!(rows[0].status, SettlementStatus::Paid);
    }

    #[tokio::test]
    async fn empty_group_is_not_an_error() {
        let mut ledger = MemoryLedger::new();
        let summary = recalculate_full(&mut ledger, Uuid::new_v4()).await.unwrap();
        assert!(summary.is_noop());
    }

    #[tokio::test]
    async fn groups_are_independent() {
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let mut ledger = MemoryLedger::new();
        add(&mut ledger, expense(first, "a", 10_00, &["a", "b"])).await;
        add(&mut ledger, expense(second, "x", 30_00, &["x", "y", "z"])).await;

        assert_eq!(ledger.pending_transfers(first), transfers(&[("b", "a", 5_00)]));
        assert_eq!(
            ledger.pending_transfers(second),
            transfers(&[("y", "x", 10_00), ("z", "x", 10_00)])
        );
    }

    #[tokio::test]
    async fn incremental_rejects_foreign_expense() {
        let mut ledger = MemoryLedger::new();
        let foreign = expense(Uuid::new_v4(), "a", 10_00, &["a", "b"]);
        let err = recalculate_incremental(
            &mut ledger,
            Uuid::new_v4(),
            &[(&foreign, BalanceDirection::Add)],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::GroupMismatch(_)));
        assert_eq!(ledger.writes(), 0);
    }

    const MEMBERS: [&str; 5] = ["ann", "ben", "cat", "dan", "eve"];

    /// Generated ledger operation: kind (add, edit, delete), target slot,
    /// payer, amount, beneficiary mask and exact-share weights (even split
    /// when absent).
    type Op = (u8, usize, usize, i64, u8, Option<[u8; 5]>);

    fn draft(id: Uuid, group_id: Uuid, op: &Op) -> Option<Expense> {
        let (_, _, payer, cents, mask, weights) = *op;
        let members: Vec<usize> = (0..MEMBERS.len())
            .filter(|idx| mask & (1 << *idx) != 0)
            .collect();
        let cmd = ExpenseCmd::new(group_id, MEMBERS[payer], MoneyCents::new(cents), Utc::now());
        let cmd = match weights {
            None => cmd.split_even(members.iter().map(|idx| MEMBERS[*idx])),
            Some(weights) => {
                let total: i64 = members.iter().map(|idx| i64::from(weights[*idx])).sum();
                let mut left = cents;
                let mut shares = Vec::with_capacity(members.len());
                for (pos, idx) in members.iter().enumerate() {
                    let share = if pos + 1 == members.len() {
                        left
                    } else {
                        cents * i64::from(weights[*idx]) / total
                    };
                    left -= share;
                    shares.push((MEMBERS[*idx], MoneyCents::new(share)));
                }
                cmd.split_exact(shares)
            }
        };
        Expense::new(id, cmd).ok()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn incremental_and_full_modes_converge(
            ops in prop::collection::vec(
                (
                    0u8..3,
                    0usize..64,
                    0usize..5,
                    1i64..=50_000,
                    1u8..32,
                    prop::option::of(prop::array::uniform5(1u8..10)),
                ),
                1..=40,
            ),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let group = Uuid::new_v4();
            let mut incremental = MemoryLedger::new();
            let mut live: Vec<Expense> = Vec::new();

            for op in &ops {
                let kind = if live.is_empty() { 0 } else { op.0 };
                match kind {
                    0 => {
                        let Some(new) = draft(Uuid::new_v4(), group, op) else {
                            continue;
                        };
                        live.push(new.clone());
                        runtime.block_on(add(&mut incremental, new));
                    }
                    1 => {
                        let slot = op.1 % live.len();
                        let old = live[slot].clone();
                        let Some(new) = draft(old.id, group, op) else {
                            continue;
                        };
                        live[slot] = new.clone();
                        incremental.replace_expense(new.clone());
                        runtime
                            .block_on(recalculate_incremental(
                                &mut incremental,
                                group,
                                &[(&old, BalanceDirection::Remove), (&new, BalanceDirection::Add)],
                            ))
                            .unwrap();
                    }
                    _ => {
                        let old = live.remove(op.1 % live.len());
                        incremental.remove_expense(old.id);
                        runtime
                            .block_on(recalculate_incremental(
                                &mut incremental,
                                group,
                                &[(&old, BalanceDirection::Remove)],
                            ))
                            .unwrap();
                    }
                }

                let mut full = MemoryLedger::new();
                for expense in &live {
                    full.insert_expense(expense.clone());
                }
                runtime.block_on(recalculate_full(&mut full, group)).unwrap();
                prop_assert_eq!(full.pending_transfers(group), incremental.pending_transfers(group));
                prop_assert_eq!(full.balances(group), incremental.balances(group));
            }

            let summary = runtime
                .block_on(recalculate_full(&mut incremental, group))
                .unwrap();
            prop_assert!(summary.is_noop());
        }
    }

    #[tokio::test]
    async fn pending_debt_matches_positive_balances() {
        let group = Uuid::new_v4();
        let mut ledger = MemoryLedger::new();
        add(&mut ledger, expense(group, "a", 100_00, &["a", "b", "c"])).await;
        add(&mut ledger, expense(group, "b", 77_77, &["c", "d"])).await;
        add(&mut ledger, expense(group, "d", 5_01, &["a", "b", "c", "d"])).await;

        let balances = ledger.balances(group);
        let credit: MoneyCents = balances.values().filter(|b| b.is_positive()).sum();
        let debt: MoneyCents = balances.values().filter(|b| b.is_negative()).sum();
        let pending: MoneyCents = ledger
            .pending_transfers(group)
            .iter()
            .map(|t| t.amount)
            .sum();

        assert_eq!(pending, credit);
        assert_eq!(pending, -debt);
    }
}
