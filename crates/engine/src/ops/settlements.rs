use chrono::Utc;
use sea_orm::{ActiveValue, QueryFilter, prelude::*};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    BalanceDirection, EngineError, Expense, MemberBalances, ReconcileSummary, ResultEngine,
    Settlement, SettlementStatus, SqlLedger, recalculate_full, recalculate_incremental,
    settle::{load_balances, load_settlements},
    settlements,
    util::ensure_same_group,
};

use super::{Engine, with_group_tx};

impl Engine {
    /// Recomputes the settlements of a group from its whole expense ledger.
    ///
    /// Also rebuilds the group's balance cache. Running it twice with no
    /// ledger change in between writes nothing the second time.
    pub async fn recalculate_settlements(
        &self,
        group_id: Uuid,
        cancel: &CancellationToken,
    ) -> ResultEngine<ReconcileSummary> {
        let summary = with_group_tx!(self, group_id, cancel, |db_tx| {
            let mut ledger = SqlLedger::new(&db_tx);
            recalculate_full(&mut ledger, group_id).await
        })?;
        tracing::info!(%group_id, ?summary, "full settlement recompute");
        Ok(summary)
    }

    /// Recomputes the settlements of a group after one expense was added
    /// (`is_addition`) or removed, without re-reading the ledger.
    ///
    /// The ledger write itself must already be visible; this only moves the
    /// balances by the snapshot.
    pub async fn recalculate_settlements_for_expense_change(
        &self,
        expense: &Expense,
        group_id: Uuid,
        is_addition: bool,
        cancel: &CancellationToken,
    ) -> ResultEngine<ReconcileSummary> {
        ensure_same_group(group_id, expense.group_id)?;
        let direction = BalanceDirection::from(is_addition);
        let summary = with_group_tx!(self, group_id, cancel, |db_tx| {
            let mut ledger = SqlLedger::new(&db_tx);
            recalculate_incremental(&mut ledger, group_id, &[(expense, direction)]).await
        })?;
        tracing::info!(%group_id, expense_id = %expense.id, ?direction, ?summary, "incremental settlement recompute");
        Ok(summary)
    }

    /// Recomputes the settlements of a group after an expense was edited:
    /// the old snapshot is removed and the new one added in one transaction.
    pub async fn recalculate_settlements_for_expense_edit(
        &self,
        old: &Expense,
        new: &Expense,
        cancel: &CancellationToken,
    ) -> ResultEngine<ReconcileSummary> {
        let group_id = old.group_id;
        ensure_same_group(group_id, new.group_id)?;
        let summary = with_group_tx!(self, group_id, cancel, |db_tx| {
            let mut ledger = SqlLedger::new(&db_tx);
            recalculate_incremental(
                &mut ledger,
                group_id,
                &[(old, BalanceDirection::Remove), (new, BalanceDirection::Add)],
            )
            .await
        })?;
        tracing::info!(%group_id, expense_id = %new.id, ?summary, "expense edit settlement recompute");
        Ok(summary)
    }

    /// Settlements of a group, oldest first, optionally filtered by status.
    pub async fn list_settlements(
        &self,
        group_id: Uuid,
        status: Option<SettlementStatus>,
    ) -> ResultEngine<Vec<Settlement>> {
        load_settlements(&self.database, group_id, status, false).await
    }

    /// Net balance per member, as last computed for the group.
    pub async fn member_balances(&self, group_id: Uuid) -> ResultEngine<MemberBalances> {
        load_balances(&self.database, group_id, false).await
    }

    /// Marks a pending settlement as paid.
    ///
    /// Paid settlements are history: later recomputations never change them,
    /// and they are not fed back into the balances.
    pub async fn mark_settlement_paid(
        &self,
        group_id: Uuid,
        settlement_id: Uuid,
        cancel: &CancellationToken,
    ) -> ResultEngine<Settlement> {
        let settlement = with_group_tx!(self, group_id, cancel, |db_tx| {
            let model = settlements::Entity::find_by_id(settlement_id.to_string())
                .filter(settlements::Column::GroupId.eq(group_id.to_string()))
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound("settlement not exists".to_string()))?;
            let mut settlement = Settlement::try_from(model)?;
            if !settlement.is_pending() {
                return Err(EngineError::SettlementState(
                    "settlement already paid".to_string(),
                ));
            }

            settlement.status = SettlementStatus::Paid;
            settlement.updated_at = Utc::now();
            settlements::ActiveModel {
                id: ActiveValue::Set(settlement.id.to_string()),
                status: ActiveValue::Set(settlement.status.as_str().to_string()),
                updated_at: ActiveValue::Set(settlement.updated_at),
                ..Default::default()
            }
            .update(&db_tx)
            .await?;
            Ok(settlement)
        })?;
        tracing::info!(%group_id, %settlement_id, "settlement marked as paid");
        Ok(settlement)
    }
}
