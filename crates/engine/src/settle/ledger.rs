//! Storage seam of the settlement pipeline.
//!
//! [`SettlementLedger`] is everything the pipeline needs from persistence:
//! group locking, ledger reads, settlement reads/writes and the balance cache.
//! [`SqlLedger`] implements it on top of an open sea-orm transaction; the
//! caller owns commit and rollback.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveValue, ConnectionTrait, DatabaseTransaction, QueryFilter, QueryOrder, QuerySelect,
    prelude::*,
    sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use crate::{
    EngineError, Expense, MoneyCents, ResultEngine, Settlement, SettlementStatus,
    expense_beneficiaries, expenses, member_balances, settlements,
};

use super::{MemberBalances, SettlementChange};

/// SQLite caps bound parameters per statement; stay well below it.
const IN_CLAUSE_CHUNK: usize = 500;

/// Persistence used by the settlement pipeline for one group at a time.
///
/// Implementations are expected to run inside a single unit of work: every
/// call of one recompute must observe and produce a consistent state, and a
/// failed recompute must leave nothing behind.
#[async_trait]
pub trait SettlementLedger: Send {
    /// Takes exclusive ownership of the group's expense, settlement and
    /// balance rows until the unit of work ends.
    async fn lock_group(&mut self, group_id: Uuid) -> ResultEngine<()>;

    /// Every expense of the group with its beneficiary shares.
    async fn group_expenses(&mut self, group_id: Uuid) -> ResultEngine<Vec<Expense>>;

    /// Every settlement row of the group, pending and paid.
    async fn group_settlements(&mut self, group_id: Uuid) -> ResultEngine<Vec<Settlement>>;

    /// The persisted balance cache of the group.
    async fn cached_balances(&mut self, group_id: Uuid) -> ResultEngine<MemberBalances>;

    /// Writes new balance values; [`MoneyCents::ZERO`] removes the member.
    async fn store_balances(
        &mut self,
        group_id: Uuid,
        updates: &[(String, MoneyCents)],
    ) -> ResultEngine<()>;

    /// Applies a reconciliation plan. Only pending rows may be updated or
    /// deleted.
    async fn apply_changes(
        &mut self,
        group_id: Uuid,
        changes: &[SettlementChange],
    ) -> ResultEngine<()>;
}

/// [`SettlementLedger`] backed by an open database transaction.
pub struct SqlLedger<'a> {
    db: &'a DatabaseTransaction,
}

impl<'a> SqlLedger<'a> {
    pub fn new(db: &'a DatabaseTransaction) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SettlementLedger for SqlLedger<'_> {
    async fn lock_group(&mut self, group_id: Uuid) -> ResultEngine<()> {
        let group = group_id.to_string();
        // Row locks are a no-op on SQLite, where the write transaction and the
        // in-process group guard provide the serialization.
        expenses::Entity::find()
            .select_only()
            .column(expenses::Column::Id)
            .filter(expenses::Column::GroupId.eq(group.clone()))
            .lock_exclusive()
            .into_tuple::<String>()
            .all(self.db)
            .await?;
        settlements::Entity::find()
            .select_only()
            .column(settlements::Column::Id)
            .filter(settlements::Column::GroupId.eq(group.clone()))
            .lock_exclusive()
            .into_tuple::<String>()
            .all(self.db)
            .await?;
        member_balances::Entity::find()
            .select_only()
            .column(member_balances::Column::MemberId)
            .filter(member_balances::Column::GroupId.eq(group))
            .lock_exclusive()
            .into_tuple::<String>()
            .all(self.db)
            .await?;
        Ok(())
    }

    async fn group_expenses(&mut self, group_id: Uuid) -> ResultEngine<Vec<Expense>> {
        load_expenses(self.db, group_id, true).await
    }

    async fn group_settlements(&mut self, group_id: Uuid) -> ResultEngine<Vec<Settlement>> {
        load_settlements(self.db, group_id, None, true).await
    }

    async fn cached_balances(&mut self, group_id: Uuid) -> ResultEngine<MemberBalances> {
        load_balances(self.db, group_id, true).await
    }

    async fn store_balances(
        &mut self,
        group_id: Uuid,
        updates: &[(String, MoneyCents)],
    ) -> ResultEngine<()> {
        for (member_id, balance) in updates {
            if balance.is_zero() {
                member_balances::Entity::delete_by_id((group_id.to_string(), member_id.clone()))
                    .exec(self.db)
                    .await?;
                continue;
            }
            let row = member_balances::ActiveModel {
                group_id: ActiveValue::Set(group_id.to_string()),
                member_id: ActiveValue::Set(member_id.clone()),
                balance_minor: ActiveValue::Set(balance.cents()),
            };
            member_balances::Entity::insert(row)
                .on_conflict(
                    OnConflict::columns([
                        member_balances::Column::GroupId,
                        member_balances::Column::MemberId,
                    ])
                    .update_column(member_balances::Column::BalanceMinor)
                    .to_owned(),
                )
                .exec_without_returning(self.db)
                .await?;
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
                    let settlement = Settlement::pending(group_id, transfer, now);
                    settlements::ActiveModel::from(&settlement)
                        .insert(self.db)
                        .await?;
                }
                SettlementChange::UpdateAmount { id, amount } => {
                    let result = settlements::Entity::update_many()
                        .col_expr(settlements::Column::AmountMinor, Expr::value(amount.cents()))
                        .col_expr(settlements::Column::UpdatedAt, Expr::value(now))
                        .filter(settlements::Column::Id.eq(id.to_string()))
                        .filter(settlements::Column::GroupId.eq(group_id.to_string()))
                        .filter(
                            settlements::Column::Status.eq(SettlementStatus::Pending.as_str()),
                        )
                        .exec(self.db)
                        .await?;
                    ensure_pending_row_written(result.rows_affected, *id)?;
                }
                SettlementChange::Delete { id } => {
                    let result = settlements::Entity::delete_many()
                        .filter(settlements::Column::Id.eq(id.to_string()))
                        .filter(settlements::Column::GroupId.eq(group_id.to_string()))
                        .filter(
                            settlements::Column::Status.eq(SettlementStatus::Pending.as_str()),
                        )
                        .exec(self.db)
                        .await?;
                    ensure_pending_row_written(result.rows_affected, *id)?;
                }
            }
        }
        Ok(())
    }
}

fn ensure_pending_row_written(rows_affected: u64, id: Uuid) -> ResultEngine<()> {
    if rows_affected != 1 {
        return Err(EngineError::SettlementState(format!(
            "settlement {id} is no longer pending"
        )));
    }
    Ok(())
}

/// Loads the expenses of a group, oldest first.
pub(crate) async fn load_expenses<C: ConnectionTrait>(
    db: &C,
    group_id: Uuid,
    lock: bool,
) -> ResultEngine<Vec<Expense>> {
    let mut query = expenses::Entity::find()
        .filter(expenses::Column::GroupId.eq(group_id.to_string()))
        .order_by_asc(expenses::Column::CreatedAt)
        .order_by_asc(expenses::Column::Id);
    if lock {
        query = query.lock_exclusive();
    }
    let models = query.all(db).await?;
    attach_beneficiaries(db, models).await
}

/// Loads one expense, checking it belongs to `group_id`.
pub(crate) async fn load_expense<C: ConnectionTrait>(
    db: &C,
    group_id: Uuid,
    expense_id: Uuid,
    lock: bool,
) -> ResultEngine<Expense> {
    let mut query = expenses::Entity::find_by_id(expense_id.to_string())
        .filter(expenses::Column::GroupId.eq(group_id.to_string()));
    if lock {
        query = query.lock_exclusive();
    }
    let model = query
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound("expense not exists".to_string()))?;
    attach_beneficiaries(db, vec![model])
        .await?
        .pop()
        .ok_or_else(|| EngineError::KeyNotFound("expense not exists".to_string()))
}

async fn attach_beneficiaries<C: ConnectionTrait>(
    db: &C,
    models: Vec<expenses::Model>,
) -> ResultEngine<Vec<Expense>> {
    let ids: Vec<String> = models.iter().map(|model| model.id.clone()).collect();
    let mut by_expense: HashMap<String, Vec<expense_beneficiaries::Model>> = HashMap::new();
    for chunk in ids.chunks(IN_CLAUSE_CHUNK) {
        let rows = expense_beneficiaries::Entity::find()
            .filter(expense_beneficiaries::Column::ExpenseId.is_in(chunk.iter().cloned()))
            .all(db)
            .await?;
        for row in rows {
            by_expense.entry(row.expense_id.clone()).or_default().push(row);
        }
    }

    models
        .into_iter()
        .map(|model| {
            let beneficiaries = by_expense.remove(&model.id).unwrap_or_default();
            Expense::try_from((model, beneficiaries))
        })
        .collect()
}

/// Loads the settlements of a group, optionally filtered by status.
pub(crate) async fn load_settlements<C: ConnectionTrait>(
    db: &C,
    group_id: Uuid,
    status: Option<SettlementStatus>,
    lock: bool,
) -> ResultEngine<Vec<Settlement>> {
    let mut query = settlements::Entity::find()
        .filter(settlements::Column::GroupId.eq(group_id.to_string()))
        .order_by_asc(settlements::Column::CreatedAt)
        .order_by_asc(settlements::Column::Id);
    if let Some(status) = status {
        query = query.filter(settlements::Column::Status.eq(status.as_str()));
    }
    if lock {
        query = query.lock_exclusive();
    }
    query
        .all(db)
        .await?
        .into_iter()
        .map(Settlement::try_from)
        .collect()
}

/// Loads the balance cache of a group.
pub(crate) async fn load_balances<C: ConnectionTrait>(
    db: &C,
    group_id: Uuid,
    lock: bool,
) -> ResultEngine<MemberBalances> {
    let mut query = member_balances::Entity::find()
        .filter(member_balances::Column::GroupId.eq(group_id.to_string()));
    if lock {
        query = query.lock_exclusive();
    }
    Ok(query
        .all(db)
        .await?
        .into_iter()
        .map(|row| (row.member_id, MoneyCents::new(row.balance_minor)))
        .collect())
}
