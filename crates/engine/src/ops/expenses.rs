use sea_orm::{DatabaseTransaction, QueryFilter, prelude::*};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    BalanceDirection, EngineError, Expense, ExpenseCmd, ResultEngine, SqlLedger,
    expense_beneficiaries, expenses, recalculate_incremental,
    settle::{load_expense, load_expenses},
};

use super::{Engine, with_group_tx};

impl Engine {
    /// Records a new expense and moves the group's settlements accordingly.
    pub async fn create_expense(
        &self,
        cmd: ExpenseCmd,
        cancel: &CancellationToken,
    ) -> ResultEngine<Expense> {
        let expense = Expense::new(Uuid::new_v4(), cmd)?;
        let group_id = expense.group_id;
        let summary = with_group_tx!(self, group_id, cancel, |db_tx| {
            insert_expense(&db_tx, &expense).await?;
            let mut ledger = SqlLedger::new(&db_tx);
            recalculate_incremental(&mut ledger, group_id, &[(&expense, BalanceDirection::Add)])
                .await
        })?;
        tracing::info!(
            %group_id,
            expense_id = %expense.id,
            amount = %expense.amount,
            ?summary,
            "expense created"
        );
        Ok(expense)
    }

    /// Replaces payer, amount, split and description of an expense.
    ///
    /// The expense keeps its id, group and stored `created_at`; the command's
    /// timestamp is ignored.
    pub async fn update_expense(
        &self,
        expense_id: Uuid,
        cmd: ExpenseCmd,
        cancel: &CancellationToken,
    ) -> ResultEngine<Expense> {
        let mut new = Expense::new(expense_id, cmd)?;
        let group_id = new.group_id;
        let summary = with_group_tx!(self, group_id, cancel, |db_tx| {
            let old = load_expense(&db_tx, group_id, expense_id, true).await?;
            new.created_at = old.created_at;
            remove_expense(&db_tx, expense_id).await?;
            insert_expense(&db_tx, &new).await?;
            let mut ledger = SqlLedger::new(&db_tx);
            recalculate_incremental(
                &mut ledger,
                group_id,
                &[(&old, BalanceDirection::Remove), (&new, BalanceDirection::Add)],
            )
            .await
        })?;
        tracing::info!(%group_id, %expense_id, ?summary, "expense updated");
        Ok(new)
    }

    /// Deletes an expense and moves the group's settlements accordingly.
    pub async fn delete_expense(
        &self,
        group_id: Uuid,
        expense_id: Uuid,
        cancel: &CancellationToken,
    ) -> ResultEngine<Expense> {
        let (old, summary) = with_group_tx!(self, group_id, cancel, |db_tx| {
            let old = load_expense(&db_tx, group_id, expense_id, true).await?;
            remove_expense(&db_tx, expense_id).await?;
            let mut ledger = SqlLedger::new(&db_tx);
            let summary =
                recalculate_incremental(&mut ledger, group_id, &[(&old, BalanceDirection::Remove)])
                    .await?;
            Ok((old, summary))
        })?;
        tracing::info!(%group_id, %expense_id, ?summary, "expense deleted");
        Ok(old)
    }

    /// Returns one expense of a group.
    pub async fn expense(&self, group_id: Uuid, expense_id: Uuid) -> ResultEngine<Expense> {
        load_expense(&self.database, group_id, expense_id, false).await
    }

    /// Expenses of a group, oldest first.
    pub async fn list_expenses(&self, group_id: Uuid) -> ResultEngine<Vec<Expense>> {
        load_expenses(&self.database, group_id, false).await
    }
}

async fn insert_expense(db_tx: &DatabaseTransaction, expense: &Expense) -> ResultEngine<()> {
    expenses::ActiveModel::from(expense).insert(db_tx).await?;

    let mut rows = Vec::with_capacity(expense.beneficiaries.len());
    for (position, beneficiary) in expense.beneficiaries.iter().enumerate() {
        let position = i32::try_from(position)
            .map_err(|_| EngineError::InvalidSplit("too many beneficiaries".to_string()))?;
        rows.push(expense_beneficiaries::ActiveModel::new(
            expense.id,
            position,
            beneficiary,
        ));
    }
    expense_beneficiaries::Entity::insert_many(rows)
        .exec_without_returning(db_tx)
        .await?;
    Ok(())
}

async fn remove_expense(db_tx: &DatabaseTransaction, expense_id: Uuid) -> ResultEngine<()> {
    expense_beneficiaries::Entity::delete_many()
        .filter(expense_beneficiaries::Column::ExpenseId.eq(expense_id.to_string()))
        .exec(db_tx)
        .await?;
    let res = expenses::Entity::delete_by_id(expense_id.to_string())
        .exec(db_tx)
        .await?;
    if res.rows_affected == 0 {
        return Err(EngineError::KeyNotFound("expense not exists".to_string()));
    }
    Ok(())
}
