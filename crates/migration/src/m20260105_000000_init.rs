//! Initial schema.
//!
//! - `expenses`: payments advanced by one member of a group
//! - `expense_beneficiaries`: per-member shares of an expense
//! - `settlements`: directed debts derived from the balances, pending or paid
//! - `member_balances`: cached net balance per group member

use sea_orm::{ConnectionTrait, Statement};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Expenses {
    Table,
    Id,
    GroupId,
    PayerId,
    AmountMinor,
    Description,
    CreatedAt,
}

#[derive(Iden)]
enum ExpenseBeneficiaries {
    Table,
    ExpenseId,
    MemberId,
    Position,
    ShareMinor,
}

#[derive(Iden)]
enum Settlements {
    Table,
    Id,
    GroupId,
    DebtorId,
    CreditorId,
    AmountMinor,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum MemberBalances {
    Table,
    GroupId,
    MemberId,
    BalanceMinor,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Expenses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Expenses::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Expenses::GroupId).string().not_null())
                    .col(ColumnDef::new(Expenses::PayerId).string().not_null())
                    .col(
                        ColumnDef::new(Expenses::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Expenses::Description).string())
                    .col(ColumnDef::new(Expenses::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-expenses-group_id-created_at")
                    .table(Expenses::Table)
                    .col(Expenses::GroupId)
                    .col(Expenses::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ExpenseBeneficiaries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExpenseBeneficiaries::ExpenseId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExpenseBeneficiaries::MemberId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExpenseBeneficiaries::Position)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExpenseBeneficiaries::ShareMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(ExpenseBeneficiaries::ExpenseId)
                            .col(ExpenseBeneficiaries::MemberId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-expense_beneficiaries-expense_id")
                            .from(ExpenseBeneficiaries::Table, ExpenseBeneficiaries::ExpenseId)
                            .to(Expenses::Table, Expenses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Settlements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Settlements::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Settlements::GroupId).string().not_null())
                    .col(ColumnDef::new(Settlements::DebtorId).string().not_null())
                    .col(ColumnDef::new(Settlements::CreditorId).string().not_null())
                    .col(
                        ColumnDef::new(Settlements::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Settlements::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Settlements::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Settlements::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-settlements-group_id-status")
                    .table(Settlements::Table)
                    .col(Settlements::GroupId)
                    .col(Settlements::Status)
                    .to_owned(),
            )
            .await?;

        // At most one pending row per debtor/creditor pair; paid rows are
        // history and may repeat.
        let db = manager.get_connection();
        let backend = db.get_database_backend();
        db.execute(Statement::from_string(
            backend,
            "CREATE UNIQUE INDEX IF NOT EXISTS \"idx-settlements-pending-pair-unique\" \
             ON settlements (group_id, debtor_id, creditor_id) \
             WHERE status = 'pending';"
                .to_string(),
        ))
        .await?;

        manager
            .create_table(
                Table::create()
                    .table(MemberBalances::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(MemberBalances::GroupId).string().not_null())
                    .col(ColumnDef::new(MemberBalances::MemberId).string().not_null())
                    .col(
                        ColumnDef::new(MemberBalances::BalanceMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(MemberBalances::GroupId)
                            .col(MemberBalances::MemberId),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MemberBalances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Settlements::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ExpenseBeneficiaries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Expenses::Table).to_owned())
            .await?;
        Ok(())
    }
}
