//! Group expense ledger with settlement recomputation.
//!
//! The [`Engine`] stores expenses and keeps, per group, the minimal set of
//! pending settlements that zero every member's balance. The pipeline
//! ([`recalculate_full`], [`recalculate_incremental`]) runs against any
//! [`SettlementLedger`].

pub use commands::{ExpenseCmd, Split};
pub use error::EngineError;
pub use expense_beneficiaries::ExpenseBeneficiary;
pub use expenses::Expense;
pub use money::MoneyCents;
pub use ops::{Engine, EngineBuilder};
pub use settle::{
    BalanceDirection, MemberBalances, MemoryLedger, ReconcilePlan, ReconcileSummary,
    SettlementChange, SettlementLedger, SqlLedger, Transfer, aggregate, apply_expense,
    balance_delta, net_balances, recalculate_full, recalculate_incremental, reconcile,
};
pub use settlements::{Settlement, SettlementStatus};
pub use tokio_util::sync::CancellationToken;

mod commands;
mod error;
mod expense_beneficiaries;
mod expenses;
mod guard;
mod member_balances;
mod money;
mod ops;
mod settle;
mod settlements;
mod util;

pub type ResultEngine<T> = Result<T, EngineError>;
