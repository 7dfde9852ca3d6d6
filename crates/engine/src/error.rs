//! The module contains the error the engine can throw.
//!
//! The most relevant ones are:
//!
//! - [`InvalidSplit`] thrown when beneficiary shares do not add up to the
//!   expense amount.
//! - [`SettlementState`] thrown when a settlement is not in the state an
//!   operation requires (e.g. paying a paid settlement).
//! - [`UnbalancedLedger`] thrown when the balances of a group do not sum to
//!   zero, so no consistent settlement set exists.
//! - [`Cancelled`] thrown when a guarded operation was cancelled; nothing was
//!   written.
//!
//!  [`InvalidSplit`]: EngineError::InvalidSplit
//!  [`SettlementState`]: EngineError::SettlementState
//!  [`UnbalancedLedger`]: EngineError::UnbalancedLedger
//!  [`Cancelled`]: EngineError::Cancelled
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid split: {0}")]
    InvalidSplit(String),
    #[error("Invalid id: {0}")]
    InvalidId(String),
    #[error("Group mismatch: {0}")]
    GroupMismatch(String),
    #[error("Invalid settlement state: {0}")]
    SettlementState(String),
    #[error("Unbalanced ledger: {0}")]
    UnbalancedLedger(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidSplit(a), Self::InvalidSplit(b)) => a == b,
            (Self::InvalidId(a), Self::InvalidId(b)) => a == b,
            (Self::GroupMismatch(a), Self::GroupMismatch(b)) => a == b,
            (Self::SettlementState(a), Self::SettlementState(b)) => a == b,
            (Self::UnbalancedLedger(a), Self::UnbalancedLedger(b)) => a == b,
            (Self::Cancelled, Self::Cancelled) => true,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
