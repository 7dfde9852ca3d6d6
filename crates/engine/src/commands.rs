//! Command structs for engine operations.
//!
//! These types group parameters for expense writes, keeping call sites
//! readable and avoiding long argument lists.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::MoneyCents;

/// How an expense amount is divided among its beneficiaries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Split {
    /// Equal shares, remainder on the last member in the given order.
    Even(Vec<String>),
    /// Explicit shares; they must add up to the expense amount.
    Exact(Vec<(String, MoneyCents)>),
}

/// Create (or replace) an expense.
#[derive(Clone, Debug)]
pub struct ExpenseCmd {
    pub group_id: Uuid,
    pub payer_id: String,
    pub amount: MoneyCents,
    pub split: Split,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ExpenseCmd {
    #[must_use]
    pub fn new(
        group_id: Uuid,
        payer_id: impl Into<String>,
        amount: MoneyCents,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            group_id,
            payer_id: payer_id.into(),
            amount,
            split: Split::Even(Vec::new()),
            description: None,
            created_at,
        }
    }

    #[must_use]
    pub fn split_even<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.split = Split::Even(members.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn split_exact<I, S>(mut self, shares: I) -> Self
    where
        I: IntoIterator<Item = (S, MoneyCents)>,
        S: Into<String>,
    {
        self.split = Split::Exact(
            shares
                .into_iter()
                .map(|(member, share)| (member.into(), share))
                .collect(),
        );
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
