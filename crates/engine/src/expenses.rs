//! Expenses.
//!
//! An [`Expense`] is a payment advanced by one member (the payer) on behalf of
//! a subset of the group (the beneficiaries). Each beneficiary owes a share;
//! the shares always add up to the expense amount.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, ExpenseBeneficiary, ExpenseCmd, MoneyCents, ResultEngine, Split,
    expense_beneficiaries, util::parse_uuid,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub group_id: Uuid,
    pub payer_id: String,
    pub amount: MoneyCents,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Beneficiary shares in submitted order.
    pub beneficiaries: Vec<ExpenseBeneficiary>,
}

impl Expense {
    /// Builds a validated expense from a command.
    ///
    /// Even splits are computed here (remainder on the last beneficiary);
    /// exact splits must add up to the amount.
    pub fn new(id: Uuid, cmd: ExpenseCmd) -> ResultEngine<Self> {
        if !cmd.amount.is_positive() {
            return Err(EngineError::InvalidAmount(
                "expense amount must be > 0".to_string(),
            ));
        }
        let payer_id = normalize_member_id(&cmd.payer_id, "payer")?;

        let beneficiaries = match cmd.split {
            Split::Even(members) => {
                let members = members
                    .iter()
                    .map(|member| normalize_member_id(member, "beneficiary"))
                    .collect::<ResultEngine<Vec<_>>>()?;
                let shares = cmd.amount.split_even(members.len())?;
                members
                    .into_iter()
                    .zip(shares)
                    .map(|(member_id, share)| ExpenseBeneficiary { member_id, share })
                    .collect::<Vec<_>>()
            }
            Split::Exact(shares) => shares
                .iter()
                .map(|(member, share)| {
                    Ok(ExpenseBeneficiary {
                        member_id: normalize_member_id(member, "beneficiary")?,
                        share: *share,
                    })
                })
                .collect::<ResultEngine<Vec<_>>>()?,
        };

        let expense = Self {
            id,
            group_id: cmd.group_id,
            payer_id,
            amount: cmd.amount,
            description: cmd
                .description
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string),
            created_at: cmd.created_at,
            beneficiaries,
        };
        expense.validate()?;
        Ok(expense)
    }

    /// Sum of all beneficiary shares.
    ///
    /// Fails with [`EngineError::InvalidAmount`] when the sum overflows.
    pub fn shares_total(&self) -> ResultEngine<MoneyCents> {
        MoneyCents::checked_sum(self.beneficiaries.iter().map(|b| b.share))
            .ok_or_else(|| EngineError::InvalidAmount("shares total too large".to_string()))
    }

    /// Checks the ledger invariants: at least one beneficiary, one share per
    /// member, no negative share, shares summing to the amount.
    pub fn validate(&self) -> ResultEngine<()> {
        if self.beneficiaries.is_empty() {
            return Err(EngineError::InvalidSplit(
                "at least one beneficiary is required".to_string(),
            ));
        }
        let mut seen = HashSet::with_capacity(self.beneficiaries.len());
        for beneficiary in &self.beneficiaries {
            if !seen.insert(beneficiary.member_id.as_str()) {
                return Err(EngineError::InvalidSplit(format!(
                    "duplicate beneficiary: {}",
                    beneficiary.member_id
                )));
            }
            if beneficiary.share.is_negative() {
                return Err(EngineError::InvalidSplit(format!(
                    "share of {} must be >= 0",
                    beneficiary.member_id
                )));
            }
        }
        let total = self.shares_total()?;
        if total != self.amount {
            return Err(EngineError::InvalidSplit(format!(
                "shares sum to {total}, expected {}",
                self.amount
            )));
        }
        Ok(())
    }
}

fn normalize_member_id(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidSplit(format!(
            "{label} id must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub payer_id: String,
    pub amount_minor: i64,
    pub description: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::expense_beneficiaries::Entity")]
    Beneficiaries,
}

impl Related<super::expense_beneficiaries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Beneficiaries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Expense> for ActiveModel {
    fn from(expense: &Expense) -> Self {
        Self {
            id: ActiveValue::Set(expense.id.to_string()),
            group_id: ActiveValue::Set(expense.group_id.to_string()),
            payer_id: ActiveValue::Set(expense.payer_id.clone()),
            amount_minor: ActiveValue::Set(expense.amount.cents()),
            description: ActiveValue::Set(expense.description.clone()),
            created_at: ActiveValue::Set(expense.created_at),
        }
    }
}

impl TryFrom<(Model, Vec<expense_beneficiaries::Model>)> for Expense {
    type Error = EngineError;

    fn try_from(
        (model, mut beneficiaries): (Model, Vec<expense_beneficiaries::Model>),
    ) -> Result<Self, Self::Error> {
        beneficiaries.sort_by_key(|b| b.position);
        Ok(Self {
            id: parse_uuid(&model.id, "expense")?,
            group_id: parse_uuid(&model.group_id, "group")?,
            payer_id: model.payer_id,
            amount: MoneyCents::new(model.amount_minor),
            description: model.description,
            created_at: model.created_at,
            beneficiaries: beneficiaries
                .into_iter()
                .map(ExpenseBeneficiary::from)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn even_split_assigns_remainder_to_last_beneficiary() {
        let cmd = ExpenseCmd::new(group(), "alice", MoneyCents::new(100_00), Utc::now())
            .split_even(["alice", "bob", "carol"]);
        let expense = Expense::new(Uuid::new_v4(), cmd).unwrap();

        let shares: Vec<_> = expense
            .beneficiaries
            .iter()
            .map(|b| (b.member_id.as_str(), b.share.cents()))
            .collect();
        assert_eq!(
            shares,
            vec![("alice", 33_33), ("bob", 33_33), ("carol", 33_34)]
        );
        assert_eq!(expense.shares_total().unwrap(), expense.amount);
    }

    #[test]
    fn exact_split_must_match_amount() {
        let cmd = ExpenseCmd::new(group(), "alice", MoneyCents::new(50_00), Utc::now())
            .split_exact([("bob", MoneyCents::new(20_00)), ("carol", MoneyCents::new(20_00))]);
        let err = Expense::new(Uuid::new_v4(), cmd).unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidSplit("shares sum to 40.00, expected 50.00".to_string())
        );
    }

    #[test]
    fn rejects_duplicate_and_negative_shares() {
        let duplicate = ExpenseCmd::new(group(), "alice", MoneyCents::new(10_00), Utc::now())
            .split_exact([("bob", MoneyCents::new(5_00)), (" bob ", MoneyCents::new(5_00))]);
        assert!(matches!(
            Expense::new(Uuid::new_v4(), duplicate),
            Err(EngineError::InvalidSplit(_))
        ));

        let negative = ExpenseCmd::new(group(), "alice", MoneyCents::new(10_00), Utc::now())
            .split_exact([("bob", MoneyCents::new(15_00)), ("carol", MoneyCents::new(-5_00))]);
        assert!(matches!(
            Expense::new(Uuid::new_v4(), negative),
            Err(EngineError::InvalidSplit(_))
        ));
    }

    #[test]
    fn overflowing_shares_are_rejected() {
        let cmd = ExpenseCmd::new(group(), "alice", MoneyCents::new(1), Utc::now()).split_exact([
            ("bob", MoneyCents::new(i64::MAX)),
            ("carol", MoneyCents::new(i64::MAX)),
            ("dave", MoneyCents::new(3)),
        ]);
        assert_eq!(
            Expense::new(Uuid::new_v4(), cmd).unwrap_err(),
            EngineError::InvalidAmount("shares total too large".to_string())
        );
    }

    #[test]
    fn rejects_non_positive_amount_and_empty_split() {
        let zero = ExpenseCmd::new(group(), "alice", MoneyCents::ZERO, Utc::now())
            .split_even(["alice"]);
        assert!(matches!(
            Expense::new(Uuid::new_v4(), zero),
            Err(EngineError::InvalidAmount(_))
        ));

        let empty = ExpenseCmd::new(group(), "alice", MoneyCents::new(10_00), Utc::now());
        assert!(matches!(
            Expense::new(Uuid::new_v4(), empty),
            Err(EngineError::InvalidSplit(_))
        ));
    }

    #[test]
    fn blank_description_is_dropped() {
        let cmd = ExpenseCmd::new(group(), "alice", MoneyCents::new(10_00), Utc::now())
            .split_even(["alice", "bob"])
            .description("   ");
        let expense = Expense::new(Uuid::new_v4(), cmd).unwrap();
        assert_eq!(expense.description, None);
    }
}
