//! Settlements.
//!
//! A [`Settlement`] is a persisted, directed debt: `debtor` owes `creditor`
//! `amount`. Pending rows are derived state owned by the engine; paid rows are
//! history and are never touched by recomputation.
//!
//! At most one *pending* row exists per (group, debtor, creditor). Paid rows
//! are not part of that constraint, so a pair may accumulate several paid rows
//! next to its current pending one.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, MoneyCents, Transfer, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Paid,
}

impl SettlementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }
}

impl TryFrom<&str> for SettlementStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            other => Err(EngineError::SettlementState(format!(
                "invalid settlement status: {other}"
            ))),
        }
    }
}

/// A directed debt between two members of a group.
///
/// Uniqueness per (group, debtor, creditor) holds for pending rows only; once
/// paid, a row no longer blocks a new pending row for the same pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: Uuid,
    pub group_id: Uuid,
    pub debtor_id: String,
    pub creditor_id: String,
    pub amount: MoneyCents,
    pub status: SettlementStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Settlement {
    /// New pending settlement for a computed transfer.
    pub fn pending(group_id: Uuid, transfer: &Transfer, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            group_id,
            debtor_id: transfer.debtor_id.clone(),
            creditor_id: transfer.creditor_id.clone(),
            amount: transfer.amount,
            status: SettlementStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == SettlementStatus::Pending
    }

    /// The `(debtor, creditor, amount)` triple of the row.
    pub fn transfer(&self) -> Transfer {
        Transfer {
            debtor_id: self.debtor_id.clone(),
            creditor_id: self.creditor_id.clone(),
            amount: self.amount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "settlements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: String,
    pub debtor_id: String,
    pub creditor_id: String,
    pub amount_minor: i64,
    pub status: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Settlement> for ActiveModel {
    fn from(settlement: &Settlement) -> Self {
        Self {
            id: ActiveValue::Set(settlement.id.to_string()),
            group_id: ActiveValue::Set(settlement.group_id.to_string()),
            debtor_id: ActiveValue::Set(settlement.debtor_id.clone()),
            creditor_id: ActiveValue::Set(settlement.creditor_id.clone()),
            amount_minor: ActiveValue::Set(settlement.amount.cents()),
            status: ActiveValue::Set(settlement.status.as_str().to_string()),
            created_at: ActiveValue::Set(settlement.created_at),
            updated_at: ActiveValue::Set(settlement.updated_at),
        }
    }
}

impl TryFrom<Model> for Settlement {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "settlement")?,
            group_id: parse_uuid(&model.group_id, "group")?,
            debtor_id: model.debtor_id,
            creditor_id: model.creditor_id,
            amount: MoneyCents::new(model.amount_minor),
            status: SettlementStatus::try_from(model.status.as_str())?,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
