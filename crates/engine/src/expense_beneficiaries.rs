//! Beneficiary shares of an expense.
//!
//! One row per (expense, member). `position` keeps the submitted order, which
//! decides who absorbs the rounding remainder of an even split.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::MoneyCents;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseBeneficiary {
    pub member_id: String,
    pub share: MoneyCents,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expense_beneficiaries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub expense_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub member_id: String,
    pub position: i32,
    pub share_minor: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::expenses::Entity",
        from = "Column::ExpenseId",
        to = "super::expenses::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Expenses,
}

impl Related<super::expenses::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Expenses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub(crate) fn new(expense_id: Uuid, position: i32, beneficiary: &ExpenseBeneficiary) -> Self {
        Self {
            expense_id: ActiveValue::Set(expense_id.to_string()),
            member_id: ActiveValue::Set(beneficiary.member_id.clone()),
            position: ActiveValue::Set(position),
            share_minor: ActiveValue::Set(beneficiary.share.cents()),
        }
    }
}

impl From<Model> for ExpenseBeneficiary {
    fn from(model: Model) -> Self {
        Self {
            member_id: model.member_id,
            share: MoneyCents::new(model.share_minor),
        }
    }
}
