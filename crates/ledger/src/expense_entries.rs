//! Expense entries.
//!
//! An entry is either a payer contribution or a resolved share of an
//! [`Expense`](crate::Expense). Both are stored in one table, distinguished
//! by `kind`, with `position` preserving input order.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::LedgerError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum EntryKind {
    Payer,
    Share,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Payer => "payer",
            Self::Share => "share",
        }
    }
}

impl TryFrom<&str> for EntryKind {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "payer" => Ok(Self::Payer),
            "share" => Ok(Self::Share),
            other => Err(LedgerError::Validation(format!(
                "invalid expense entry kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expense_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub expense_id: String,
    pub kind: String,
    pub position: i32,
    pub user_id: String,
    pub amount_minor: i64,
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

pub(crate) fn active_model(
    expense_id: Uuid,
    kind: EntryKind,
    position: usize,
    user_id: &str,
    amount_minor: i64,
) -> ActiveModel {
    ActiveModel {
        id: ActiveValue::Set(Uuid::new_v4().to_string()),
        expense_id: ActiveValue::Set(expense_id.to_string()),
        kind: ActiveValue::Set(kind.as_str().to_string()),
        position: ActiveValue::Set(i32::try_from(position).unwrap_or(i32::MAX)),
        user_id: ActiveValue::Set(user_id.to_string()),
        amount_minor: ActiveValue::Set(amount_minor),
    }
}
