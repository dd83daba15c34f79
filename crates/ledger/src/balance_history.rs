//! Balance history (audit trail).
//!
//! Append-only: a row is written in the same unit of work as the balance
//! delta it mirrors and is never updated. For every `(user_id, scope)` the
//! sum of `amount_minor` equals the current balance.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, LedgerError, Money, Scope, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceChangeType {
    Expense,
    Settlement,
    Adjustment,
    Correction,
}

impl BalanceChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Settlement => "settlement",
            Self::Adjustment => "adjustment",
            Self::Correction => "correction",
        }
    }
}

impl TryFrom<&str> for BalanceChangeType {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "expense" => Ok(Self::Expense),
            "settlement" => Ok(Self::Settlement),
            "adjustment" => Ok(Self::Adjustment),
            "correction" => Ok(Self::Correction),
            other => Err(LedgerError::Validation(format!(
                "invalid balance change type: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceHistory {
    pub id: Uuid,
    pub user_id: String,
    pub scope: Scope,
    /// Signed delta applied to the balance.
    pub amount: Money,
    pub currency: Currency,
    pub change_type: BalanceChangeType,
    /// Originating expense or settlement, `None` for manual corrections.
    pub reference_id: Option<Uuid>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl BalanceHistory {
    pub fn new(
        user_id: impl Into<String>,
        scope: Scope,
        amount: Money,
        currency: Currency,
        change_type: BalanceChangeType,
        reference_id: Option<Uuid>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            scope,
            amount,
            currency,
            change_type,
            reference_id,
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "balance_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    pub scope: String,
    pub amount_minor: i64,
    pub currency: String,
    pub change_type: String,
    pub reference_id: Option<String>,
    pub description: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&BalanceHistory> for ActiveModel {
    fn from(entry: &BalanceHistory) -> Self {
        Self {
            id: ActiveValue::Set(entry.id.to_string()),
            user_id: ActiveValue::Set(entry.user_id.clone()),
            scope: ActiveValue::Set(entry.scope.key()),
            amount_minor: ActiveValue::Set(entry.amount.minor()),
            currency: ActiveValue::Set(entry.currency.code().to_string()),
            change_type: ActiveValue::Set(entry.change_type.as_str().to_string()),
            reference_id: ActiveValue::Set(entry.reference_id.map(|id| id.to_string())),
            description: ActiveValue::Set(entry.description.clone()),
            created_at: ActiveValue::Set(entry.created_at),
        }
    }
}

impl TryFrom<Model> for BalanceHistory {
    type Error = LedgerError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "balance history")?,
            scope: Scope::from_key(&model.scope)?,
            user_id: model.user_id,
            amount: Money::new(model.amount_minor),
            currency: Currency::try_from(model.currency.as_str())?,
            change_type: BalanceChangeType::try_from(model.change_type.as_str())?,
            reference_id: model
                .reference_id
                .as_deref()
                .map(|id| parse_uuid(id, "reference"))
                .transpose()?,
            description: model.description,
            created_at: model.created_at,
        })
    }
}
