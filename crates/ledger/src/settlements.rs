//! Settlements.
//!
//! A settlement is a payment promise from `from_user_id` to `to_user_id`.
//! Its status only moves forward:
//!
//! ```text
//! pending ──► completed
//!    │ ├────► failed
//!    │ └────► cancelled
//! ```
//!
//! Only `completed` touches balances. Amount and currency are fixed at
//! creation.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, LedgerError, Money, ResultLedger, Scope, util::parse_uuid};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl SettlementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Validates a transition from `self` to `next`.
    ///
    /// Every transition leaves `pending`; anything else is
    /// [`LedgerError::AlreadyFinalized`].
    pub fn transition(self, next: SettlementStatus, settlement_id: Uuid) -> ResultLedger<Self> {
        match (self, next) {
            (Self::Pending, Self::Completed | Self::Failed | Self::Cancelled) => Ok(next),
            (Self::Pending, Self::Pending) => Err(LedgerError::Validation(
                "settlement is already pending".to_string(),
            )),
            _ => Err(LedgerError::AlreadyFinalized(settlement_id.to_string())),
        }
    }
}

impl TryFrom<&str> for SettlementStatus {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(LedgerError::Validation(format!(
                "invalid settlement status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMethod {
    #[default]
    Cash,
    BankTransfer,
    Upi,
    Paypal,
    Venmo,
    Other,
}

impl SettlementMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::BankTransfer => "bank_transfer",
            Self::Upi => "upi",
            Self::Paypal => "paypal",
            Self::Venmo => "venmo",
            Self::Other => "other",
        }
    }
}

impl TryFrom<&str> for SettlementMethod {
    type Error = LedgerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "cash" => Ok(Self::Cash),
            "bank_transfer" => Ok(Self::BankTransfer),
            "upi" => Ok(Self::Upi),
            "paypal" => Ok(Self::Paypal),
            "venmo" => Ok(Self::Venmo),
            "other" => Ok(Self::Other),
            other => Err(LedgerError::Validation(format!(
                "invalid settlement method: {other}"
            ))),
        }
    }
}

impl std::str::FromStr for SettlementMethod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SettlementMethod::try_from(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: Uuid,
    pub from_user_id: String,
    pub to_user_id: String,
    pub group_id: Option<Uuid>,
    pub amount: Money,
    pub currency: Currency,
    pub method: SettlementMethod,
    pub description: Option<String>,
    pub status: SettlementStatus,
    pub transaction_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl Settlement {
    #[must_use]
    pub fn scope(&self) -> Scope {
        Scope::from(self.group_id)
    }

    #[must_use]
    pub fn is_party(&self, user_id: &str) -> bool {
        self.from_user_id == user_id || self.to_user_id == user_id
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "settlements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub group_id: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub method: String,
    pub description: Option<String>,
    pub status: String,
    pub transaction_ref: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub completed_at: Option<DateTimeUtc>,
    pub failed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Settlement> for ActiveModel {
    fn from(settlement: &Settlement) -> Self {
        Self {
            id: ActiveValue::Set(settlement.id.to_string()),
            from_user_id: ActiveValue::Set(settlement.from_user_id.clone()),
            to_user_id: ActiveValue::Set(settlement.to_user_id.clone()),
            group_id: ActiveValue::Set(settlement.group_id.map(|id| id.to_string())),
            amount_minor: ActiveValue::Set(settlement.amount.minor()),
            currency: ActiveValue::Set(settlement.currency.code().to_string()),
            method: ActiveValue::Set(settlement.method.as_str().to_string()),
            description: ActiveValue::Set(settlement.description.clone()),
            status: ActiveValue::Set(settlement.status.as_str().to_string()),
            transaction_ref: ActiveValue::Set(settlement.transaction_ref.clone()),
            failure_reason: ActiveValue::Set(settlement.failure_reason.clone()),
            created_at: ActiveValue::Set(settlement.created_at),
            updated_at: ActiveValue::Set(settlement.updated_at),
            completed_at: ActiveValue::Set(settlement.completed_at),
            failed_at: ActiveValue::Set(settlement.failed_at),
        }
    }
}

impl TryFrom<Model> for Settlement {
    type Error = LedgerError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "settlement")?,
            from_user_id: model.from_user_id,
            to_user_id: model.to_user_id,
            group_id: model
                .group_id
                .as_deref()
                .map(|id| parse_uuid(id, "group"))
                .transpose()?,
            amount: Money::new(model.amount_minor),
            currency: Currency::try_from(model.currency.as_str())?,
            method: SettlementMethod::try_from(model.method.as_str())?,
            description: model.description,
            status: SettlementStatus::try_from(model.status.as_str())?,
            transaction_ref: model.transaction_ref,
            failure_reason: model.failure_reason,
            created_at: model.created_at,
            updated_at: model.updated_at,
            completed_at: model.completed_at,
            failed_at: model.failed_at,
        })
    }
}
