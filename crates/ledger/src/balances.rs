//! Balance rows.
//!
//! Exactly one row exists per `(user_id, scope)`; the pair is the primary
//! key. Rows are created lazily by the first event that touches them and are
//! never deleted. Only the store primitives in `ops::store` write them.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{Currency, LedgerError, Money, Scope};

/// Net position of a user in a scope.
///
/// `amount > 0` means the user is owed money, `amount < 0` that they owe.
/// `version` grows by one on every write and guards
/// [`compare_and_set`](crate::store::compare_and_set).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: String,
    pub scope: Scope,
    pub amount: Money,
    pub currency: Currency,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// A balance that was never written (version 0).
    #[must_use]
    pub fn zero(user_id: impl Into<String>, scope: Scope, currency: Currency) -> Self {
        Self {
            user_id: user_id.into(),
            scope,
            amount: Money::ZERO,
            currency,
            version: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "balances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub scope: String,
    pub amount_minor: i64,
    pub currency: String,
    pub version: i64,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Balance {
    type Error = LedgerError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            scope: Scope::from_key(&model.scope)?,
            user_id: model.user_id,
            amount: Money::new(model.amount_minor),
            currency: Currency::try_from(model.currency.as_str())?,
            version: model.version,
            updated_at: model.updated_at,
        })
    }
}
