//! Expenses.
//!
//! An [`Expense`] stores its payers and its **resolved** shares; the raw split
//! input is consumed by [`calculate_shares`](crate::split::calculate_shares)
//! and only the [`SplitKind`] tag is kept next to the result.
//!
//! The balance effect of an expense is given by [`net_deltas`]: every user
//! touched by it moves by `paid - share`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Currency, LedgerError, Money, Payer, Scope, Share, SplitKind,
    expense_entries::{self, EntryKind},
    util::parse_uuid,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: Uuid,
    pub group_id: Option<Uuid>,
    pub creator_id: String,
    pub title: String,
    pub amount: Money,
    pub currency: Currency,
    pub payers: Vec<Payer>,
    pub split_kind: SplitKind,
    pub shares: Vec<Share>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expense {
    #[must_use]
    pub fn scope(&self) -> Scope {
        Scope::from(self.group_id)
    }

    /// Signed balance change of every user with a non-zero effect.
    #[must_use]
    pub fn net_deltas(&self) -> BTreeMap<String, Money> {
        net_deltas(&self.payers, &self.shares)
    }

    /// Returns `true` if `user_id` created, paid for or holds a share of the
    /// expense.
    #[must_use]
    pub fn involves(&self, user_id: &str) -> bool {
        self.creator_id == user_id
            || self.payers.iter().any(|p| p.user_id == user_id)
            || self.shares.iter().any(|s| s.user_id == user_id)
    }

    pub(crate) fn entry_models(&self) -> Vec<expense_entries::ActiveModel> {
        let payers = self.payers.iter().enumerate().map(|(position, payer)| {
            expense_entries::active_model(
                self.id,
                EntryKind::Payer,
                position,
                &payer.user_id,
                payer.amount.minor(),
            )
        });
        let shares = self.shares.iter().enumerate().map(|(position, share)| {
            expense_entries::active_model(
                self.id,
                EntryKind::Share,
                position,
                &share.user_id,
                share.amount.minor(),
            )
        });
        payers.chain(shares).collect()
    }
}

/// Net balance delta per user: what they paid minus what they owe.
///
/// Users whose contributions cancel out are omitted. The map is ordered by
/// user id so callers touch balance rows in a stable order.
#[must_use]
pub fn net_deltas(payers: &[Payer], shares: &[Share]) -> BTreeMap<String, Money> {
    let mut deltas: BTreeMap<String, Money> = BTreeMap::new();
    for payer in payers {
        *deltas.entry(payer.user_id.clone()).or_default() += payer.amount;
    }
    for share in shares {
        *deltas.entry(share.user_id.clone()).or_default() -= share.amount;
    }
    deltas.retain(|_, delta| !delta.is_zero());
    deltas
}

/// Per-user difference `after - before`, dropping users that did not move.
///
/// Used to replace the balance effect of an edited or deleted expense in a
/// single write per user.
pub(crate) fn delta_change(
    before: &BTreeMap<String, Money>,
    after: &BTreeMap<String, Money>,
) -> BTreeMap<String, Money> {
    let mut change = after.clone();
    for (user_id, delta) in before {
        *change.entry(user_id.clone()).or_default() -= *delta;
    }
    change.retain(|_, delta| !delta.is_zero());
    change
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub group_id: Option<String>,
    pub creator_id: String,
    pub title: String,
    pub amount_minor: i64,
    pub currency: String,
    pub split_kind: String,
    pub is_deleted: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::expense_entries::Entity")]
    Entries,
}

impl Related<super::expense_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Expense> for ActiveModel {
    fn from(expense: &Expense) -> Self {
        Self {
            id: ActiveValue::Set(expense.id.to_string()),
            group_id: ActiveValue::Set(expense.group_id.map(|id| id.to_string())),
            creator_id: ActiveValue::Set(expense.creator_id.clone()),
            title: ActiveValue::Set(expense.title.clone()),
            amount_minor: ActiveValue::Set(expense.amount.minor()),
            currency: ActiveValue::Set(expense.currency.code().to_string()),
            split_kind: ActiveValue::Set(expense.split_kind.as_str().to_string()),
            is_deleted: ActiveValue::Set(expense.is_deleted),
            created_at: ActiveValue::Set(expense.created_at),
            updated_at: ActiveValue::Set(expense.updated_at),
        }
    }
}

impl TryFrom<(Model, Vec<expense_entries::Model>)> for Expense {
    type Error = LedgerError;

    fn try_from(
        (model, mut entries): (Model, Vec<expense_entries::Model>),
    ) -> Result<Self, Self::Error> {
        entries.sort_by_key(|entry| entry.position);

        let mut payers = Vec::new();
        let mut shares = Vec::new();
        for entry in entries {
            let amount = Money::new(entry.amount_minor);
            match EntryKind::try_from(entry.kind.as_str())? {
                EntryKind::Payer => payers.push(Payer::new(entry.user_id, amount)),
                EntryKind::Share => shares.push(Share::new(entry.user_id, amount)),
            }
        }

        Ok(Self {
            id: parse_uuid(&model.id, "expense")?,
            group_id: model
                .group_id
                .as_deref()
                .map(|id| parse_uuid(id, "group"))
                .transpose()?,
            creator_id: model.creator_id,
            title: model.title,
            amount: Money::new(model.amount_minor),
            currency: Currency::try_from(model.currency.as_str())?,
            payers,
            split_kind: SplitKind::try_from(model.split_kind.as_str())?,
            shares,
            is_deleted: model.is_deleted,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(minor: i64) -> Money {
        Money::new(minor)
    }

    #[test]
    fn single_payer_equal_split_of_ninety() {
        let payers = vec![Payer::new("a", m(9000))];
        let shares = vec![
            Share::new("a", m(3000)),
            Share::new("b", m(3000)),
            Share::new("c", m(3000)),
        ];

        let deltas = net_deltas(&payers, &shares);

        assert_eq!(deltas.get("a"), Some(&m(6000)));
        assert_eq!(deltas.get("b"), Some(&m(-3000)));
        assert_eq!(deltas.get("c"), Some(&m(-3000)));
        assert_eq!(deltas.values().copied().sum::<Money>(), Money::ZERO);
    }

    #[test]
    fn multiple_payers_are_accumulated_per_user() {
        let payers = vec![
            Payer::new("a", m(2000)),
            Payer::new("b", m(1000)),
            Payer::new("a", m(1000)),
        ];
        let shares = vec![Share::new("b", m(2000)), Share::new("c", m(2000))];

        let deltas = net_deltas(&payers, &shares);

        assert_eq!(deltas.get("a"), Some(&m(3000)));
        assert_eq!(deltas.get("b"), Some(&m(-1000)));
        assert_eq!(deltas.get("c"), Some(&m(-2000)));
    }

    #[test]
    fn delta_change_reverses_and_reapplies() {
        let before = net_deltas(
            &[Payer::new("a", m(9000))],
            &[
                Share::new("a", m(3000)),
                Share::new("b", m(3000)),
                Share::new("c", m(3000)),
            ],
        );
        let after = net_deltas(
            &[Payer::new("a", m(6000))],
            &[Share::new("a", m(3000)), Share::new("b", m(3000))],
        );

        let change = delta_change(&before, &after);

        assert_eq!(change.get("a"), Some(&m(-3000)));
        assert_eq!(change.get("b"), None);
        assert_eq!(change.get("c"), Some(&m(3000)));

        let removal = delta_change(&before, &BTreeMap::new());
        assert_eq!(removal.get("a"), Some(&m(-6000)));
        assert_eq!(removal.get("b"), Some(&m(3000)));
    }

    #[test]
    fn users_that_break_even_are_skipped() {
        let payers = vec![Payer::new("a", m(1000)), Payer::new("b", m(1000))];
        let shares = vec![Share::new("a", m(1000)), Share::new("b", m(1000))];

        assert!(net_deltas(&payers, &shares).is_empty());
    }
}
