//! Ledger store primitives.
//!
//! The only code allowed to write `balances` rows. Two mutation primitives
//! are exposed:
//!
//! - [`adjust`]: a blind, commutative increment. Get-or-create is part of its
//!   contract: the first delta for a `(user, scope)` creates the row at
//!   version 1. It never reads before writing, so concurrent units of work
//!   touching the same row serialize on the store's write lock instead of
//!   racing.
//! - [`compare_and_set`]: a versioned write for read-modify-write callers. A
//!   stale version yields [`LedgerError::OptimisticLock`] and nothing is
//!   overwritten.
//!
//! Writes that must be atomic with other writes take a
//! [`DatabaseTransaction`], the unit of work of the surrounding operation.

use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbBackend, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Statement, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    Balance, BalanceChangeType, BalanceHistory, Currency, LedgerError, Money, ResultLedger, Scope,
    balance_history, balances,
};

const ADJUST_SQL: &str = "INSERT INTO balances \
    (user_id, scope, amount_minor, currency, version, updated_at) \
    VALUES (?, ?, ?, ?, 1, ?) \
    ON CONFLICT(user_id, scope) DO UPDATE SET \
    amount_minor = balances.amount_minor + excluded.amount_minor, \
    version = balances.version + 1, \
    updated_at = excluded.updated_at \
    WHERE balances.currency = excluded.currency";

/// Adds `delta` to the balance of `user_id` in `scope`, creating the row when
/// absent.
///
/// Fails with [`LedgerError::CurrencyMismatch`] when the existing row is
/// denominated in another currency; the caller's unit of work must then be
/// aborted.
pub async fn adjust(
    db_tx: &DatabaseTransaction,
    user_id: &str,
    scope: Scope,
    currency: Currency,
    delta: Money,
) -> ResultLedger<()> {
    let statement = Statement::from_sql_and_values(
        DbBackend::Sqlite,
        ADJUST_SQL,
        [
            user_id.into(),
            scope.key().into(),
            delta.minor().into(),
            currency.code().into(),
            Utc::now().into(),
        ],
    );
    let result = db_tx.execute(statement).await?;
    if result.rows_affected() == 0 {
        return Err(LedgerError::CurrencyMismatch(format!(
            "balance of {user_id} in {scope} is not denominated in {currency}"
        )));
    }

    tracing::debug!(
        user_id,
        scope = %scope,
        delta = %delta,
        currency = %currency,
        "balance adjusted"
    );
    Ok(())
}

/// Writes `balance.amount` if the stored version still equals
/// `balance.version`, returning the balance with its new version.
///
/// Zero matched rows means [`LedgerError::NotFound`] when the row does not
/// exist and [`LedgerError::OptimisticLock`] otherwise.
pub async fn compare_and_set<C: ConnectionTrait>(
    conn: &C,
    balance: &Balance,
) -> ResultLedger<Balance> {
    let now = Utc::now();
    let scope_key = balance.scope.key();
    let result = balances::Entity::update_many()
        .col_expr(
            balances::Column::AmountMinor,
            Expr::value(balance.amount.minor()),
        )
        .col_expr(balances::Column::Version, Expr::value(balance.version + 1))
        .col_expr(balances::Column::UpdatedAt, Expr::value(now))
        .filter(balances::Column::UserId.eq(balance.user_id.as_str()))
        .filter(balances::Column::Scope.eq(scope_key.as_str()))
        .filter(balances::Column::Version.eq(balance.version))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let exists = balances::Entity::find_by_id((balance.user_id.clone(), scope_key))
            .one(conn)
            .await?
            .is_some();
        if !exists {
            return Err(LedgerError::NotFound("balance".to_string()));
        }
        tracing::warn!(
            user_id = %balance.user_id,
            scope = %balance.scope,
            expected_version = balance.version,
            "optimistic lock conflict"
        );
        return Err(LedgerError::OptimisticLock {
            user_id: balance.user_id.clone(),
            scope: balance.scope.to_string(),
        });
    }

    Ok(Balance {
        version: balance.version + 1,
        updated_at: now,
        ..balance.clone()
    })
}

/// Appends an audit row in the caller's unit of work.
pub async fn append_history(
    db_tx: &DatabaseTransaction,
    entry: &BalanceHistory,
) -> ResultLedger<()> {
    let model: balance_history::ActiveModel = entry.into();
    model.insert(db_tx).await?;
    Ok(())
}

/// Applies one logical event: an [`adjust`] plus a mirroring history row for
/// every user in `deltas`.
pub(crate) async fn apply_deltas(
    db_tx: &DatabaseTransaction,
    deltas: &BTreeMap<String, Money>,
    scope: Scope,
    currency: Currency,
    change_type: BalanceChangeType,
    reference_id: Uuid,
    description: &str,
) -> ResultLedger<()> {
    for (user_id, delta) in deltas {
        if delta.is_zero() {
            continue;
        }
        adjust(db_tx, user_id, scope, currency, *delta).await?;
        let entry = BalanceHistory::new(
            user_id.as_str(),
            scope,
            *delta,
            currency,
            change_type,
            Some(reference_id),
            description,
        );
        append_history(db_tx, &entry).await?;
    }
    Ok(())
}

/// Reads the balance of `user_id` in `scope`.
///
/// A missing row is [`LedgerError::NotFound`]; substituting a zero balance is
/// left to the caller.
pub async fn balance<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
    scope: Scope,
) -> ResultLedger<Balance> {
    balances::Entity::find_by_id((user_id.to_string(), scope.key()))
        .one(conn)
        .await?
        .ok_or_else(|| LedgerError::NotFound("balance".to_string()))
        .and_then(Balance::try_from)
}

pub async fn balances_for_user<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
) -> ResultLedger<Vec<Balance>> {
    balances::Entity::find()
        .filter(balances::Column::UserId.eq(user_id))
        .order_by_asc(balances::Column::Scope)
        .all(conn)
        .await?
        .into_iter()
        .map(Balance::try_from)
        .collect()
}

pub async fn balances_for_group<C: ConnectionTrait>(
    conn: &C,
    group_id: Uuid,
) -> ResultLedger<Vec<Balance>> {
    balances::Entity::find()
        .filter(balances::Column::Scope.eq(Scope::Group(group_id).key()))
        .order_by_asc(balances::Column::UserId)
        .all(conn)
        .await?
        .into_iter()
        .map(Balance::try_from)
        .collect()
}

/// History rows of `user_id`, newest first, optionally restricted to one
/// scope.
pub async fn balance_history<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
    scope: Option<Scope>,
    limit: u64,
    offset: u64,
) -> ResultLedger<Vec<BalanceHistory>> {
    let mut query =
        balance_history::Entity::find().filter(balance_history::Column::UserId.eq(user_id));
    if let Some(scope) = scope {
        query = query.filter(balance_history::Column::Scope.eq(scope.key()));
    }

    query
        .order_by_desc(balance_history::Column::CreatedAt)
        .order_by_desc(balance_history::Column::Id)
        .limit(limit)
        .offset(offset)
        .all(conn)
        .await?
        .into_iter()
        .map(BalanceHistory::try_from)
        .collect()
}

/// Sum of every history delta of `user_id` in `scope`.
pub async fn history_total<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
    scope: Scope,
) -> ResultLedger<Money> {
    let amounts: Vec<i64> = balance_history::Entity::find()
        .select_only()
        .column(balance_history::Column::AmountMinor)
        .filter(balance_history::Column::UserId.eq(user_id))
        .filter(balance_history::Column::Scope.eq(scope.key()))
        .into_tuple()
        .all(conn)
        .await?;
    Ok(amounts.into_iter().map(Money::new).sum())
}
