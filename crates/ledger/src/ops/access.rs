//! Referential checks shared by the write paths.
//!
//! Existence and membership are checked in one query per batch; the
//! offending ids come back in input order and callers report the first.

use std::collections::HashSet;

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect};
use uuid::Uuid;

use crate::{
    Currency, Group, LedgerError, ResultLedger, group_members, groups, users, util::unique_ids,
};

use super::Ledger;

pub(crate) async fn missing_users<C: ConnectionTrait>(
    conn: &C,
    user_ids: &[&str],
) -> ResultLedger<Vec<String>> {
    let ids = unique_ids(user_ids.iter().copied());
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let found: HashSet<String> = users::Entity::find()
        .select_only()
        .column(users::Column::UserId)
        .filter(users::Column::UserId.is_in(ids.iter().copied()))
        .into_tuple::<String>()
        .all(conn)
        .await?
        .into_iter()
        .collect();

    Ok(ids
        .into_iter()
        .filter(|id| !found.contains(*id))
        .map(ToString::to_string)
        .collect())
}

pub(crate) async fn non_members<C: ConnectionTrait>(
    conn: &C,
    group_id: Uuid,
    user_ids: &[&str],
) -> ResultLedger<Vec<String>> {
    let ids = unique_ids(user_ids.iter().copied());
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let active: HashSet<String> = group_members::Entity::find()
        .select_only()
        .column(group_members::Column::UserId)
        .filter(group_members::Column::GroupId.eq(group_id.to_string()))
        .filter(group_members::Column::IsActive.eq(true))
        .filter(group_members::Column::UserId.is_in(ids.iter().copied()))
        .into_tuple::<String>()
        .all(conn)
        .await?
        .into_iter()
        .collect();

    Ok(ids
        .into_iter()
        .filter(|id| !active.contains(*id))
        .map(ToString::to_string)
        .collect())
}

/// Fails with [`LedgerError::UnknownUser`] naming the first missing id.
pub(crate) async fn ensure_users_exist<C: ConnectionTrait>(
    conn: &C,
    user_ids: &[&str],
) -> ResultLedger<()> {
    match missing_users(conn, user_ids).await?.into_iter().next() {
        Some(user_id) => Err(LedgerError::UnknownUser(user_id)),
        None => Ok(()),
    }
}

/// Fails with [`LedgerError::NotAMember`] naming the first id that is not an
/// active member of the group.
pub(crate) async fn ensure_members<C: ConnectionTrait>(
    conn: &C,
    group_id: Uuid,
    user_ids: &[&str],
) -> ResultLedger<()> {
    match non_members(conn, group_id, user_ids).await?.into_iter().next() {
        Some(user_id) => Err(LedgerError::NotAMember {
            user_id,
            group_id: group_id.to_string(),
        }),
        None => Ok(()),
    }
}

pub(crate) async fn require_user_exists<C: ConnectionTrait>(
    conn: &C,
    user_id: &str,
) -> ResultLedger<()> {
    ensure_users_exist(conn, &[user_id]).await
}

/// Loads an active group, [`LedgerError::NotFound`] otherwise.
pub(crate) async fn require_group<C: ConnectionTrait>(
    conn: &C,
    group_id: Uuid,
) -> ResultLedger<Group> {
    let model = groups::Entity::find_by_id(group_id.to_string())
        .one(conn)
        .await?
        .filter(|group| group.is_active)
        .ok_or_else(|| LedgerError::NotFound("group".to_string()))?;
    Group::try_from(model)
}

/// Resolves the group of a scoped write and checks its currency.
pub(crate) async fn require_group_currency<C: ConnectionTrait>(
    conn: &C,
    group_id: Uuid,
    currency: Currency,
) -> ResultLedger<Group> {
    let group = require_group(conn, group_id).await?;
    crate::util::ensure_currency(group.currency, currency)?;
    Ok(group)
}

impl Ledger {
    /// Ids among `user_ids` that are not registered, in input order.
    pub async fn missing_users(&self, user_ids: &[&str]) -> ResultLedger<Vec<String>> {
        missing_users(&self.database, user_ids).await
    }

    /// Ids among `user_ids` that are not active members of the group, in
    /// input order.
    pub async fn non_members(
        &self,
        group_id: Uuid,
        user_ids: &[&str],
    ) -> ResultLedger<Vec<String>> {
        non_members(&self.database, group_id, user_ids).await
    }
}
