//! Users, groups and memberships.
//!
//! Deliberately minimal: these tables only exist so the ledger can check that
//! the people named by an expense or settlement exist and belong to the
//! group.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use uuid::Uuid;

use crate::{
    Currency, Group, GroupMember, LedgerError, MemberRole, ResultLedger, User, group_members,
    groups, users,
    util::{normalize_optional_text, required_text},
};

use super::{Ledger, access, with_tx};

impl Ledger {
    /// Registers a user under an external id.
    pub async fn register_user(
        &self,
        user_id: &str,
        name: &str,
        email: Option<&str>,
    ) -> ResultLedger<User> {
        let user = User {
            user_id: required_text(user_id, "user id")?,
            name: required_text(name, "name")?,
            email: normalize_optional_text(email),
            created_at: Utc::now(),
        };

        with_tx!(self, |db_tx| {
            let existing = users::Entity::find_by_id(user.user_id.clone())
                .one(&db_tx)
                .await?;
            if existing.is_some() {
                return Err(LedgerError::AlreadyExists(format!("user {}", user.user_id)));
            }
            let model: users::ActiveModel = (&user).into();
            model.insert(&db_tx).await?;
            tracing::info!(user_id = %user.user_id, "user registered");
            Ok(user)
        })
    }

    pub async fn user(&self, user_id: &str) -> ResultLedger<User> {
        users::Entity::find_by_id(user_id.to_string())
            .one(&self.database)
            .await?
            .map(User::from)
            .ok_or_else(|| LedgerError::UnknownUser(user_id.to_string()))
    }

    /// Creates a group; the creator becomes its first (admin) member.
    pub async fn create_group(
        &self,
        name: &str,
        currency: Currency,
        creator_id: &str,
    ) -> ResultLedger<Group> {
        let now = Utc::now();
        let group = Group {
            id: Uuid::new_v4(),
            name: required_text(name, "group name")?,
            currency,
            created_by: creator_id.to_string(),
            created_at: now,
            is_active: true,
        };

        with_tx!(self, |db_tx| {
            access::require_user_exists(&db_tx, creator_id).await?;

            let model: groups::ActiveModel = (&group).into();
            model.insert(&db_tx).await?;
            member_model(group.id, creator_id, MemberRole::Admin)
                .insert(&db_tx)
                .await?;

            tracing::info!(group_id = %group.id, currency = %currency, "group created");
            Ok(group)
        })
    }

    pub async fn group(&self, group_id: Uuid) -> ResultLedger<Group> {
        access::require_group(&self.database, group_id).await
    }

    /// Active members of a group, oldest first.
    pub async fn group_members(&self, group_id: Uuid) -> ResultLedger<Vec<GroupMember>> {
        access::require_group(&self.database, group_id).await?;
        group_members::Entity::find()
            .filter(group_members::Column::GroupId.eq(group_id.to_string()))
            .filter(group_members::Column::IsActive.eq(true))
            .order_by_asc(group_members::Column::JoinedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(GroupMember::try_from)
            .collect()
    }

    /// Adds a member, re-activating a previously removed one.
    pub async fn add_group_member(
        &self,
        group_id: Uuid,
        user_id: &str,
        role: MemberRole,
    ) -> ResultLedger<GroupMember> {
        with_tx!(self, |db_tx| {
            access::require_group(&db_tx, group_id).await?;
            access::require_user_exists(&db_tx, user_id).await?;

            let key = (group_id.to_string(), user_id.to_string());
            let existing = group_members::Entity::find_by_id(key)
                .one(&db_tx)
                .await?;
            let model = match existing {
                Some(member) if member.is_active => {
                    return Err(LedgerError::AlreadyExists(format!(
                        "member {user_id} of group {group_id}"
                    )));
                }
                Some(member) => {
                    let mut active: group_members::ActiveModel = member.into();
                    active.role = ActiveValue::Set(role.as_str().to_string());
                    active.joined_at = ActiveValue::Set(Utc::now());
                    active.is_active = ActiveValue::Set(true);
                    active.update(&db_tx).await?
                }
                None => member_model(group_id, user_id, role).insert(&db_tx).await?,
            };

            tracing::info!(%group_id, user_id, role = role.as_str(), "member added");
            GroupMember::try_from(model)
        })
    }

    /// Marks a member inactive. Their past expenses stay untouched.
    pub async fn remove_group_member(&self, group_id: Uuid, user_id: &str) -> ResultLedger<()> {
        with_tx!(self, |db_tx| {
            let key = (group_id.to_string(), user_id.to_string());
            let member = group_members::Entity::find_by_id(key)
                .one(&db_tx)
                .await?
                .filter(|member| member.is_active)
                .ok_or_else(|| LedgerError::NotFound(format!("member {user_id}")))?;

            let mut active: group_members::ActiveModel = member.into();
            active.is_active = ActiveValue::Set(false);
            active.update(&db_tx).await?;

            tracing::info!(%group_id, user_id, "member removed");
            Ok(())
        })
    }
}

fn member_model(group_id: Uuid, user_id: &str, role: MemberRole) -> group_members::ActiveModel {
    group_members::ActiveModel {
        group_id: ActiveValue::Set(group_id.to_string()),
        user_id: ActiveValue::Set(user_id.to_string()),
        role: ActiveValue::Set(role.as_str().to_string()),
        joined_at: ActiveValue::Set(Utc::now()),
        is_active: ActiveValue::Set(true),
    }
}
