//! Users table.
//!
//! Identity lives outside the ledger; this table only answers "does this user
//! exist" for referential checks. `user_id` is the external identifier.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&User> for ActiveModel {
    fn from(user: &User) -> Self {
        Self {
            user_id: ActiveValue::Set(user.user_id.clone()),
            name: ActiveValue::Set(user.name.clone()),
            email: ActiveValue::Set(user.email.clone()),
            created_at: ActiveValue::Set(user.created_at),
        }
    }
}

impl From<Model> for User {
    fn from(model: Model) -> Self {
        Self {
            user_id: model.user_id,
            name: model.name,
            email: model.email,
            created_at: model.created_at,
        }
    }
}
