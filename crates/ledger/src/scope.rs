//! Balance scope: a group, or the personal (groupless) context.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{LedgerError, ResultLedger};

const PERSONAL_KEY: &str = "personal";

/// Partitioning key of a balance row alongside the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "group_id", rename_all = "snake_case")]
pub enum Scope {
    Personal,
    Group(Uuid),
}

impl Scope {
    /// Stored representation (`personal` or the group id).
    ///
    /// Balances are unique on `(user_id, key)`, so the key must never be
    /// `NULL`.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Scope::Personal => PERSONAL_KEY.to_string(),
            Scope::Group(group_id) => group_id.to_string(),
        }
    }

    pub fn from_key(key: &str) -> ResultLedger<Self> {
        if key == PERSONAL_KEY {
            return Ok(Scope::Personal);
        }
        Uuid::parse_str(key)
            .map(Scope::Group)
            .map_err(|_| LedgerError::Validation(format!("invalid scope: {key}")))
    }

    #[must_use]
    pub fn group_id(&self) -> Option<Uuid> {
        match self {
            Scope::Personal => None,
            Scope::Group(group_id) => Some(*group_id),
        }
    }
}

impl From<Option<Uuid>> for Scope {
    fn from(value: Option<Uuid>) -> Self {
        value.map_or(Scope::Personal, Scope::Group)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Personal => f.write_str(PERSONAL_KEY),
            Scope::Group(group_id) => write!(f, "group {group_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personal_key_is_not_a_uuid() {
        assert_eq!(Scope::Personal.key(), "personal");
        assert_eq!(Scope::from_key("personal").unwrap(), Scope::Personal);
    }

    #[test]
    fn group_key_is_the_group_id() {
        let id = Uuid::new_v4();
        assert_eq!(Scope::Group(id).key(), id.to_string());
        assert_eq!(Scope::from_key(&id.to_string()).unwrap(), Scope::Group(id));
        assert_eq!(Scope::from(Some(id)).group_id(), Some(id));
        assert_eq!(Scope::from(None), Scope::Personal);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(Scope::from_key("group-1").is_err());
    }
}
