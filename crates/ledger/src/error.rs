//! The module contains the errors the ledger can return.
//!
//! Every failure path of the ledger surfaces one of these variants; nothing is
//! swallowed. The variants split into three families:
//!
//! - caller faults detected before any write: [`Validation`],
//!   [`CurrencyMismatch`], [`UnknownUser`], [`NotAMember`], [`Forbidden`];
//! - state conflicts: [`NotFound`], [`AlreadyExists`], [`AlreadyFinalized`],
//!   [`OptimisticLock`];
//! - store failures: [`Transaction`].
//!
//! Only [`OptimisticLock`] and [`Transaction`] are worth retrying, see
//! [`LedgerError::is_retryable`].
//!
//!  [`Validation`]: LedgerError::Validation
//!  [`CurrencyMismatch`]: LedgerError::CurrencyMismatch
//!  [`UnknownUser`]: LedgerError::UnknownUser
//!  [`NotAMember`]: LedgerError::NotAMember
//!  [`Forbidden`]: LedgerError::Forbidden
//!  [`NotFound`]: LedgerError::NotFound
//!  [`AlreadyExists`]: LedgerError::AlreadyExists
//!  [`AlreadyFinalized`]: LedgerError::AlreadyFinalized
//!  [`OptimisticLock`]: LedgerError::OptimisticLock
//!  [`Transaction`]: LedgerError::Transaction
use sea_orm::DbErr;
use thiserror::Error;

/// Ledger custom errors.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Currency mismatch: {0}")]
    CurrencyMismatch(String),
    #[error("user {0} does not exist")]
    UnknownUser(String),
    #[error("user {user_id} is not a member of group {group_id}")]
    NotAMember { user_id: String, group_id: String },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("\"{0}\" not found!")]
    NotFound(String),
    #[error("\"{0}\" already present!")]
    AlreadyExists(String),
    #[error("settlement {0} is already finalized")]
    AlreadyFinalized(String),
    #[error("balance of {user_id} in {scope} was modified concurrently")]
    OptimisticLock { user_id: String, scope: String },
    #[error("transaction failed: {0}")]
    Transaction(#[from] DbErr),
}

impl LedgerError {
    /// Returns `true` when the caller may re-run the whole operation.
    ///
    /// Both retryable kinds guarantee that nothing partial was persisted.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::OptimisticLock { .. } | Self::Transaction(_))
    }
}

impl PartialEq for LedgerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::CurrencyMismatch(a), Self::CurrencyMismatch(b)) => a == b,
            (Self::UnknownUser(a), Self::UnknownUser(b)) => a == b,
            (
                Self::NotAMember {
                    user_id: a,
                    group_id: ga,
                },
                Self::NotAMember {
                    user_id: b,
                    group_id: gb,
                },
            ) => a == b && ga == gb,
            (Self::Forbidden(a), Self::Forbidden(b)) => a == b,
            (Self::NotFound(a), Self::NotFound(b)) => a == b,
            (Self::AlreadyExists(a), Self::AlreadyExists(b)) => a == b,
            (Self::AlreadyFinalized(a), Self::AlreadyFinalized(b)) => a == b,
            (
                Self::OptimisticLock {
                    user_id: a,
                    scope: sa,
                },
                Self::OptimisticLock {
                    user_id: b,
                    scope: sb,
                },
            ) => a == b && sa == sb,
            (Self::Transaction(a), Self::Transaction(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lock_and_transaction_errors_are_retryable() {
        let lock = LedgerError::OptimisticLock {
            user_id: "alice".to_string(),
            scope: "personal".to_string(),
        };
        assert!(lock.is_retryable());
        assert!(LedgerError::Transaction(DbErr::Custom("busy".to_string())).is_retryable());

        assert!(!LedgerError::Validation("x".to_string()).is_retryable());
        assert!(!LedgerError::AlreadyFinalized("s".to_string()).is_retryable());
        assert!(!LedgerError::UnknownUser("bob".to_string()).is_retryable());
    }

    #[test]
    fn not_a_member_names_user_and_group() {
        let err = LedgerError::NotAMember {
            user_id: "carol".to_string(),
            group_id: "trip".to_string(),
        };
        assert_eq!(err.to_string(), "user carol is not a member of group trip");
    }
}
