use sea_orm::DatabaseConnection;

use crate::ResultLedger;

mod access;
mod balances;
mod expenses;
mod groups;
mod settlements;
pub mod store;

pub use balances::{BalanceSummary, Reconciliation};

/// Runs `$body` inside a database transaction bound to `$tx`.
///
/// The transaction commits when the body yields `Ok` and is rolled back
/// otherwise. An early `?` inside the body drops the transaction, which also
/// rolls it back. The body must only use `$tx`, never `$self.database`.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = $tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }};
}

pub(crate) use with_tx;

const DEFAULT_MAX_CAS_RETRIES: u32 = 3;

/// Entry point of the ledger core.
///
/// Every write opens its own unit of work (a `DatabaseTransaction`) and
/// passes it down to each participating write, so an operation either
/// commits completely or leaves no trace.
#[derive(Debug)]
pub struct Ledger {
    database: DatabaseConnection,
    max_cas_retries: u32,
}

impl Ledger {
    /// Return a builder for `Ledger`. Help to build the struct.
    pub fn builder() -> LedgerBuilder {
        LedgerBuilder::default()
    }
}

/// The builder for `Ledger`
pub struct LedgerBuilder {
    database: DatabaseConnection,
    max_cas_retries: u32,
}

impl Default for LedgerBuilder {
    fn default() -> Self {
        Self {
            database: DatabaseConnection::default(),
            max_cas_retries: DEFAULT_MAX_CAS_RETRIES,
        }
    }
}

impl LedgerBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> LedgerBuilder {
        self.database = db;
        self
    }

    /// How many times a balance correction is retried after losing an
    /// optimistic-lock race.
    pub fn max_cas_retries(mut self, retries: u32) -> LedgerBuilder {
        self.max_cas_retries = retries;
        self
    }

    /// Construct `Ledger`
    pub async fn build(self) -> ResultLedger<Ledger> {
        Ok(Ledger {
            database: self.database,
            max_cas_retries: self.max_cas_retries,
        })
    }
}
