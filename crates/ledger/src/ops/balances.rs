use std::{collections::BTreeMap, future::Future};

use chrono::{DateTime, Utc};
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    Balance, BalanceChangeType, BalanceHistory, Currency, LedgerError, Money, ResultLedger, Scope,
    util::required_text,
};

use super::{Ledger, access, store, with_tx};

/// Every balance of a user, with totals per currency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub user_id: String,
    pub balances: Vec<Balance>,
    pub totals: BTreeMap<Currency, Money>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Result of checking a balance against the sum of its history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub balance: Money,
    pub history_total: Money,
}

impl Reconciliation {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.balance == self.history_total
    }
}

impl Ledger {
    pub async fn user_balance_summary(&self, user_id: &str) -> ResultLedger<BalanceSummary> {
        access::require_user_exists(&self.database, user_id).await?;
        let balances = store::balances_for_user(&self.database, user_id).await?;

        let mut totals: BTreeMap<Currency, Money> = BTreeMap::new();
        for balance in &balances {
            *totals.entry(balance.currency).or_default() += balance.amount;
        }
        let last_updated = balances.iter().map(|balance| balance.updated_at).max();

        Ok(BalanceSummary {
            user_id: user_id.to_string(),
            balances,
            totals,
            last_updated,
        })
    }

    pub async fn group_balances(&self, group_id: Uuid) -> ResultLedger<Vec<Balance>> {
        access::require_group(&self.database, group_id).await?;
        store::balances_for_group(&self.database, group_id).await
    }

    /// Balance of a user in a group; a user the group never touched gets a
    /// zero balance in the group currency.
    pub async fn user_balance_in_group(
        &self,
        user_id: &str,
        group_id: Uuid,
    ) -> ResultLedger<Balance> {
        let group = access::require_group(&self.database, group_id).await?;
        let scope = Scope::Group(group_id);
        match store::balance(&self.database, user_id, scope).await {
            Err(LedgerError::NotFound(_)) => Ok(Balance::zero(user_id, scope, group.currency)),
            other => other,
        }
    }

    pub async fn balance(&self, user_id: &str, scope: Scope) -> ResultLedger<Balance> {
        store::balance(&self.database, user_id, scope).await
    }

    pub async fn balance_history(
        &self,
        user_id: &str,
        scope: Option<Scope>,
        limit: u64,
        offset: u64,
    ) -> ResultLedger<Vec<BalanceHistory>> {
        store::balance_history(&self.database, user_id, scope, limit, offset).await
    }

    /// Sets a balance to `new_amount`, recording the difference as a
    /// `correction` history row.
    ///
    /// The balance is read, the delta computed here, and the write guarded by
    /// its version. A concurrent writer causes a re-read, at most
    /// `max_cas_retries` times; after that the last
    /// [`LedgerError::OptimisticLock`] is returned.
    pub async fn correct_balance(
        &self,
        user_id: &str,
        scope: Scope,
        new_amount: Money,
        reason: &str,
    ) -> ResultLedger<Balance> {
        let reason = required_text(reason, "reason")?;
        retry_on_lock(self.max_cas_retries, || {
            self.try_correct_balance(user_id, scope, new_amount, &reason)
        })
        .await
    }

    async fn try_correct_balance(
        &self,
        user_id: &str,
        scope: Scope,
        new_amount: Money,
        reason: &str,
    ) -> ResultLedger<Balance> {
        let current = store::balance(&self.database, user_id, scope).await?;
        let delta = new_amount - current.amount;
        if delta.is_zero() {
            return Ok(current);
        }

        with_tx!(self, |db_tx| {
            let updated = store::compare_and_set(
                &db_tx,
                &Balance {
                    amount: new_amount,
                    ..current.clone()
                },
            )
            .await?;
            let entry = BalanceHistory::new(
                user_id,
                scope,
                delta,
                current.currency,
                BalanceChangeType::Correction,
                None,
                reason,
            );
            store::append_history(&db_tx, &entry).await?;

            tracing::info!(
                user_id,
                scope = %scope,
                from = %current.amount,
                to = %new_amount,
                "balance corrected"
            );
            Ok(updated)
        })
    }

    /// Compares a balance with the sum of its history. A missing balance
    /// counts as zero.
    pub async fn reconcile(&self, user_id: &str, scope: Scope) -> ResultLedger<Reconciliation> {
        let balance = match store::balance(&self.database, user_id, scope).await {
            Ok(balance) => balance.amount,
            Err(LedgerError::NotFound(_)) => Money::ZERO,
            Err(err) => return Err(err),
        };
        let history_total = store::history_total(&self.database, user_id, scope).await?;

        let reconciliation = Reconciliation {
            balance,
            history_total,
        };
        if !reconciliation.is_consistent() {
            tracing::warn!(
                user_id,
                scope = %scope,
                balance = %balance,
                history_total = %history_total,
                "balance does not match its history"
            );
        }
        Ok(reconciliation)
    }
}

/// Runs `attempt` again after each [`LedgerError::OptimisticLock`], at most
/// `max_retries` times; then the last conflict is returned. Other outcomes
/// are returned as they are.
async fn retry_on_lock<T, F, Fut>(max_retries: u32, mut attempt: F) -> ResultLedger<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ResultLedger<T>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Err(err @ LedgerError::OptimisticLock { .. }) if retries < max_retries => {
                retries += 1;
                tracing::warn!(error = %err, retries, "retrying after optimistic lock conflict");
            }
            outcome => return outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn conflict() -> LedgerError {
        LedgerError::OptimisticLock {
            user_id: "alice".to_string(),
            scope: "personal".to_string(),
        }
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_an_attempt_succeeds() {
        let calls = Cell::new(0);
        let outcome = retry_on_lock(3, || {
            calls.set(calls.get() + 1);
            let failed = calls.get() <= 2;
            async move { if failed { Err(conflict()) } else { Ok(Money::new(7)) } }
        })
        .await;

        assert_eq!(outcome, Ok(Money::new(7)));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn last_conflict_is_returned_once_retries_run_out() {
        let calls = Cell::new(0);
        let outcome: ResultLedger<()> = retry_on_lock(2, || {
            calls.set(calls.get() + 1);
            async { Err(conflict()) }
        })
        .await;

        assert_eq!(outcome, Err(conflict()));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn zero_retries_means_a_single_attempt() {
        let calls = Cell::new(0);
        let outcome: ResultLedger<()> = retry_on_lock(0, || {
            calls.set(calls.get() + 1);
            async { Err(conflict()) }
        })
        .await;

        assert!(matches!(outcome, Err(LedgerError::OptimisticLock { .. })));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = Cell::new(0);
        let outcome: ResultLedger<()> = retry_on_lock(5, || {
            calls.set(calls.get() + 1);
            async { Err(LedgerError::NotFound("balance".to_string())) }
        })
        .await;

        assert_eq!(outcome, Err(LedgerError::NotFound("balance".to_string())));
        assert_eq!(calls.get(), 1);
    }
}
