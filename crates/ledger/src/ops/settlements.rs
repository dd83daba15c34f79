//! Settlement state machine.
//!
//! Every transition is a conditional update on `status = 'pending'` inside the
//! operation's unit of work. When two callers race, exactly one update matches
//! a row; the other sees [`LedgerError::AlreadyFinalized`] and its unit of
//! work is rolled back, so balances move at most once per settlement.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
    sea_query::{Expr, SimpleExpr},
};
use uuid::Uuid;

use crate::{
    BalanceChangeType, LedgerError, NewSettlement, ResultLedger, Settlement, SettlementStatus,
    settlements,
    util::{normalize_optional_text, required_text},
};

use super::{Ledger, access, store, with_tx};

impl Ledger {
    /// Creates a `pending` settlement. Balances are untouched until it
    /// completes.
    pub async fn create_settlement(&self, cmd: NewSettlement) -> ResultLedger<Settlement> {
        if cmd.from_user_id == cmd.to_user_id {
            return Err(LedgerError::Validation(
                "cannot settle with yourself".to_string(),
            ));
        }
        if !cmd.amount.is_positive() {
            return Err(LedgerError::Validation(
                "settlement amount must be positive".to_string(),
            ));
        }

        let now = Utc::now();
        let settlement = Settlement {
            id: Uuid::new_v4(),
            from_user_id: cmd.from_user_id,
            to_user_id: cmd.to_user_id,
            group_id: cmd.group_id,
            amount: cmd.amount,
            currency: cmd.currency,
            method: cmd.method,
            description: normalize_optional_text(cmd.description.as_deref()),
            status: SettlementStatus::Pending,
            transaction_ref: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
        };

        with_tx!(self, |db_tx| {
            let parties = [
                settlement.from_user_id.as_str(),
                settlement.to_user_id.as_str(),
            ];
            access::ensure_users_exist(&db_tx, &parties).await?;
            if let Some(group_id) = settlement.group_id {
                access::require_group_currency(&db_tx, group_id, settlement.currency).await?;
                access::ensure_members(&db_tx, group_id, &parties).await?;
            }

            let model: settlements::ActiveModel = (&settlement).into();
            model.insert(&db_tx).await?;

            tracing::info!(
                settlement_id = %settlement.id,
                from = %settlement.from_user_id,
                to = %settlement.to_user_id,
                amount = %settlement.amount,
                "settlement created"
            );
            Ok(settlement)
        })
    }

    /// Completes a pending settlement. Only the paying party may do so.
    ///
    /// In one unit of work the status becomes `completed`, the payer's
    /// balance grows by the amount, the payee's shrinks by it, and one
    /// `settlement` history row is appended for each of them.
    pub async fn complete_settlement(
        &self,
        settlement_id: Uuid,
        actor: &str,
        transaction_ref: Option<&str>,
    ) -> ResultLedger<Settlement> {
        let transaction_ref = normalize_optional_text(transaction_ref);

        with_tx!(self, |db_tx| {
            let mut settlement = load_visible(&db_tx, settlement_id, actor).await?;
            if settlement.from_user_id != actor {
                tracing::warn!(%settlement_id, actor, "completion rejected: not the payer");
                return Err(LedgerError::Forbidden(
                    "only the payer can complete a settlement".to_string(),
                ));
            }
            settlement.status = settlement
                .status
                .transition(SettlementStatus::Completed, settlement_id)?;

            let now = Utc::now();
            settlement.updated_at = now;
            settlement.completed_at = Some(now);
            settlement.transaction_ref = transaction_ref;

            let update = Transition::new(SettlementStatus::Completed, now)
                .set(settlements::Column::CompletedAt, Expr::value(now))
                .set(
                    settlements::Column::TransactionRef,
                    Expr::value(settlement.transaction_ref.clone()),
                );
            update.apply(&db_tx, settlement_id).await?;

            let deltas = BTreeMap::from([
                (settlement.from_user_id.clone(), settlement.amount),
                (settlement.to_user_id.clone(), -settlement.amount),
            ]);
            store::apply_deltas(
                &db_tx,
                &deltas,
                settlement.scope(),
                settlement.currency,
                BalanceChangeType::Settlement,
                settlement.id,
                &format!(
                    "settlement from {} to {}",
                    settlement.from_user_id, settlement.to_user_id
                ),
            )
            .await?;

            tracing::info!(%settlement_id, amount = %settlement.amount, "settlement completed");
            Ok(settlement)
        })
    }

    /// Cancels a pending settlement. Either party may do so; balances are
    /// untouched.
    pub async fn cancel_settlement(
        &self,
        settlement_id: Uuid,
        actor: &str,
    ) -> ResultLedger<Settlement> {
        with_tx!(self, |db_tx| {
            let mut settlement = load_visible(&db_tx, settlement_id, actor).await?;
            settlement.status = settlement
                .status
                .transition(SettlementStatus::Cancelled, settlement_id)?;
            settlement.updated_at = Utc::now();

            Transition::new(SettlementStatus::Cancelled, settlement.updated_at)
                .apply(&db_tx, settlement_id)
                .await?;

            tracing::info!(%settlement_id, actor, "settlement cancelled");
            Ok(settlement)
        })
    }

    /// Marks a pending settlement as failed, e.g. when the payment rail
    /// reports an error. No balance was touched, none is.
    pub async fn fail_settlement(
        &self,
        settlement_id: Uuid,
        reason: &str,
    ) -> ResultLedger<Settlement> {
        let reason = required_text(reason, "failure reason")?;

        with_tx!(self, |db_tx| {
            let mut settlement = load(&db_tx, settlement_id).await?;
            settlement.status = settlement
                .status
                .transition(SettlementStatus::Failed, settlement_id)?;

            let now = Utc::now();
            settlement.updated_at = now;
            settlement.failed_at = Some(now);
            settlement.failure_reason = Some(reason);

            Transition::new(SettlementStatus::Failed, now)
                .set(settlements::Column::FailedAt, Expr::value(now))
                .set(
                    settlements::Column::FailureReason,
                    Expr::value(settlement.failure_reason.clone()),
                )
                .apply(&db_tx, settlement_id)
                .await?;

            tracing::info!(%settlement_id, "settlement failed");
            Ok(settlement)
        })
    }

    /// Returns a settlement visible to `viewer` (one of its parties).
    pub async fn get_settlement(
        &self,
        settlement_id: Uuid,
        viewer: &str,
    ) -> ResultLedger<Settlement> {
        load_visible(&self.database, settlement_id, viewer).await
    }

    /// Settlements where the user pays or is paid, newest first.
    pub async fn list_settlements_by_user(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> ResultLedger<Vec<Settlement>> {
        settlements::Entity::find()
            .filter(party_condition(user_id))
            .order_by_desc(settlements::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Settlement::try_from)
            .collect()
    }

    pub async fn list_settlements_by_group(
        &self,
        group_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> ResultLedger<Vec<Settlement>> {
        access::require_group(&self.database, group_id).await?;
        settlements::Entity::find()
            .filter(settlements::Column::GroupId.eq(group_id.to_string()))
            .order_by_desc(settlements::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Settlement::try_from)
            .collect()
    }

    /// Pending settlements where the user pays or is paid, newest first.
    pub async fn pending_settlements(&self, user_id: &str) -> ResultLedger<Vec<Settlement>> {
        settlements::Entity::find()
            .filter(party_condition(user_id))
            .filter(settlements::Column::Status.eq(SettlementStatus::Pending.as_str()))
            .order_by_desc(settlements::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Settlement::try_from)
            .collect()
    }
}

/// Conditional status update leaving `pending`.
struct Transition {
    next: SettlementStatus,
    columns: Vec<(settlements::Column, SimpleExpr)>,
}

impl Transition {
    fn new(next: SettlementStatus, updated_at: DateTime<Utc>) -> Self {
        Self {
            next,
            columns: vec![
                (settlements::Column::Status, Expr::value(next.as_str())),
                (settlements::Column::UpdatedAt, Expr::value(updated_at)),
            ],
        }
    }

    fn set(mut self, column: settlements::Column, value: SimpleExpr) -> Self {
        self.columns.push((column, value));
        self
    }

    async fn apply(self, db_tx: &DatabaseTransaction, settlement_id: Uuid) -> ResultLedger<()> {
        let mut update = settlements::Entity::update_many()
            .filter(settlements::Column::Id.eq(settlement_id.to_string()))
            .filter(settlements::Column::Status.eq(SettlementStatus::Pending.as_str()));
        for (column, value) in self.columns {
            update = update.col_expr(column, value);
        }

        if update.exec(db_tx).await?.rows_affected == 0 {
            tracing::warn!(
                %settlement_id,
                next = self.next.as_str(),
                "settlement transition rejected: no longer pending"
            );
            return Err(LedgerError::AlreadyFinalized(settlement_id.to_string()));
        }
        Ok(())
    }
}

fn party_condition(user_id: &str) -> Condition {
    Condition::any()
        .add(settlements::Column::FromUserId.eq(user_id))
        .add(settlements::Column::ToUserId.eq(user_id))
}

async fn load<C: ConnectionTrait>(conn: &C, settlement_id: Uuid) -> ResultLedger<Settlement> {
    settlements::Entity::find_by_id(settlement_id.to_string())
        .one(conn)
        .await?
        .ok_or_else(|| LedgerError::NotFound("settlement".to_string()))
        .and_then(Settlement::try_from)
}

/// Loads a settlement for one of its parties. Anyone else gets
/// [`LedgerError::NotFound`].
async fn load_visible<C: ConnectionTrait>(
    conn: &C,
    settlement_id: Uuid,
    user_id: &str,
) -> ResultLedger<Settlement> {
    let settlement = load(conn, settlement_id).await?;
    if !settlement.is_party(user_id) {
        return Err(LedgerError::NotFound("settlement".to_string()));
    }
    Ok(settlement)
}
