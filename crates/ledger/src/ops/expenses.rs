//! Expense ledger coordinator.
//!
//! Recording an expense is all-or-nothing: the expense row, its entries, every
//! balance delta and every history row commit in one unit of work, or none of
//! them do. Validation and referential checks run before the first write.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    BalanceChangeType, Currency, Expense, ExpenseEdit, LedgerError, NewExpense, Payer,
    ResultLedger, expense_entries, expenses,
    expenses::delta_change,
    split::calculate_shares,
    util::required_text,
};

use super::{Ledger, access, store, with_tx};

impl Ledger {
    /// Records an expense and applies its net deltas to the balances of its
    /// scope.
    ///
    /// # Errors
    /// - [`LedgerError::Validation`] for malformed amounts, payers or split;
    /// - [`LedgerError::UnknownUser`] / [`LedgerError::NotAMember`] naming the
    ///   first offending user;
    /// - [`LedgerError::CurrencyMismatch`] when the currency differs from the
    ///   group's or from an existing balance;
    /// - [`LedgerError::Transaction`] when the store fails. Nothing is
    ///   persisted in any error case.
    pub async fn record_expense(&self, cmd: NewExpense) -> ResultLedger<Expense> {
        let title = required_text(&cmd.title, "title")?;
        let shares = calculate_shares(cmd.amount, &cmd.payers, &cmd.split)?;
        let mentioned = mentioned_users(&cmd.creator_id, &cmd.payers, &cmd.split.user_ids());

        let now = Utc::now();
        let expense = Expense {
            id: Uuid::new_v4(),
            group_id: cmd.group_id,
            creator_id: cmd.creator_id.clone(),
            title,
            amount: cmd.amount,
            currency: cmd.currency,
            payers: cmd.payers.clone(),
            split_kind: cmd.split.kind(),
            shares,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        with_tx!(self, |db_tx| {
            check_participants(&db_tx, expense.group_id, expense.currency, &mentioned).await?;

            let model: expenses::ActiveModel = (&expense).into();
            model.insert(&db_tx).await?;
            insert_entries(&db_tx, &expense).await?;

            store::apply_deltas(
                &db_tx,
                &expense.net_deltas(),
                expense.scope(),
                expense.currency,
                BalanceChangeType::Expense,
                expense.id,
                &format!("expense: {}", expense.title),
            )
            .await?;

            tracing::info!(
                expense_id = %expense.id,
                scope = %expense.scope(),
                amount = %expense.amount,
                currency = %expense.currency,
                split = expense.split_kind.as_str(),
                "expense recorded"
            );
            Ok(expense)
        })
    }

    /// Returns an expense visible to `viewer` (its creator, a payer or a share
    /// holder). Deleted expenses are not found.
    pub async fn get_expense(&self, expense_id: Uuid, viewer: &str) -> ResultLedger<Expense> {
        load_expense(&self.database, expense_id)
            .await?
            .filter(|expense| !expense.is_deleted && expense.involves(viewer))
            .ok_or_else(|| LedgerError::NotFound("expense".to_string()))
    }

    pub async fn list_expenses_by_group(
        &self,
        group_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> ResultLedger<Vec<Expense>> {
        access::require_group(&self.database, group_id).await?;
        let models = expenses::Entity::find()
            .filter(expenses::Column::GroupId.eq(group_id.to_string()))
            .filter(expenses::Column::IsDeleted.eq(false))
            .order_by_desc(expenses::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&self.database)
            .await?;
        hydrate(&self.database, models).await
    }

    /// Expenses the user created, paid for or holds a share of, newest first.
    pub async fn list_expenses_by_user(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> ResultLedger<Vec<Expense>> {
        access::require_user_exists(&self.database, user_id).await?;

        let involved: Vec<String> = expense_entries::Entity::find()
            .select_only()
            .column(expense_entries::Column::ExpenseId)
            .distinct()
            .filter(expense_entries::Column::UserId.eq(user_id))
            .into_tuple()
            .all(&self.database)
            .await?;

        let models = expenses::Entity::find()
            .filter(
                Condition::any()
                    .add(expenses::Column::CreatorId.eq(user_id))
                    .add(expenses::Column::Id.is_in(involved)),
            )
            .filter(expenses::Column::IsDeleted.eq(false))
            .order_by_desc(expenses::Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(&self.database)
            .await?;
        hydrate(&self.database, models).await
    }

    /// Edits an expense. Only its creator may do so.
    ///
    /// When the amount, the payers or the split change, the old net deltas
    /// are reversed and the new ones applied, combined into one balance write
    /// and one `adjustment` history row per affected user.
    pub async fn update_expense(
        &self,
        expense_id: Uuid,
        editor: &str,
        edit: ExpenseEdit,
    ) -> ResultLedger<Expense> {
        with_tx!(self, |db_tx| {
            let current = load_editable(&db_tx, expense_id, editor).await?;
            let mut updated = current.clone();

            if let Some(title) = edit.title.as_deref() {
                updated.title = required_text(title, "title")?;
            }

            if edit.changes_ledger() {
                let split = edit.split.as_ref().ok_or_else(|| {
                    LedgerError::Validation(
                        "a new split is required when amount or payers change".to_string(),
                    )
                })?;
                updated.amount = edit.amount.unwrap_or(current.amount);
                if let Some(payers) = &edit.payers {
                    updated.payers = payers.clone();
                }
                updated.shares = calculate_shares(updated.amount, &updated.payers, split)?;
                updated.split_kind = split.kind();

                let mentioned =
                    mentioned_users(&updated.creator_id, &updated.payers, &split.user_ids());
                check_participants(&db_tx, updated.group_id, updated.currency, &mentioned)
                    .await?;
            }
            updated.updated_at = Utc::now();

            let model: expenses::ActiveModel = (&updated).into();
            model.update(&db_tx).await?;

            if edit.changes_ledger() {
                expense_entries::Entity::delete_many()
                    .filter(expense_entries::Column::ExpenseId.eq(expense_id.to_string()))
                    .exec(&db_tx)
                    .await?;
                insert_entries(&db_tx, &updated).await?;

                let change = delta_change(&current.net_deltas(), &updated.net_deltas());
                store::apply_deltas(
                    &db_tx,
                    &change,
                    updated.scope(),
                    updated.currency,
                    BalanceChangeType::Adjustment,
                    updated.id,
                    &format!("expense updated: {}", updated.title),
                )
                .await?;
            }

            tracing::info!(%expense_id, editor, "expense updated");
            Ok(updated)
        })
    }

    /// Soft-deletes an expense and reverses its balance effect. Only its
    /// creator may do so.
    pub async fn delete_expense(&self, expense_id: Uuid, editor: &str) -> ResultLedger<()> {
        with_tx!(self, |db_tx| {
            let mut expense = load_editable(&db_tx, expense_id, editor).await?;
            expense.is_deleted = true;
            expense.updated_at = Utc::now();

            let model: expenses::ActiveModel = (&expense).into();
            model.update(&db_tx).await?;

            let reversal = delta_change(&expense.net_deltas(), &BTreeMap::new());
            store::apply_deltas(
                &db_tx,
                &reversal,
                expense.scope(),
                expense.currency,
                BalanceChangeType::Adjustment,
                expense.id,
                &format!("expense deleted: {}", expense.title),
            )
            .await?;

            tracing::info!(%expense_id, editor, "expense deleted");
            Ok(())
        })
    }
}

fn mentioned_users<'a>(
    creator_id: &'a str,
    payers: &'a [Payer],
    split_users: &[&'a str],
) -> Vec<&'a str> {
    std::iter::once(creator_id)
        .chain(payers.iter().map(|payer| payer.user_id.as_str()))
        .chain(split_users.iter().copied())
        .collect()
}

/// Existence first, then group currency, then membership.
async fn check_participants<C: ConnectionTrait>(
    conn: &C,
    group_id: Option<Uuid>,
    currency: Currency,
    user_ids: &[&str],
) -> ResultLedger<()> {
    access::ensure_users_exist(conn, user_ids).await?;
    if let Some(group_id) = group_id {
        access::require_group_currency(conn, group_id, currency).await?;
        access::ensure_members(conn, group_id, user_ids).await?;
    }
    Ok(())
}

async fn insert_entries(db_tx: &DatabaseTransaction, expense: &Expense) -> ResultLedger<()> {
    expense_entries::Entity::insert_many(expense.entry_models())
        .exec(db_tx)
        .await?;
    Ok(())
}

async fn load_expense<C: ConnectionTrait>(
    conn: &C,
    expense_id: Uuid,
) -> ResultLedger<Option<Expense>> {
    let Some(model) = expenses::Entity::find_by_id(expense_id.to_string())
        .one(conn)
        .await?
    else {
        return Ok(None);
    };
    let entries = expense_entries::Entity::find()
        .filter(expense_entries::Column::ExpenseId.eq(model.id.as_str()))
        .all(conn)
        .await?;
    Expense::try_from((model, entries)).map(Some)
}

/// Loads a live expense for modification by `editor`.
///
/// Users not involved in the expense do not learn that it exists.
async fn load_editable<C: ConnectionTrait>(
    conn: &C,
    expense_id: Uuid,
    editor: &str,
) -> ResultLedger<Expense> {
    let expense = load_expense(conn, expense_id)
        .await?
        .filter(|expense| !expense.is_deleted && expense.involves(editor))
        .ok_or_else(|| LedgerError::NotFound("expense".to_string()))?;
    if expense.creator_id != editor {
        tracing::warn!(%expense_id, editor, "expense change rejected: not the creator");
        return Err(LedgerError::Forbidden(
            "only the creator can modify the expense".to_string(),
        ));
    }
    Ok(expense)
}

async fn hydrate<C: ConnectionTrait>(
    conn: &C,
    models: Vec<expenses::Model>,
) -> ResultLedger<Vec<Expense>> {
    if models.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = models.iter().map(|model| model.id.clone()).collect();
    let mut entries_by_expense: HashMap<String, Vec<expense_entries::Model>> = HashMap::new();
    for entry in expense_entries::Entity::find()
        .filter(expense_entries::Column::ExpenseId.is_in(ids))
        .all(conn)
        .await?
    {
        entries_by_expense
            .entry(entry.expense_id.clone())
            .or_default()
            .push(entry);
    }

    models
        .into_iter()
        .map(|model| {
            let entries = entries_by_expense.remove(&model.id).unwrap_or_default();
            Expense::try_from((model, entries))
        })
        .collect()
}
