use sea_orm::{Database, DatabaseConnection, TransactionTrait};

use ledger::{
    Balance, BalanceChangeType, Currency, Ledger, LedgerError, MemberRole, Money, NewExpense,
    Scope, SplitDetail, store,
};
use migration::MigratorTrait;

async fn ledger_with_users(users: &[&str]) -> (Ledger, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let ledger = Ledger::builder()
        .database(db.clone())
        .max_cas_retries(1)
        .build()
        .await
        .unwrap();
    for user in users {
        ledger.register_user(user, user, None).await.unwrap();
    }
    (ledger, db)
}

fn split_with(participants: &[&str]) -> SplitDetail {
    SplitDetail::Equal {
        participants: participants.iter().map(ToString::to_string).collect(),
    }
}

async fn adjust(db: &DatabaseConnection, user: &str, currency: Currency, delta: i64) {
    let tx = db.begin().await.unwrap();
    store::adjust(&tx, user, Scope::Personal, currency, Money::new(delta))
        .await
        .unwrap();
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn adjust_creates_the_row_then_increments_it() {
    let (ledger, db) = ledger_with_users(&["a"]).await;

    adjust(&db, "a", Currency::Usd, 100).await;
    let balance = ledger.balance("a", Scope::Personal).await.unwrap();
    assert_eq!(balance.amount, Money::new(100));
    assert_eq!(balance.version, 1);
    assert_eq!(balance.currency, Currency::Usd);

    adjust(&db, "a", Currency::Usd, -30).await;
    let balance = ledger.balance("a", Scope::Personal).await.unwrap();
    assert_eq!(balance.amount, Money::new(70));
    assert_eq!(balance.version, 2);
}

#[tokio::test]
async fn adjust_refuses_a_second_currency() {
    let (ledger, db) = ledger_with_users(&["a"]).await;
    adjust(&db, "a", Currency::Usd, 100).await;

    let tx = db.begin().await.unwrap();
    let err = store::adjust(&tx, "a", Scope::Personal, Currency::Eur, Money::new(5))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::CurrencyMismatch(_)));
    tx.rollback().await.unwrap();

    let balance = ledger.balance("a", Scope::Personal).await.unwrap();
    assert_eq!(balance.amount, Money::new(100));
    assert_eq!(balance.version, 1);
}

#[tokio::test]
async fn compare_and_set_rejects_a_stale_version() {
    let (ledger, db) = ledger_with_users(&["a"]).await;
    adjust(&db, "a", Currency::Usd, 100).await;
    let stale = ledger.balance("a", Scope::Personal).await.unwrap();
    adjust(&db, "a", Currency::Usd, 50).await;

    let err = store::compare_and_set(
        &db,
        &Balance {
            amount: Money::new(0),
            ..stale.clone()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(
        err,
        LedgerError::OptimisticLock {
            user_id: "a".to_string(),
            scope: "personal".to_string(),
        }
    );
    assert_eq!(
        ledger.balance("a", Scope::Personal).await.unwrap().amount,
        Money::new(150)
    );

    let fresh = ledger.balance("a", Scope::Personal).await.unwrap();
    let written = store::compare_and_set(
        &db,
        &Balance {
            amount: Money::new(0),
            ..fresh
        },
    )
    .await
    .unwrap();
    assert_eq!(written.version, 3);
    assert_eq!(
        ledger.balance("a", Scope::Personal).await.unwrap().amount,
        Money::ZERO
    );
}

#[tokio::test]
async fn compare_and_set_on_a_missing_row_is_not_found() {
    let (_ledger, db) = ledger_with_users(&["a"]).await;
    let err = store::compare_and_set(&db, &Balance::zero("a", Scope::Personal, Currency::Usd))
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::NotFound("balance".to_string()));
}

#[tokio::test]
async fn correction_writes_a_history_row_and_stays_reconciled() {
    let (ledger, _db) = ledger_with_users(&["a", "b"]).await;
    ledger
        .record_expense(NewExpense::new(
            "a",
            "Books",
            Money::new(1000),
            Currency::Usd,
            split_with(&["b"]),
        ))
        .await
        .unwrap();

    let corrected = ledger
        .correct_balance("a", Scope::Personal, Money::new(0), "paid back in cash")
        .await
        .unwrap();
    assert_eq!(corrected.amount, Money::ZERO);
    assert_eq!(corrected.version, 2);

    let history = ledger
        .balance_history("a", Some(Scope::Personal), 10, 0)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].change_type, BalanceChangeType::Correction);
    assert_eq!(history[0].amount, Money::new(-500));
    assert_eq!(history[0].reference_id, None);
    assert_eq!(history[0].description, "paid back in cash");
    assert!(
        ledger
            .reconcile("a", Scope::Personal)
            .await
            .unwrap()
            .is_consistent()
    );

    // already at the target: nothing written
    let unchanged = ledger
        .correct_balance("a", Scope::Personal, Money::ZERO, "noop")
        .await
        .unwrap();
    assert_eq!(unchanged.version, 2);
    assert_eq!(ledger.balance_history("a", None, 10, 0).await.unwrap().len(), 2);

    assert!(matches!(
        ledger
            .correct_balance("a", Scope::Personal, Money::new(1), " ")
            .await,
        Err(LedgerError::Validation(_))
    ));
    assert_eq!(
        ledger
            .correct_balance("b", Scope::Group(uuid::Uuid::new_v4()), Money::new(1), "x")
            .await,
        Err(LedgerError::NotFound("balance".to_string()))
    );
}

#[tokio::test]
async fn reconcile_reports_writes_without_history() {
    let (ledger, db) = ledger_with_users(&["a"]).await;
    adjust(&db, "a", Currency::Usd, 250).await;

    let reconciliation = ledger.reconcile("a", Scope::Personal).await.unwrap();
    assert_eq!(reconciliation.balance, Money::new(250));
    assert_eq!(reconciliation.history_total, Money::ZERO);
    assert!(!reconciliation.is_consistent());

    let untouched = ledger.reconcile("a", Scope::Group(uuid::Uuid::new_v4())).await.unwrap();
    assert!(untouched.is_consistent());
}

#[tokio::test]
async fn group_balance_defaults_to_zero_in_group_currency() {
    let (ledger, _db) = ledger_with_users(&["a", "b"]).await;
    let group = ledger.create_group("Band", Currency::Gbp, "a").await.unwrap();
    ledger
        .add_group_member(group.id, "b", MemberRole::Member)
        .await
        .unwrap();

    let balance = ledger.user_balance_in_group("b", group.id).await.unwrap();
    assert_eq!(balance.amount, Money::ZERO);
    assert_eq!(balance.currency, Currency::Gbp);
    assert_eq!(balance.version, 0);
    assert_eq!(balance.scope, Scope::Group(group.id));

    assert_eq!(
        ledger
            .user_balance_in_group("b", uuid::Uuid::new_v4())
            .await
            .unwrap_err(),
        LedgerError::NotFound("group".to_string())
    );
}

#[tokio::test]
async fn summary_totals_per_currency() {
    let (ledger, _db) = ledger_with_users(&["a", "b"]).await;
    let group = ledger.create_group("Ski", Currency::Eur, "a").await.unwrap();
    ledger
        .add_group_member(group.id, "b", MemberRole::Member)
        .await
        .unwrap();

    ledger
        .record_expense(NewExpense::new(
            "a",
            "Snacks",
            Money::new(1000),
            Currency::Usd,
            split_with(&["b"]),
        ))
        .await
        .unwrap();
    ledger
        .record_expense(
            NewExpense::new("a", "Pass", Money::new(3000), Currency::Eur, split_with(&["b"]))
                .group_id(group.id),
        )
        .await
        .unwrap();

    let summary = ledger.user_balance_summary("a").await.unwrap();
    assert_eq!(summary.balances.len(), 2);
    assert_eq!(summary.totals.get(&Currency::Usd), Some(&Money::new(500)));
    assert_eq!(summary.totals.get(&Currency::Eur), Some(&Money::new(1500)));
    assert!(summary.last_updated.is_some());

    let group_balances = ledger.group_balances(group.id).await.unwrap();
    let users: Vec<&str> = group_balances.iter().map(|b| b.user_id.as_str()).collect();
    assert_eq!(users, vec!["a", "b"]);
    assert_eq!(
        group_balances.iter().map(|b| b.amount).sum::<Money>(),
        Money::ZERO
    );

    assert_eq!(
        ledger.user_balance_summary("ghost").await.unwrap_err(),
        LedgerError::UnknownUser("ghost".to_string())
    );
}

#[tokio::test]
async fn history_is_newest_first_and_filtered_by_scope() {
    let (ledger, _db) = ledger_with_users(&["a", "b"]).await;
    let group = ledger.create_group("Club", Currency::Usd, "a").await.unwrap();
    ledger
        .add_group_member(group.id, "b", MemberRole::Member)
        .await
        .unwrap();

    for (title, group_id) in [("one", None), ("two", Some(group.id)), ("three", None)] {
        let mut cmd = NewExpense::new("a", title, Money::new(200), Currency::Usd, split_with(&["b"]));
        if let Some(group_id) = group_id {
            cmd = cmd.group_id(group_id);
        }
        ledger.record_expense(cmd).await.unwrap();
    }

    let all = ledger.balance_history("b", None, 10, 0).await.unwrap();
    let descriptions: Vec<&str> = all.iter().map(|h| h.description.as_str()).collect();
    assert_eq!(
        descriptions,
        vec!["expense: three", "expense: two", "expense: one"]
    );

    let personal = ledger
        .balance_history("b", Some(Scope::Personal), 10, 0)
        .await
        .unwrap();
    assert_eq!(personal.len(), 2);
    assert!(personal.iter().all(|h| h.scope == Scope::Personal));

    let page = ledger.balance_history("b", None, 1, 1).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].description, "expense: two");
}
