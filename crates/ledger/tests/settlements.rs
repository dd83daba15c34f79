use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

use ledger::{
    BalanceChangeType, Currency, Ledger, LedgerError, MemberRole, Money, NewSettlement, Scope,
    SettlementMethod, SettlementStatus,
};
use migration::MigratorTrait;

async fn ledger_with_users(users: &[&str]) -> (Ledger, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let ledger = Ledger::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    for user in users {
        ledger.register_user(user, user, None).await.unwrap();
    }
    (ledger, db)
}

fn fifty() -> Money {
    Money::new(5000)
}

#[tokio::test]
async fn completing_moves_both_balances_once() {
    let (ledger, _db) = ledger_with_users(&["x", "y"]).await;
    let settlement = ledger
        .create_settlement(
            NewSettlement::new("x", "y", fifty(), Currency::Usd)
                .method(SettlementMethod::BankTransfer)
                .description("rent share"),
        )
        .await
        .unwrap();
    assert_eq!(settlement.status, SettlementStatus::Pending);
    assert!(ledger.balance("x", Scope::Personal).await.is_err());

    let completed = ledger
        .complete_settlement(settlement.id, "x", Some("  TX-42 "))
        .await
        .unwrap();
    assert_eq!(completed.status, SettlementStatus::Completed);
    assert_eq!(completed.transaction_ref.as_deref(), Some("TX-42"));
    assert!(completed.completed_at.is_some());

    let x = ledger.balance("x", Scope::Personal).await.unwrap();
    let y = ledger.balance("y", Scope::Personal).await.unwrap();
    assert_eq!(x.amount, Money::new(5000));
    assert_eq!(y.amount, Money::new(-5000));

    for (user, amount) in [("x", 5000), ("y", -5000)] {
        let history = ledger.balance_history(user, None, 10, 0).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].amount, Money::new(amount));
        assert_eq!(history[0].change_type, BalanceChangeType::Settlement);
        assert_eq!(history[0].reference_id, Some(settlement.id));
    }

    let stored = ledger.get_settlement(settlement.id, "y").await.unwrap();
    assert_eq!(stored.status, SettlementStatus::Completed);
    assert_eq!(stored.method, SettlementMethod::BankTransfer);
    assert_eq!(stored.transaction_ref.as_deref(), Some("TX-42"));
}

#[tokio::test]
async fn second_completion_is_rejected_without_mutation() {
    let (ledger, _db) = ledger_with_users(&["x", "y"]).await;
    let settlement = ledger
        .create_settlement(NewSettlement::new("x", "y", fifty(), Currency::Usd))
        .await
        .unwrap();

    ledger
        .complete_settlement(settlement.id, "x", None)
        .await
        .unwrap();
    let err = ledger
        .complete_settlement(settlement.id, "x", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyFinalized(_)));

    let x = ledger.balance("x", Scope::Personal).await.unwrap();
    assert_eq!(x.amount, Money::new(5000));
    assert_eq!(x.version, 1);
    assert_eq!(ledger.balance_history("y", None, 10, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn racing_completions_apply_exactly_once() {
    let (ledger, _db) = ledger_with_users(&["x", "y"]).await;
    let settlement = ledger
        .create_settlement(NewSettlement::new("x", "y", fifty(), Currency::Usd))
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        ledger.complete_settlement(settlement.id, "x", None),
        ledger.complete_settlement(settlement.id, "x", None),
    );
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Err(LedgerError::AlreadyFinalized(_))))
    );

    let y = ledger.balance("y", Scope::Personal).await.unwrap();
    assert_eq!(y.amount, Money::new(-5000));
    assert!(
        ledger
            .reconcile("y", Scope::Personal)
            .await
            .unwrap()
            .is_consistent()
    );
}

#[tokio::test]
async fn only_the_payer_completes_and_only_parties_see_it() {
    let (ledger, _db) = ledger_with_users(&["x", "y", "z"]).await;
    let settlement = ledger
        .create_settlement(NewSettlement::new("x", "y", fifty(), Currency::Usd))
        .await
        .unwrap();

    assert!(matches!(
        ledger.complete_settlement(settlement.id, "y", None).await,
        Err(LedgerError::Forbidden(_))
    ));
    assert_eq!(
        ledger.complete_settlement(settlement.id, "z", None).await,
        Err(LedgerError::NotFound("settlement".to_string()))
    );
    assert_eq!(
        ledger.cancel_settlement(settlement.id, "z").await,
        Err(LedgerError::NotFound("settlement".to_string()))
    );
    assert!(ledger.get_settlement(settlement.id, "z").await.is_err());
    assert!(ledger.list_settlements_by_user("z", 10, 0).await.unwrap().is_empty());

    let still = ledger.get_settlement(settlement.id, "x").await.unwrap();
    assert_eq!(still.status, SettlementStatus::Pending);
}

#[tokio::test]
async fn cancelled_settlement_cannot_complete() {
    let (ledger, _db) = ledger_with_users(&["x", "y"]).await;
    let settlement = ledger
        .create_settlement(NewSettlement::new("x", "y", fifty(), Currency::Usd))
        .await
        .unwrap();

    let cancelled = ledger.cancel_settlement(settlement.id, "y").await.unwrap();
    assert_eq!(cancelled.status, SettlementStatus::Cancelled);

    assert!(matches!(
        ledger.complete_settlement(settlement.id, "x", None).await,
        Err(LedgerError::AlreadyFinalized(_))
    ));
    assert!(matches!(
        ledger.cancel_settlement(settlement.id, "x").await,
        Err(LedgerError::AlreadyFinalized(_))
    ));
    assert!(ledger.balance("x", Scope::Personal).await.is_err());
    assert!(ledger.balance_history("x", None, 10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn failing_records_the_reason_and_leaves_balances() {
    let (ledger, _db) = ledger_with_users(&["x", "y"]).await;
    let settlement = ledger
        .create_settlement(NewSettlement::new("x", "y", fifty(), Currency::Usd))
        .await
        .unwrap();
    let other = ledger
        .create_settlement(NewSettlement::new("y", "x", Money::new(100), Currency::Usd))
        .await
        .unwrap();

    assert!(matches!(
        ledger.fail_settlement(settlement.id, "   ").await,
        Err(LedgerError::Validation(_))
    ));

    let failed = ledger
        .fail_settlement(settlement.id, "card declined")
        .await
        .unwrap();
    assert_eq!(failed.status, SettlementStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("card declined"));
    assert!(failed.failed_at.is_some());

    let stored = ledger.get_settlement(settlement.id, "x").await.unwrap();
    assert_eq!(stored.failure_reason.as_deref(), Some("card declined"));

    let pending = ledger.pending_settlements("x").await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, other.id);
    assert!(ledger.balance("x", Scope::Personal).await.is_err());

    assert_eq!(
        ledger.fail_settlement(Uuid::new_v4(), "lost").await,
        Err(LedgerError::NotFound("settlement".to_string()))
    );
}

#[tokio::test]
async fn invalid_settlements_are_rejected() {
    let (ledger, _db) = ledger_with_users(&["x", "y"]).await;

    assert!(matches!(
        ledger
            .create_settlement(NewSettlement::new("x", "x", fifty(), Currency::Usd))
            .await,
        Err(LedgerError::Validation(_))
    ));
    assert!(matches!(
        ledger
            .create_settlement(NewSettlement::new("x", "y", Money::ZERO, Currency::Usd))
            .await,
        Err(LedgerError::Validation(_))
    ));
    assert_eq!(
        ledger
            .create_settlement(NewSettlement::new("x", "ghost", fifty(), Currency::Usd))
            .await,
        Err(LedgerError::UnknownUser("ghost".to_string()))
    );
}

#[tokio::test]
async fn group_settlement_checks_membership_and_currency() {
    let (ledger, _db) = ledger_with_users(&["x", "y", "z"]).await;
    let group = ledger.create_group("Trip", Currency::Eur, "x").await.unwrap();
    ledger
        .add_group_member(group.id, "y", MemberRole::Member)
        .await
        .unwrap();

    assert!(matches!(
        ledger
            .create_settlement(
                NewSettlement::new("x", "y", fifty(), Currency::Usd).group_id(group.id)
            )
            .await,
        Err(LedgerError::CurrencyMismatch(_))
    ));
    assert_eq!(
        ledger
            .create_settlement(
                NewSettlement::new("x", "z", fifty(), Currency::Eur).group_id(group.id)
            )
            .await,
        Err(LedgerError::NotAMember {
            user_id: "z".to_string(),
            group_id: group.id.to_string(),
        })
    );

    let settlement = ledger
        .create_settlement(NewSettlement::new("y", "x", fifty(), Currency::Eur).group_id(group.id))
        .await
        .unwrap();
    ledger
        .complete_settlement(settlement.id, "y", None)
        .await
        .unwrap();

    let scope = Scope::Group(group.id);
    assert_eq!(ledger.balance("y", scope).await.unwrap().amount, fifty());
    assert_eq!(ledger.balance("x", scope).await.unwrap().amount, -fifty());
    assert!(ledger.balance("x", Scope::Personal).await.is_err());
    assert_eq!(
        ledger
            .list_settlements_by_group(group.id, 10, 0)
            .await
            .unwrap()
            .len(),
        1
    );
}
