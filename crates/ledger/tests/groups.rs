use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

use ledger::{Currency, Ledger, LedgerError, MemberRole};
use migration::MigratorTrait;

async fn ledger_with_db() -> (Ledger, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let ledger = Ledger::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (ledger, db)
}

#[tokio::test]
async fn users_are_registered_once() {
    let (ledger, _db) = ledger_with_db().await;

    let user = ledger
        .register_user("u-1", " Alice ", Some("  "))
        .await
        .unwrap();
    assert_eq!(user.name, "Alice");
    assert_eq!(user.email, None);

    assert_eq!(
        ledger.register_user("u-1", "Other", None).await.unwrap_err(),
        LedgerError::AlreadyExists("user u-1".to_string())
    );
    assert_eq!(ledger.user("u-1").await.unwrap().name, "Alice");
    assert_eq!(
        ledger.user("u-2").await.unwrap_err(),
        LedgerError::UnknownUser("u-2".to_string())
    );
    assert_eq!(
        ledger.missing_users(&["u-1", "u-3", "u-2"]).await.unwrap(),
        vec!["u-3".to_string(), "u-2".to_string()]
    );
}

#[tokio::test]
async fn group_creator_is_the_first_admin() {
    let (ledger, _db) = ledger_with_db().await;
    ledger.register_user("alice", "Alice", None).await.unwrap();

    let group = ledger
        .create_group("Holiday", Currency::Chf, "alice")
        .await
        .unwrap();
    assert_eq!(ledger.group(group.id).await.unwrap().currency, Currency::Chf);

    let members = ledger.group_members(group.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, "alice");
    assert_eq!(members[0].role, MemberRole::Admin);

    assert_eq!(
        ledger
            .create_group("Nope", Currency::Usd, "nobody")
            .await
            .unwrap_err(),
        LedgerError::UnknownUser("nobody".to_string())
    );
    assert_eq!(
        ledger.group(Uuid::new_v4()).await.unwrap_err(),
        LedgerError::NotFound("group".to_string())
    );
}

#[tokio::test]
async fn removed_members_can_rejoin() {
    let (ledger, _db) = ledger_with_db().await;
    for user in ["alice", "bob"] {
        ledger.register_user(user, user, None).await.unwrap();
    }
    let group = ledger.create_group("Flat", Currency::Eur, "alice").await.unwrap();

    ledger
        .add_group_member(group.id, "bob", MemberRole::Member)
        .await
        .unwrap();
    assert!(matches!(
        ledger
            .add_group_member(group.id, "bob", MemberRole::Member)
            .await,
        Err(LedgerError::AlreadyExists(_))
    ));

    ledger.remove_group_member(group.id, "bob").await.unwrap();
    assert_eq!(
        ledger.non_members(group.id, &["alice", "bob"]).await.unwrap(),
        vec!["bob".to_string()]
    );
    assert!(matches!(
        ledger.remove_group_member(group.id, "bob").await,
        Err(LedgerError::NotFound(_))
    ));

    let rejoined = ledger
        .add_group_member(group.id, "bob", MemberRole::Admin)
        .await
        .unwrap();
    assert!(rejoined.is_active);
    assert_eq!(rejoined.role, MemberRole::Admin);
    assert_eq!(ledger.group_members(group.id).await.unwrap().len(), 2);
}
