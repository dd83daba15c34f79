//! Initial schema.
//!
//! - `users`: people the ledger can reference
//! - `groups` / `group_members`: shared scopes and their members
//! - `expenses` / `expense_entries`: recorded expenses with payers and shares
//! - `balances`: one row per `(user_id, scope)`, guarded by `version`
//! - `balance_history`: append-only audit trail of every balance delta
//! - `settlements`: payments between two users

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Users {
    Table,
    UserId,
    Name,
    Email,
    CreatedAt,
}

#[derive(Iden)]
enum Groups {
    Table,
    Id,
    Name,
    Currency,
    CreatedBy,
    CreatedAt,
    IsActive,
}

#[derive(Iden)]
enum GroupMembers {
    Table,
    GroupId,
    UserId,
    Role,
    JoinedAt,
    IsActive,
}

#[derive(Iden)]
enum Expenses {
    Table,
    Id,
    GroupId,
    CreatorId,
    Title,
    AmountMinor,
    Currency,
    SplitKind,
    IsDeleted,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum ExpenseEntries {
    Table,
    Id,
    ExpenseId,
    Kind,
    Position,
    UserId,
    AmountMinor,
}

#[derive(Iden)]
enum Balances {
    Table,
    UserId,
    Scope,
    AmountMinor,
    Currency,
    Version,
    UpdatedAt,
}

#[derive(Iden)]
enum BalanceHistory {
    Table,
    Id,
    UserId,
    Scope,
    AmountMinor,
    Currency,
    ChangeType,
    ReferenceId,
    Description,
    CreatedAt,
}

#[derive(Iden)]
enum Settlements {
    Table,
    Id,
    FromUserId,
    ToUserId,
    GroupId,
    AmountMinor,
    Currency,
    Method,
    Description,
    Status,
    TransactionRef,
    FailureReason,
    CreatedAt,
    UpdatedAt,
    CompletedAt,
    FailedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Users
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::UserId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Name).string().not_null())
                    .col(ColumnDef::new(Users::Email).string())
                    .col(ColumnDef::new(Users::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Groups and members
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Groups::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Groups::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Groups::Name).string().not_null())
                    .col(
                        ColumnDef::new(Groups::Currency)
                            .string()
                            .not_null()
                            .default("USD"),
                    )
                    .col(ColumnDef::new(Groups::CreatedBy).string().not_null())
                    .col(ColumnDef::new(Groups::CreatedAt).timestamp().not_null())
                    .col(
                        ColumnDef::new(Groups::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-groups-created_by")
                            .from(Groups::Table, Groups::CreatedBy)
                            .to(Users::Table, Users::UserId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(GroupMembers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(GroupMembers::GroupId).string().not_null())
                    .col(ColumnDef::new(GroupMembers::UserId).string().not_null())
                    .col(ColumnDef::new(GroupMembers::Role).string().not_null())
                    .col(ColumnDef::new(GroupMembers::JoinedAt).timestamp().not_null())
                    .col(ColumnDef::new(GroupMembers::IsActive).boolean().not_null())
                    .primary_key(
                        Index::create()
                            .col(GroupMembers::GroupId)
                            .col(GroupMembers::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-group_members-group_id")
                            .from(GroupMembers::Table, GroupMembers::GroupId)
                            .to(Groups::Table, Groups::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-group_members-user_id")
                            .from(GroupMembers::Table, GroupMembers::UserId)
                            .to(Users::Table, Users::UserId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-group_members-user_id")
                    .table(GroupMembers::Table)
                    .col(GroupMembers::UserId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Expenses
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Expenses::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Expenses::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Expenses::GroupId).string())
                    .col(ColumnDef::new(Expenses::CreatorId).string().not_null())
                    .col(ColumnDef::new(Expenses::Title).string().not_null())
                    .col(ColumnDef::new(Expenses::AmountMinor).big_integer().not_null())
                    .col(ColumnDef::new(Expenses::Currency).string().not_null())
                    .col(ColumnDef::new(Expenses::SplitKind).string().not_null())
                    .col(
                        ColumnDef::new(Expenses::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Expenses::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Expenses::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-expenses-group_id")
                            .from(Expenses::Table, Expenses::GroupId)
                            .to(Groups::Table, Groups::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-expenses-creator_id")
                            .from(Expenses::Table, Expenses::CreatorId)
                            .to(Users::Table, Users::UserId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-expenses-group_id-created_at")
                    .table(Expenses::Table)
                    .col(Expenses::GroupId)
                    .col(Expenses::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ExpenseEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExpenseEntries::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ExpenseEntries::ExpenseId).string().not_null())
                    .col(ColumnDef::new(ExpenseEntries::Kind).string().not_null())
                    .col(ColumnDef::new(ExpenseEntries::Position).integer().not_null())
                    .col(ColumnDef::new(ExpenseEntries::UserId).string().not_null())
                    .col(
                        ColumnDef::new(ExpenseEntries::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-expense_entries-expense_id")
                            .from(ExpenseEntries::Table, ExpenseEntries::ExpenseId)
                            .to(Expenses::Table, Expenses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-expense_entries-expense_id")
                    .table(ExpenseEntries::Table)
                    .col(ExpenseEntries::ExpenseId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-expense_entries-user_id")
                    .table(ExpenseEntries::Table)
                    .col(ExpenseEntries::UserId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Balances
        // ───────────────────────────────────────────────────────────────────
        // The primary key doubles as the UNIQUE(user_id, scope) target of the
        // increment upsert. `scope` is never NULL: "personal" or a group id.
        manager
            .create_table(
                Table::create()
                    .table(Balances::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Balances::UserId).string().not_null())
                    .col(ColumnDef::new(Balances::Scope).string().not_null())
                    .col(ColumnDef::new(Balances::AmountMinor).big_integer().not_null())
                    .col(ColumnDef::new(Balances::Currency).string().not_null())
                    .col(
                        ColumnDef::new(Balances::Version)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(Balances::UpdatedAt).timestamp().not_null())
                    .primary_key(
                        Index::create()
                            .col(Balances::UserId)
                            .col(Balances::Scope),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-balances-user_id")
                            .from(Balances::Table, Balances::UserId)
                            .to(Users::Table, Users::UserId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-balances-scope")
                    .table(Balances::Table)
                    .col(Balances::Scope)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Balance history
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(BalanceHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BalanceHistory::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BalanceHistory::UserId).string().not_null())
                    .col(ColumnDef::new(BalanceHistory::Scope).string().not_null())
                    .col(
                        ColumnDef::new(BalanceHistory::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BalanceHistory::Currency).string().not_null())
                    .col(ColumnDef::new(BalanceHistory::ChangeType).string().not_null())
                    .col(ColumnDef::new(BalanceHistory::ReferenceId).string())
                    .col(ColumnDef::new(BalanceHistory::Description).string().not_null())
                    .col(
                        ColumnDef::new(BalanceHistory::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-balance_history-user_id-scope-created_at")
                    .table(BalanceHistory::Table)
                    .col(BalanceHistory::UserId)
                    .col(BalanceHistory::Scope)
                    .col(BalanceHistory::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-balance_history-reference_id")
                    .table(BalanceHistory::Table)
                    .col(BalanceHistory::ReferenceId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 6. Settlements
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Settlements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Settlements::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Settlements::FromUserId).string().not_null())
                    .col(ColumnDef::new(Settlements::ToUserId).string().not_null())
                    .col(ColumnDef::new(Settlements::GroupId).string())
                    .col(
                        ColumnDef::new(Settlements::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Settlements::Currency).string().not_null())
                    .col(ColumnDef::new(Settlements::Method).string().not_null())
                    .col(ColumnDef::new(Settlements::Description).string())
                    .col(ColumnDef::new(Settlements::Status).string().not_null())
                    .col(ColumnDef::new(Settlements::TransactionRef).string())
                    .col(ColumnDef::new(Settlements::FailureReason).string())
                    .col(ColumnDef::new(Settlements::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Settlements::UpdatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Settlements::CompletedAt).timestamp())
                    .col(ColumnDef::new(Settlements::FailedAt).timestamp())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-settlements-from_user_id")
                            .from(Settlements::Table, Settlements::FromUserId)
                            .to(Users::Table, Users::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-settlements-to_user_id")
                            .from(Settlements::Table, Settlements::ToUserId)
                            .to(Users::Table, Users::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-settlements-group_id")
                            .from(Settlements::Table, Settlements::GroupId)
                            .to(Groups::Table, Groups::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-settlements-from_user_id-status")
                    .table(Settlements::Table)
                    .col(Settlements::FromUserId)
                    .col(Settlements::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-settlements-to_user_id-status")
                    .table(Settlements::Table)
                    .col(Settlements::ToUserId)
                    .col(Settlements::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop in reverse order of creation (respecting FK dependencies)
        manager
            .drop_table(Table::drop().table(Settlements::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BalanceHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Balances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ExpenseEntries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Expenses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GroupMembers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Groups::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
