use std::error::Error;

use clap::Parser;
use ledger::{ExpenseEdit, Ledger, NewExpense, NewSettlement, Scope};
use migration::{Migrator, MigratorTrait};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cli::{BalanceCommand, Cli, Command, ExpenseCommand, GroupCommand, SettleCommand, UserCommand};
use settings::Settings;

mod cli;
mod settings;

type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tally={level},ledger={level}",
            level = settings.app.level
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let database_url = cli
        .database_url
        .clone()
        .unwrap_or_else(|| settings.database.url());
    let db = connect_db(&database_url).await?;
    let ledger = Ledger::builder()
        .database(db)
        .max_cas_retries(settings.ledger.max_cas_retries)
        .build()
        .await?;

    let out = Output { json: cli.json };
    match cli.command {
        Command::User(command) => run_user(&ledger, &out, command).await,
        Command::Group(command) => run_group(&ledger, &out, command).await,
        Command::Expense(command) => run_expense(&ledger, &out, command).await,
        Command::Settle(command) => run_settle(&ledger, &out, command).await,
        Command::Balance(command) => run_balance(&ledger, &out, command).await,
    }
}

async fn connect_db(database_url: &str) -> CliResult<sea_orm::DatabaseConnection> {
    let db = sea_orm::Database::connect(database_url).await?;
    Migrator::up(&db, None).await?;
    tracing::debug!(database_url, "database ready");
    Ok(db)
}

struct Output {
    json: bool,
}

impl Output {
    /// Prints `value` as JSON, or `line` for humans.
    fn print<T: Serialize>(&self, value: &T, line: impl FnOnce(&T) -> String) -> CliResult<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", line(value));
        }
        Ok(())
    }
}

async fn run_user(ledger: &Ledger, out: &Output, command: UserCommand) -> CliResult<()> {
    match command {
        UserCommand::Add { id, name, email } => {
            let user = ledger.register_user(&id, &name, email.as_deref()).await?;
            out.print(&user, |u| format!("created user: {}", u.user_id))
        }
        UserCommand::Show { id } => {
            let user = ledger.user(&id).await?;
            out.print(&user, |u| {
                format!("{} ({})", u.user_id, u.email.as_deref().unwrap_or(&u.name))
            })
        }
    }
}

async fn run_group(ledger: &Ledger, out: &Output, command: GroupCommand) -> CliResult<()> {
    match command {
        GroupCommand::Create {
            name,
            currency,
            creator,
        } => {
            let group = ledger.create_group(&name, currency, &creator).await?;
            out.print(&group, |g| format!("created group {} ({}): {}", g.name, g.currency, g.id))
        }
        GroupCommand::AddMember { group, user, role } => {
            let member = ledger.add_group_member(group, &user, role).await?;
            out.print(&member, |m| {
                format!("added {} as {}", m.user_id, m.role.as_str())
            })
        }
        GroupCommand::RemoveMember { group, user } => {
            ledger.remove_group_member(group, &user).await?;
            out.print(&user, |u| format!("removed {u}"))
        }
        GroupCommand::Members { group } => {
            let members = ledger.group_members(group).await?;
            out.print(&members, |members| {
                members
                    .iter()
                    .map(|m| format!("{}\t{}", m.user_id, m.role.as_str()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
    }
}

async fn run_expense(ledger: &Ledger, out: &Output, command: ExpenseCommand) -> CliResult<()> {
    match command {
        ExpenseCommand::Add(args) => {
            let mut cmd = NewExpense::new(
                args.creator,
                args.title,
                args.amount,
                args.currency,
                args.split,
            );
            if let Some(group) = args.group {
                cmd = cmd.group_id(group);
            }
            if !args.payers.is_empty() {
                cmd = cmd.payers(args.payers);
            }

            let expense = ledger.record_expense(cmd).await?;
            out.print(&expense, |e| {
                let shares = e
                    .shares
                    .iter()
                    .map(|s| format!("{}={}", s.user_id, s.amount))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("recorded expense {}: {} {} [{shares}]", e.id, e.amount, e.currency)
            })
        }
        ExpenseCommand::Show { id, viewer } => {
            let expense = ledger.get_expense(id, &viewer).await?;
            out.print(&expense, |e| {
                format!(
                    "{} {} {} {} ({}, by {})",
                    e.id,
                    e.title,
                    e.amount,
                    e.currency,
                    e.split_kind.as_str(),
                    e.creator_id
                )
            })
        }
        ExpenseCommand::List { user, group, page } => {
            let expenses = match (user, group) {
                (_, Some(group)) => {
                    ledger
                        .list_expenses_by_group(group, page.limit, page.offset)
                        .await?
                }
                (Some(user), None) => {
                    ledger
                        .list_expenses_by_user(&user, page.limit, page.offset)
                        .await?
                }
                (None, None) => Vec::new(),
            };
            out.print(&expenses, |expenses| {
                expenses
                    .iter()
                    .map(|e| format!("{}\t{}\t{} {}", e.id, e.title, e.amount, e.currency))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        ExpenseCommand::Edit {
            id,
            editor,
            title,
            amount,
            payers,
            split,
        } => {
            let mut edit = ExpenseEdit::new();
            if let Some(title) = title {
                edit = edit.title(title);
            }
            if let Some(amount) = amount {
                edit = edit.amount(amount);
            }
            if !payers.is_empty() {
                edit = edit.payers(payers);
            }
            if let Some(split) = split {
                edit = edit.split(split);
            }

            let expense = ledger.update_expense(id, &editor, edit).await?;
            out.print(&expense, |e| format!("updated expense {}: {} {}", e.id, e.amount, e.currency))
        }
        ExpenseCommand::Delete { id, editor } => {
            ledger.delete_expense(id, &editor).await?;
            out.print(&id, |id| format!("deleted expense {id}"))
        }
    }
}

async fn run_settle(ledger: &Ledger, out: &Output, command: SettleCommand) -> CliResult<()> {
    let describe = |s: &ledger::Settlement| {
        format!(
            "{} {} -> {} {} {} [{}]",
            s.id,
            s.from_user_id,
            s.to_user_id,
            s.amount,
            s.currency,
            s.status.as_str()
        )
    };

    match command {
        SettleCommand::Create {
            from,
            to,
            amount,
            currency,
            group,
            method,
            description,
        } => {
            let mut cmd = NewSettlement::new(from, to, amount, currency).method(method);
            if let Some(group) = group {
                cmd = cmd.group_id(group);
            }
            if let Some(description) = description {
                cmd = cmd.description(description);
            }
            let settlement = ledger.create_settlement(cmd).await?;
            out.print(&settlement, describe)
        }
        SettleCommand::Complete {
            id,
            actor,
            reference,
        } => {
            let settlement = ledger
                .complete_settlement(id, &actor, reference.as_deref())
                .await?;
            out.print(&settlement, describe)
        }
        SettleCommand::Cancel { id, actor } => {
            let settlement = ledger.cancel_settlement(id, &actor).await?;
            out.print(&settlement, describe)
        }
        SettleCommand::Fail { id, reason } => {
            let settlement = ledger.fail_settlement(id, &reason).await?;
            out.print(&settlement, describe)
        }
        SettleCommand::Pending { user } => {
            let settlements = ledger.pending_settlements(&user).await?;
            out.print(&settlements, |settlements| {
                settlements
                    .iter()
                    .map(describe)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
    }
}

async fn run_balance(ledger: &Ledger, out: &Output, command: BalanceCommand) -> CliResult<()> {
    let describe = |b: &ledger::Balance| {
        format!(
            "{}\t{}\t{} {}\tv{}",
            b.user_id, b.scope, b.amount, b.currency, b.version
        )
    };

    match command {
        BalanceCommand::Summary { user } => {
            let summary = ledger.user_balance_summary(&user).await?;
            out.print(&summary, |summary| {
                let mut lines: Vec<String> = summary.balances.iter().map(describe).collect();
                for (currency, total) in &summary.totals {
                    lines.push(format!("total\t{total} {currency}"));
                }
                lines.join("\n")
            })
        }
        BalanceCommand::Group { group } => {
            let balances = ledger.group_balances(group).await?;
            out.print(&balances, |balances| {
                balances.iter().map(describe).collect::<Vec<_>>().join("\n")
            })
        }
        BalanceCommand::History { user, scope, page } => {
            let history = ledger
                .balance_history(&user, scope.scope(), page.limit, page.offset)
                .await?;
            out.print(&history, |history| {
                history
                    .iter()
                    .map(|h| {
                        format!(
                            "{}\t{}\t{} {}\t{}\t{}",
                            h.created_at,
                            h.scope,
                            h.amount,
                            h.currency,
                            h.change_type.as_str(),
                            h.description
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        BalanceCommand::Reconcile { user, group } => {
            let reconciliation = ledger.reconcile(&user, Scope::from(group)).await?;
            out.print(&reconciliation, |r| {
                let verdict = if r.is_consistent() { "ok" } else { "MISMATCH" };
                format!("balance {} history {} {verdict}", r.balance, r.history_total)
            })
        }
        BalanceCommand::Correct {
            user,
            group,
            amount,
            reason,
        } => {
            let balance = ledger
                .correct_balance(&user, Scope::from(group), amount, &reason)
                .await?;
            out.print(&balance, describe)
        }
    }
}
