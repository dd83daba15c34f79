use clap::{Args, Parser, Subcommand};
use ledger::{
    Currency, MemberRole, Money, Payer, SettlementMethod, Share, SplitDetail, SplitWeight,
};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Shared expenses, balances and settlements")]
pub struct Cli {
    /// Settings file (TOML). Defaults to `settings.toml`.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Database connection string, overriding the configured database.
    #[arg(long, global = true, env = "TALLY_DATABASE_URL")]
    pub database_url: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand)]
    User(UserCommand),
    #[command(subcommand)]
    Group(GroupCommand),
    #[command(subcommand)]
    Expense(ExpenseCommand),
    #[command(subcommand)]
    Settle(SettleCommand),
    #[command(subcommand)]
    Balance(BalanceCommand),
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
    },
    Show {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "USD")]
        currency: Currency,
        #[arg(long)]
        creator: String,
    },
    AddMember {
        #[arg(long)]
        group: Uuid,
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "member")]
        role: MemberRole,
    },
    RemoveMember {
        #[arg(long)]
        group: Uuid,
        #[arg(long)]
        user: String,
    },
    Members {
        #[arg(long)]
        group: Uuid,
    },
}

#[derive(Subcommand, Debug)]
pub enum ExpenseCommand {
    Add(ExpenseAddArgs),
    Show {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        viewer: String,
    },
    List {
        #[arg(long, conflicts_with = "group", required_unless_present = "group")]
        user: Option<String>,
        #[arg(long)]
        group: Option<Uuid>,
        #[command(flatten)]
        page: Page,
    },
    /// Changing the amount or the payers requires a new split.
    Edit {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        editor: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        amount: Option<Money>,
        #[arg(long = "payer", value_parser = parse_payer)]
        payers: Vec<Payer>,
        #[arg(long, value_parser = parse_split)]
        split: Option<SplitDetail>,
    },
    Delete {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        editor: String,
    },
}

#[derive(Args, Debug)]
pub struct ExpenseAddArgs {
    #[arg(long)]
    pub creator: String,
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub amount: Money,
    #[arg(long, default_value = "USD")]
    pub currency: Currency,
    #[arg(long)]
    pub group: Option<Uuid>,
    /// `user=amount`; repeatable. Defaults to the creator paying everything.
    #[arg(long = "payer", value_parser = parse_payer)]
    pub payers: Vec<Payer>,
    /// `equal:a,b`, `exact:a=10.00,b=5.00`, `percentage:a=60,b=40` or
    /// `shares:a=2,b=1`.
    #[arg(long, value_parser = parse_split)]
    pub split: SplitDetail,
}

#[derive(Subcommand, Debug)]
pub enum SettleCommand {
    Create {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: Money,
        #[arg(long, default_value = "USD")]
        currency: Currency,
        #[arg(long)]
        group: Option<Uuid>,
        #[arg(long, default_value = "cash")]
        method: SettlementMethod,
        #[arg(long)]
        description: Option<String>,
    },
    Complete {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        actor: String,
        /// External payment reference.
        #[arg(long)]
        reference: Option<String>,
    },
    Cancel {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        actor: String,
    },
    Fail {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        reason: String,
    },
    Pending {
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum BalanceCommand {
    Summary {
        #[arg(long)]
        user: String,
    },
    Group {
        #[arg(long)]
        group: Uuid,
    },
    History {
        #[arg(long)]
        user: String,
        #[command(flatten)]
        scope: ScopeArg,
        #[command(flatten)]
        page: Page,
    },
    Reconcile {
        #[arg(long)]
        user: String,
        /// Group scope; personal when omitted.
        #[arg(long)]
        group: Option<Uuid>,
    },
    Correct {
        #[arg(long)]
        user: String,
        /// Group scope; personal when omitted.
        #[arg(long)]
        group: Option<Uuid>,
        #[arg(long, allow_hyphen_values = true)]
        amount: Money,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Args, Debug)]
pub struct ScopeArg {
    #[arg(long, conflicts_with = "personal")]
    pub group: Option<Uuid>,
    #[arg(long)]
    pub personal: bool,
}

impl ScopeArg {
    pub fn scope(&self) -> Option<ledger::Scope> {
        match (self.group, self.personal) {
            (Some(group_id), _) => Some(ledger::Scope::Group(group_id)),
            (None, true) => Some(ledger::Scope::Personal),
            (None, false) => None,
        }
    }
}

#[derive(Args, Debug)]
pub struct Page {
    #[arg(long, default_value_t = 20)]
    pub limit: u64,
    #[arg(long, default_value_t = 0)]
    pub offset: u64,
}

/// Parses `user=amount`.
pub fn parse_payer(raw: &str) -> Result<Payer, String> {
    let (user, amount) = split_pair(raw)?;
    let amount = amount.parse::<Money>().map_err(|err| err.to_string())?;
    Ok(Payer::new(user, amount))
}

/// Parses `<kind>:<entries>`.
pub fn parse_split(raw: &str) -> Result<SplitDetail, String> {
    let (kind, entries) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected <kind>:<entries>, got {raw}"))?;
    let entries: Vec<&str> = entries
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect();

    match kind.trim() {
        "equal" => Ok(SplitDetail::Equal {
            participants: entries.into_iter().map(ToString::to_string).collect(),
        }),
        "exact" => {
            let amounts = entries
                .into_iter()
                .map(|entry| {
                    let (user, amount) = split_pair(entry)?;
                    let amount = amount.parse::<Money>().map_err(|err| err.to_string())?;
                    Ok(Share::new(user, amount))
                })
                .collect::<Result<Vec<_>, String>>()?;
            Ok(SplitDetail::Exact { amounts })
        }
        "percentage" => Ok(SplitDetail::Percentage {
            percentages: parse_weights(entries)?,
        }),
        "shares" => Ok(SplitDetail::Shares {
            weights: parse_weights(entries)?,
        }),
        other => Err(format!("unknown split kind: {other}")),
    }
}

fn parse_weights(entries: Vec<&str>) -> Result<Vec<SplitWeight>, String> {
    entries
        .into_iter()
        .map(|entry| {
            let (user, value) = split_pair(entry)?;
            let value = value
                .parse::<f64>()
                .map_err(|_| format!("invalid number: {value}"))?;
            Ok(SplitWeight::new(user, value))
        })
        .collect()
}

fn split_pair(raw: &str) -> Result<(&str, &str), String> {
    let (user, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected user=value, got {raw}"))?;
    let user = user.trim();
    if user.is_empty() {
        return Err(format!("missing user in {raw}"));
    }
    Ok((user, value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_split_kind() {
        assert_eq!(
            parse_split("equal:alice,bob").unwrap(),
            SplitDetail::Equal {
                participants: vec!["alice".to_string(), "bob".to_string()],
            }
        );
        assert_eq!(
            parse_split("exact:alice=10.00,bob=20").unwrap(),
            SplitDetail::Exact {
                amounts: vec![
                    Share::new("alice", Money::new(1000)),
                    Share::new("bob", Money::new(2000)),
                ],
            }
        );
        assert_eq!(
            parse_split("percentage:alice=60,bob=40").unwrap(),
            SplitDetail::Percentage {
                percentages: vec![SplitWeight::new("alice", 60.0), SplitWeight::new("bob", 40.0)],
            }
        );
        assert_eq!(
            parse_split("shares:alice=2,bob=1").unwrap().kind(),
            ledger::SplitKind::Shares
        );
    }

    #[test]
    fn rejects_malformed_splits() {
        assert!(parse_split("alice,bob").is_err());
        assert!(parse_split("random:alice").is_err());
        assert!(parse_split("exact:alice").is_err());
        assert!(parse_split("shares:alice=two").is_err());
    }

    #[test]
    fn parses_payers() {
        assert_eq!(
            parse_payer("alice=30.50").unwrap(),
            Payer::new("alice", Money::new(3050))
        );
        assert!(parse_payer("=30").is_err());
        assert!(parse_payer("alice").is_err());
    }
}
