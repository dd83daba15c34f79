use clap::{Parser, Subcommand};
use sea_orm::Database;
use sea_orm_migration::prelude::*;

/// Applies or inspects the ledger schema.
#[derive(Debug, Parser)]
#[command(name = "migration")]
struct Cli {
    /// Connection string of the ledger database.
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:./tally.db?mode=rwc")]
    database_url: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Apply pending migrations, all of them unless `--steps` is given.
    Up {
        #[arg(long)]
        steps: Option<u32>,
    },
    /// Roll back the last migration, or the last `--steps`.
    Down {
        #[arg(long, default_value_t = 1)]
        steps: u32,
    },
    /// Drop every table and apply all migrations again.
    Fresh,
    /// Roll back all migrations, then apply them again.
    Refresh,
    /// Roll back all migrations.
    Reset,
    /// List migrations and whether they are applied.
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let db = Database::connect(&cli.database_url).await?;

    match cli.command.unwrap_or(Command::Up { steps: None }) {
        Command::Up { steps } => migration::Migrator::up(&db, steps).await?,
        Command::Down { steps } => migration::Migrator::down(&db, Some(steps)).await?,
        Command::Fresh => migration::Migrator::fresh(&db).await?,
        Command::Refresh => migration::Migrator::refresh(&db).await?,
        Command::Reset => migration::Migrator::reset(&db).await?,
        Command::Status => migration::Migrator::status(&db).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(args: &[&str]) -> Option<Command> {
        Cli::try_parse_from(std::iter::once("migration").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn no_subcommand_means_apply_everything() {
        assert_eq!(command(&[]), None);
        assert_eq!(command(&["up"]), Some(Command::Up { steps: None }));
    }

    #[test]
    fn steps_are_read_for_up_and_down() {
        assert_eq!(command(&["up", "--steps", "2"]), Some(Command::Up { steps: Some(2) }));
        assert_eq!(command(&["down"]), Some(Command::Down { steps: 1 }));
        assert_eq!(command(&["down", "--steps", "3"]), Some(Command::Down { steps: 3 }));
    }

    #[test]
    fn database_url_flag_overrides_the_default() {
        let cli = Cli::try_parse_from(["migration", "--database-url", "sqlite::memory:", "status"])
            .unwrap();
        assert_eq!(cli.database_url, "sqlite::memory:");
        assert_eq!(cli.command, Some(Command::Status));
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert!(Cli::try_parse_from(["migration", "sideways"]).is_err());
        assert!(Cli::try_parse_from(["migration", "down", "--steps", "-1"]).is_err());
    }
}
