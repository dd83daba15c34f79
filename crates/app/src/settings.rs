//! Settings for the `tally` binary.
//!
//! Loaded from an optional TOML file (`settings.toml` unless `--config` says
//! otherwise), then from environment variables prefixed with `TALLY_`, using
//! `__` between nested keys (`TALLY_APP__LEVEL=debug`).
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "settings.toml";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Database {
    Memory,
    Sqlite(String),
}

impl Default for Database {
    fn default() -> Self {
        Database::Sqlite("tally.db".to_string())
    }
}

impl Database {
    pub fn url(&self) -> String {
        match self {
            Database::Memory => String::from("sqlite::memory:"),
            Database::Sqlite(path) => format!("sqlite:{path}?mode=rwc"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub max_cas_retries: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self { max_cas_retries: 3 }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub ledger: LedgerSettings,
}

impl Settings {
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name(path.unwrap_or(DEFAULT_CONFIG_PATH)).required(false))
            .add_source(
                Environment::with_prefix("TALLY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_a_local_sqlite_file() {
        let settings = Settings::default();
        assert_eq!(settings.app.level, "info");
        assert_eq!(settings.database.url(), "sqlite:tally.db?mode=rwc");
        assert_eq!(settings.ledger.max_cas_retries, 3);
    }

    #[test]
    fn memory_database_url() {
        assert_eq!(Database::Memory.url(), "sqlite::memory:");
    }
}
