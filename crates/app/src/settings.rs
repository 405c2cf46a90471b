//! Handles settings for the application. Configuration is read from a TOML
//! file (default `settings.toml`) and overridden by `TALLY__*` environment
//! variables, e.g. `TALLY__SCHEDULER__INTERVAL_SECS=30`.
//!
//! See `settings.toml` for an example.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    /// Log level for the `tally` and `engine` targets.
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    #[default]
    Memory,
    /// Path of the SQLite file, created when missing.
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Scheduler {
    pub enabled: bool,
    /// Seconds between two processing passes.
    pub interval_secs: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub scheduler: Scheduler,
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("TALLY").separator("__"))
            .build()?
            .try_deserialize()?;

        if settings.scheduler.interval_secs == 0 {
            return Err(ConfigError::Message(
                "scheduler.interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_file() {
        let settings = Settings::new("does-not-exist").unwrap();
        assert_eq!(settings.app.level, "info");
        assert_eq!(settings.database, Database::Memory);
        assert!(settings.scheduler.enabled);
        assert_eq!(settings.scheduler.interval_secs, 60);
    }

    #[test]
    fn sqlite_database_reads_from_a_table() {
        let settings: Settings = Config::builder()
            .add_source(config::File::from_str(
                "[database]\nsqlite = \"tally.db\"\n\n[scheduler]\ninterval_secs = 5\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(settings.database, Database::Sqlite("tally.db".to_string()));
        assert_eq!(settings.scheduler.interval_secs, 5);
    }
}
