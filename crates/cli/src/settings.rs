//! Settings for the CLI.
//!
//! Layered lowest to highest: built-in defaults, the TOML file
//! (`config/tally.toml` unless `--config` points elsewhere), `TALLY_*`
//! environment variables, command line flags.

use serde::Deserialize;

use crate::{GlobalArgs, error::Result};

const DEFAULT_CONFIG_PATH: &str = "config/tally.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./tally.db?mode=rwc".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn load(args: &GlobalArgs) -> Result<Self> {
        let config_path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
        let mut settings: Settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(args.config.is_some()))
            .add_source(config::Environment::with_prefix("TALLY"))
            .build()?
            .try_deserialize()?;

        if let Some(database_url) = &args.database_url {
            settings.database_url = database_url.clone();
        }
        if let Some(log_level) = &args.log_level {
            settings.log_level = log_level.clone();
        }

        Ok(settings)
    }

    /// Filter directive for `tracing-subscriber`.
    pub fn log_filter(&self) -> String {
        format!(
            "tally={level},engine={level},migration={level}",
            level = self.log_level
        )
    }
}
