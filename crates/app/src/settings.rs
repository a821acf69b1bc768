//! Handles settings for the application.
//!
//! Settings are read from a TOML file (`config/settings.toml` unless
//! `--config` says otherwise) and then from `QUICKLEDGER__*` environment
//! variables, e.g. `QUICKLEDGER__TELEGRAM__TOKEN`. See
//! `config/settings.example.toml`.
use std::path::Path;

use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use engine::EngineSettings;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
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

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    #[default]
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct Telegram {
    pub token: String,
    /// Telegram user ids allowed to use the bot; empty allows everyone.
    #[serde(default)]
    pub allowed_users: Vec<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    #[serde(default)]
    pub database: Database,
    pub telegram: Option<Telegram>,
    #[serde(default)]
    pub engine: EngineSettings,
}

impl Settings {
    pub fn new(path: &Path) -> Result<Self, ConfigError> {
        with_environment(Config::builder().add_source(File::from(path).required(false)))
            .build()?
            .try_deserialize()
    }
}

fn with_environment(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("QUICKLEDGER")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("telegram.allowed_users"),
    )
}
