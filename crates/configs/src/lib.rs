//! # Settings
//!
//! Layered configuration for the ranking engine:
//! built-in defaults, then `config/default.toml` (optional), then
//! `FORUM_RANKING__*` environment variables (`.env` is loaded first).
//!
//! `FORUM_RANKING__RESCORE__INTERVAL_SECS=600` overrides `rescore.interval_secs`.

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "FORUM_RANKING";
pub const DEFAULT_CONFIG_PATH: &str = "config/default";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {0}: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub time_decay_factor: f64,
    pub bias_hours: f64,
    pub frontpage_bonus: f64,
    pub curated_bonus: f64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            time_decay_factor: 1.15,
            bias_hours: 2.0,
            frontpage_bonus: 10.0,
            curated_bonus: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VotingSettings {
    pub self_vote_on_publish: bool,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for VotingSettings {
    fn default() -> Self {
        Self {
            self_vote_on_publish: true,
            max_attempts: 5,
            initial_backoff_ms: 5,
            max_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RescoreSettings {
    pub interval_secs: u64,
    pub inactivity_days: i64,
    pub max_documents: usize,
    pub time_budget_ms: u64,
    pub force_update: bool,
    /// Collection names: `posts`, `comments`
    pub collections: Vec<String>,
    /// Exit after a single pass instead of looping
    pub run_once: bool,
}

impl Default for RescoreSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            inactivity_days: 60,
            max_documents: 10_000,
            time_budget_ms: 30_000,
            force_update: false,
            collections: vec!["posts".into(), "comments".into()],
            run_once: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(deserialize_with = "deserialize_secret")]
    pub url: SecretString,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log: LogSettings,
    pub scoring: ScoringSettings,
    pub voting: VotingSettings,
    pub rescore: RescoreSettings,
    pub database: Option<DatabaseSettings>,
}

impl Settings {
    /// Loads `.env`, [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from(path: &str) -> Result<Self, SettingsError> {
        match dotenvy::dotenv() {
            Ok(file) => debug!(path = %file.display(), "loaded .env"),
            Err(err) if err.not_found() => {}
            Err(err) => debug!(error = %err, "ignoring unreadable .env"),
        }

        let config = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(environment())
            .build()?;
        Self::finish(config)
    }

    /// Parses TOML text with the environment layered on top.
    pub fn from_toml(toml: &str) -> Result<Self, SettingsError> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .add_source(environment())
            .build()?;
        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self, SettingsError> {
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.rescore.interval_secs == 0 {
            return Err(SettingsError::Invalid(
                "rescore.interval_secs",
                "must be greater than zero".into(),
            ));
        }
        if self.rescore.inactivity_days <= 0 {
            return Err(SettingsError::Invalid(
                "rescore.inactivity_days",
                "must be greater than zero".into(),
            ));
        }
        if self.voting.max_attempts == 0 {
            return Err(SettingsError::Invalid(
                "voting.max_attempts",
                "at least one attempt is required".into(),
            ));
        }
        if let Some(unknown) = self
            .rescore
            .collections
            .iter()
            .find(|c| !matches!(c.as_str(), "posts" | "comments"))
        {
            return Err(SettingsError::Invalid(
                "rescore.collections",
                format!("unknown collection '{unknown}'"),
            ));
        }
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("rescore.collections")
}
