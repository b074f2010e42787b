use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub bot: BotConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub marriage: MarriageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    #[serde(default = "default_use_privileged_intents")]
    pub use_privileged_intents: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            filename: None,
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryMode {
    /// Pairings end at the next local midnight.
    #[default]
    Midnight,
    /// Pairings last `rolling_hours` from the moment they are made.
    Rolling,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarriageConfig {
    /// User ids that are never drawn as a partner.
    #[serde(default)]
    pub excludes: Vec<String>,
    /// Keep redrawing while the drawn candidate already has a partner.
    #[serde(default)]
    pub avoid_ntr: bool,
    /// Only members seen talking within `active_days` are drawn.
    #[serde(default)]
    pub only_active: bool,
    #[serde(default = "default_active_days")]
    pub active_days: u64,
    #[serde(default = "default_member_retention_days")]
    pub member_retention_days: u64,
    #[serde(default)]
    pub expiry: ExpiryMode,
    #[serde(default = "default_rolling_hours")]
    pub rolling_hours: u64,
    /// Offset used for the midnight deadline. The host's local zone when absent.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    /// Zero means unlimited.
    #[serde(default)]
    pub max_change_count: u32,
    /// Lets forced pairings and proposals replace existing partners.
    #[serde(default)]
    pub allow_overwrite: bool,
    #[serde(default = "default_proposal_timeout_secs")]
    pub proposal_timeout_secs: u64,
    #[serde(default = "default_accept_token")]
    pub accept_token: String,
    #[serde(default = "default_decline_token")]
    pub decline_token: String,
    #[serde(default)]
    pub force_marry: bool,
    #[serde(default)]
    pub propose: bool,
    #[serde(default)]
    pub divorce: bool,
    #[serde(default)]
    pub change_partner: bool,
    #[serde(default = "default_query")]
    pub query: bool,
}

impl Default for MarriageConfig {
    fn default() -> Self {
        Self {
            excludes: Vec::new(),
            avoid_ntr: false,
            only_active: false,
            active_days: default_active_days(),
            member_retention_days: default_member_retention_days(),
            expiry: ExpiryMode::default(),
            rolling_hours: default_rolling_hours(),
            utc_offset_minutes: None,
            max_change_count: 0,
            allow_overwrite: false,
            proposal_timeout_secs: default_proposal_timeout_secs(),
            accept_token: default_accept_token(),
            decline_token: default_decline_token(),
            force_marry: false,
            propose: false,
            divorce: false,
            change_partner: false,
            query: default_query(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("WAIFU_BOT_TOKEN") {
            self.bot.token = value;
        }
        if let Ok(value) = std::env::var("WAIFU_DATABASE_FILENAME") {
            self.database.filename = Some(value);
        }
    }
}

fn default_command_prefix() -> String {
    "!".to_string()
}

fn default_use_privileged_intents() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sweep_interval_secs() -> u64 {
    600
}

fn default_active_days() -> u64 {
    7
}

fn default_member_retention_days() -> u64 {
    3
}

fn default_rolling_hours() -> u64 {
    24
}

fn default_proposal_timeout_secs() -> u64 {
    90
}

fn default_accept_token() -> String {
    "accept".to_string()
}

fn default_decline_token() -> String {
    "decline".to_string()
}

fn default_query() -> bool {
    true
}
