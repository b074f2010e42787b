use thiserror::Error;

use super::parser::{Config, ExpiryMode, StorageBackend};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.token.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "bot.token cannot be empty".to_string(),
            ));
        }

        if self.bot.command_prefix.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "bot.command_prefix cannot be empty".to_string(),
            ));
        }

        if self.database.backend == StorageBackend::Sqlite && self.database.filename.is_none() {
            return Err(ConfigError::InvalidConfig(
                "database.filename is required for the sqlite backend".to_string(),
            ));
        }

        let marriage = &self.marriage;
        if marriage.active_days == 0 {
            return Err(ConfigError::InvalidConfig(
                "marriage.active_days must be at least 1".to_string(),
            ));
        }

        if marriage.member_retention_days == 0 {
            return Err(ConfigError::InvalidConfig(
                "marriage.member_retention_days must be at least 1".to_string(),
            ));
        }

        if marriage.expiry == ExpiryMode::Rolling && marriage.rolling_hours == 0 {
            return Err(ConfigError::InvalidConfig(
                "marriage.rolling_hours must be at least 1 with rolling expiry".to_string(),
            ));
        }

        if let Some(offset) = marriage.utc_offset_minutes
            && offset.abs() >= 24 * 60
        {
            return Err(ConfigError::InvalidConfig(
                "marriage.utc_offset_minutes must be within one day".to_string(),
            ));
        }

        if marriage.proposal_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "marriage.proposal_timeout_secs must be at least 1".to_string(),
            ));
        }

        let accept = marriage.accept_token.trim();
        let decline = marriage.decline_token.trim();
        if accept.is_empty() || decline.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "marriage.accept_token and marriage.decline_token cannot be empty".to_string(),
            ));
        }
        if accept.eq_ignore_ascii_case(decline) {
            return Err(ConfigError::InvalidConfig(
                "marriage.accept_token and marriage.decline_token must differ".to_string(),
            ));
        }

        Ok(())
    }
}
