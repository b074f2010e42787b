pub use self::parser::{
    BotConfig, Config, DatabaseConfig, ExpiryMode, LogFormat, LoggingConfig, MarriageConfig,
    StorageBackend,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
