//! Application configuration

use std::env;
use std::str::FromStr;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub log_format: LogFormat,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,

    // Live connections
    pub ws_outbound_buffer: usize,

    // Messaging
    pub message_max_length: usize,
    pub message_page_size: u32,
    pub message_max_page_size: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                Ok("pretty") | Err(_) => LogFormat::Pretty,
                Ok(_) => return Err(ConfigError::Invalid("LOG_FORMAT")),
            },

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 10)?,

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            jwt_expiry_hours: parse_var("JWT_EXPIRY_HOURS", 24)?,

            // Live connections
            ws_outbound_buffer: parse_var("WS_OUTBOUND_BUFFER", 64)?,

            // Messaging
            message_max_length: parse_var("MESSAGE_MAX_LENGTH", 5000)?,
            message_page_size: parse_var("MESSAGE_PAGE_SIZE", 50)?,
            message_max_page_size: parse_var("MESSAGE_MAX_PAGE_SIZE", 100)?,
        };

        if config.ws_outbound_buffer == 0 {
            return Err(ConfigError::Invalid("WS_OUTBOUND_BUFFER"));
        }
        if config.message_page_size == 0 || config.message_page_size > config.message_max_page_size
        {
            return Err(ConfigError::Invalid("MESSAGE_PAGE_SIZE"));
        }

        Ok(config)
    }
}

/// Read an optional variable, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
