//! Environment-sourced configuration. Loading is eager and fails fast:
//! a missing required variable is a startup error naming the variable.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("environment variable {name} has an invalid value: {reason}")]
    InvalidVar { name: &'static str, reason: String },
}

const DEFAULT_DATABASE_PATH: &str = "shuffle.db";
const DEFAULT_QUEUE_BUFFER_SIZE: usize = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub spotify_client_id: String,
    pub base_url: String,
    pub session_secret: String,
    pub database_path: PathBuf,
    pub queue_buffer_size: usize,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// # Errors
    /// Returns [`ConfigError`] if a required variable is missing or a
    /// present one cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let spotify_client_id = required_var("SPOTIFY_CLIENT_ID")?;
        let base_url = required_var("BASE_URL")?;
        let session_secret = required_var("SESSION_SECRET")?;

        let database_path = std::env::var("DATABASE_PATH")
            .unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string())
            .into();

        let queue_buffer_size = match std::env::var("QUEUE_BUFFER_SIZE") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidVar {
                name: "QUEUE_BUFFER_SIZE",
                reason: format!("{raw:?} is not a positive integer"),
            })?,
            Err(_) => DEFAULT_QUEUE_BUFFER_SIZE,
        };

        let log_file = std::env::var("LOG_FILE").ok().map(PathBuf::from);

        Ok(Self {
            spotify_client_id,
            base_url,
            session_secret,
            database_path,
            queue_buffer_size,
            log_file,
        })
    }

    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("{}/callback", self.base_url.trim_end_matches('/'))
    }
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name))
}
