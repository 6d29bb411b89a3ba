//! services/app/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Log output format, selected with `LOG_FORMAT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub database_url: String,
    pub credential_store_dir: PathBuf,
    pub log_level: Level,
    pub log_format: LogFormat,
    pub http_timeout: Duration,
    pub run_migrations: bool,
    pub openai_api_key: Option<String>,
    pub recognition_model: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };

        // --- Hosted service ---
        let supabase_url = required("SUPABASE_URL")?.trim_end_matches('/').to_string();
        if !supabase_url.starts_with("http://") && !supabase_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "SUPABASE_URL".to_string(),
                format!("'{}' is not an http(s) URL", supabase_url),
            ));
        }
        let supabase_anon_key = required("SUPABASE_ANON_KEY")?;
        let database_url = required("DATABASE_URL")?;

        let credential_store_dir = lookup("CREDENTIAL_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./.meditect"));

        // --- Logging ---
        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("pretty") | Some("text") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "LOG_FORMAT".to_string(),
                    format!("'{}' is not one of pretty, json", other),
                ))
            }
        };

        // --- Runtime knobs ---
        let http_timeout_secs = match lookup("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "HTTP_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", raw),
                )
            })?,
            None => 15,
        };

        let run_migrations = match lookup("RUN_MIGRATIONS").as_deref() {
            None => false,
            Some(raw) => parse_bool(raw).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "RUN_MIGRATIONS".to_string(),
                    format!("'{}' is not a boolean", raw),
                )
            })?,
        };

        // --- Recognition (optional) ---
        let openai_api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        let recognition_model =
            lookup("RECOGNITION_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());

        Ok(Self {
            supabase_url,
            supabase_anon_key,
            database_url,
            credential_store_dir,
            log_level,
            log_format,
            http_timeout: Duration::from_secs(http_timeout_secs),
            run_migrations,
            openai_api_key,
            recognition_model,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
