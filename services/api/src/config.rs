//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;
use writing_assistant_core::SchedulerConfig;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub allowed_origin: String,
    pub grammar_model: String,
    pub persona_model: String,
    pub grammar_context_window: usize,
    pub grammar_debounce: Duration,
    pub persona_idle: Duration,
    pub accept_save_delay: Duration,
    pub accept_reanalysis_delay: Duration,
    pub autosave_interval: Duration,
    pub analysis_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address: SocketAddr = parse_var("BIND_ADDRESS", "0.0.0.0:3000".parse().ok())?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let allowed_origin = std::env::var("ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        // --- Load API Keys (as optional) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        // --- Load Adapter-specific Settings ---
        let grammar_model =
            std::env::var("GRAMMAR_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let persona_model =
            std::env::var("PERSONA_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let grammar_context_window: usize = parse_var("GRAMMAR_CONTEXT_WINDOW", Some(500))?;

        // --- Load Editor Timing ---
        let grammar_debounce = Duration::from_millis(parse_var("GRAMMAR_DEBOUNCE_MS", Some(500))?);
        let persona_idle = Duration::from_millis(parse_var("PERSONA_IDLE_MS", Some(3000))?);
        let accept_save_delay = Duration::from_millis(parse_var("ACCEPT_SAVE_DELAY_MS", Some(500))?);
        let accept_reanalysis_delay =
            Duration::from_millis(parse_var("ACCEPT_REANALYSIS_DELAY_MS", Some(1000))?);
        let autosave_interval = Duration::from_secs(parse_var("AUTOSAVE_INTERVAL_SECS", Some(10))?);
        let analysis_timeout = Duration::from_secs(parse_var("ANALYSIS_TIMEOUT_SECS", Some(30))?);

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            allowed_origin,
            grammar_model,
            persona_model,
            grammar_context_window,
            grammar_debounce,
            persona_idle,
            accept_save_delay,
            accept_reanalysis_delay,
            autosave_interval,
            analysis_timeout,
        })
    }

    /// The debounce and follow-up timings handed to every editor session.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            grammar_debounce: self.grammar_debounce,
            persona_idle: self.persona_idle,
            save_after_accept: self.accept_save_delay,
            reanalysis_after_accept: self.accept_reanalysis_delay,
            autosave_interval: self.autosave_interval,
        }
    }
}

/// Reads and parses `name`, falling back to `default` when it is unset.
/// A missing variable without a default is a `MissingVar` error.
fn parse_var<T>(name: &str, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => default.ok_or_else(|| ConfigError::MissingVar(name.to_string())),
    }
}
