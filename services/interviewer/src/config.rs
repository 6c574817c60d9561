//! Application Configuration Module
//!
//! Loads the interviewer's settings from environment variables (and `.env`)
//! into a single struct handed to the rest of the service.

use secrecy::SecretString;
use std::env;
use std::time::Duration;
use tracing::Level;

// --- Application Constants ---

/// Frames per cpal callback on the microphone stream.
pub const INPUT_CHUNK_SIZE: usize = 1024;
/// Frames per cpal callback on the speaker stream.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;
/// Capacity of the controller's event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub const DEFAULT_VOICE: &str = "Kore";
pub const DEFAULT_DEEPGRAM_MODEL: &str = "nova-2";
pub const DEFAULT_LANGUAGE: &str = "en-US";
pub const DEFAULT_SILENCE_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 2000;

/// Holds all configuration loaded from the environment.
#[derive(Debug)]
pub struct Config {
    pub gemini_api_key: SecretString,
    pub deepgram_api_key: SecretString,
    pub gemini_model: String,
    pub gemini_voice: String,
    pub deepgram_model: String,
    pub language: String,
    pub silence_timeout: Duration,
    pub frame_interval: Duration,
    pub log_level: Level,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidNumber(String, String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `GEMINI_API_KEY`: Key for the Gemini Live API. Required.
    // *   `DEEPGRAM_API_KEY`: Key for Deepgram streaming speech-to-text. Required.
    // *   `GEMINI_MODEL`: (Optional) Live model. Defaults to the client's default model.
    // *   `GEMINI_VOICE`: (Optional) Prebuilt voice of the interviewer. Defaults to "Kore".
    // *   `DEEPGRAM_MODEL`: (Optional) Defaults to "nova-2".
    // *   `DEEPGRAM_LANGUAGE`: (Optional) Defaults to "en-US".
    // *   `SILENCE_TIMEOUT_MS`: (Optional) Silence that ends an answer. Defaults to 3000.
    // *   `FRAME_INTERVAL_MS`: (Optional) Camera sampling period. Defaults to 2000.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .map(SecretString::from)
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let millis = |key: &str, default: u64| match lookup(key) {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .ok_or(ConfigError::InvalidNumber(key.to_string(), value)),
            None => Ok(Duration::from_millis(default)),
        };

        let gemini_api_key = required("GEMINI_API_KEY")?;
        let deepgram_api_key = required("DEEPGRAM_API_KEY")?;

        // Configure logging level from RUST_LOG, with a sensible default.
        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            gemini_api_key,
            deepgram_api_key,
            gemini_model: or_default("GEMINI_MODEL", gemini_realtime::DEFAULT_MODEL),
            gemini_voice: or_default("GEMINI_VOICE", DEFAULT_VOICE),
            deepgram_model: or_default("DEEPGRAM_MODEL", DEFAULT_DEEPGRAM_MODEL),
            language: or_default("DEEPGRAM_LANGUAGE", DEFAULT_LANGUAGE),
            silence_timeout: millis("SILENCE_TIMEOUT_MS", DEFAULT_SILENCE_TIMEOUT_MS)?,
            frame_interval: millis("FRAME_INTERVAL_MS", DEFAULT_FRAME_INTERVAL_MS)?,
            log_level,
        })
    }
}
