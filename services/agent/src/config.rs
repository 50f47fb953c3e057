use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    /// Credential broker endpoint handing back the short-lived session token.
    pub token_url: String,
    /// Realtime signaling endpoint receiving the SDP offer.
    pub realtime_url: String,
    /// Model identifier appended to the signaling URL.
    pub model: String,
    pub voice: String,
    pub temperature: f32,
    pub vad_threshold: f32,
    pub vad_prefix_padding_ms: u32,
    pub vad_silence_duration_ms: u32,
    pub dedup_window_ms: u64,
    /// Optional file overriding the built-in agent instructions.
    pub instructions_path: Option<PathBuf>,
    pub log_level: Level,
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let token_url = std::env::var("TOKEN_URL")
            .map_err(|_| ConfigError::MissingVar("TOKEN_URL".to_string()))?;

        let realtime_url = std::env::var("REALTIME_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1/realtime".to_string());
        let model = std::env::var("REALTIME_MODEL")
            .unwrap_or_else(|_| "gpt-4o-realtime-preview-2024-12-17".to_string());
        let voice = std::env::var("VOICE").unwrap_or_else(|_| "sage".to_string());

        let temperature = parse_var("TEMPERATURE", 0.8_f32)?;
        let vad_threshold = parse_var("VAD_THRESHOLD", 0.5_f32)?;
        let vad_prefix_padding_ms = parse_var("VAD_PREFIX_PADDING_MS", 300_u32)?;
        let vad_silence_duration_ms = parse_var("VAD_SILENCE_DURATION_MS", 500_u32)?;
        let dedup_window_ms = parse_var("DEDUP_WINDOW_MS", 2000_u64)?;

        let instructions_path = std::env::var("INSTRUCTIONS_PATH").map(PathBuf::from).ok();

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            token_url,
            realtime_url,
            model,
            voice,
            temperature,
            vad_threshold,
            vad_prefix_padding_ms,
            vad_silence_duration_ms,
            dedup_window_ms,
            instructions_path,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("TOKEN_URL");
            env::remove_var("REALTIME_URL");
            env::remove_var("REALTIME_MODEL");
            env::remove_var("VOICE");
            env::remove_var("TEMPERATURE");
            env::remove_var("VAD_THRESHOLD");
            env::remove_var("VAD_PREFIX_PADDING_MS");
            env::remove_var("VAD_SILENCE_DURATION_MS");
            env::remove_var("DEDUP_WINDOW_MS");
            env::remove_var("INSTRUCTIONS_PATH");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing = ConfigError::MissingVar("TOKEN_URL".to_string());
        assert_eq!(
            format!("{}", missing),
            "Missing environment variable: TOKEN_URL"
        );

        let invalid = ConfigError::InvalidValue("TEMPERATURE".to_string(), "warm".to_string());
        assert_eq!(
            format!("{}", invalid),
            "Invalid value for environment variable TEMPERATURE: warm"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_minimal() {
        clear_env_vars();
        unsafe {
            env::set_var("TOKEN_URL", "http://localhost:3000/api/realtime-token");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.token_url, "http://localhost:3000/api/realtime-token");
        assert_eq!(config.realtime_url, "https://api.openai.com/v1/realtime");
        assert_eq!(config.model, "gpt-4o-realtime-preview-2024-12-17");
        assert_eq!(config.voice, "sage");
        assert_eq!(config.temperature, 0.8);
        assert_eq!(config.vad_silence_duration_ms, 500);
        assert_eq!(config.dedup_window_ms, 2000);
        assert_eq!(config.instructions_path, None);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("TOKEN_URL", "https://broker.internal/token");
            env::set_var("REALTIME_URL", "https://realtime.example.com/v1/realtime");
            env::set_var("REALTIME_MODEL", "gpt-4o-realtime-mini");
            env::set_var("VOICE", "alloy");
            env::set_var("TEMPERATURE", "0.6");
            env::set_var("VAD_SILENCE_DURATION_MS", "700");
            env::set_var("DEDUP_WINDOW_MS", "1500");
            env::set_var("INSTRUCTIONS_PATH", "/etc/voicelink/instructions.md");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.realtime_url, "https://realtime.example.com/v1/realtime");
        assert_eq!(config.model, "gpt-4o-realtime-mini");
        assert_eq!(config.voice, "alloy");
        assert_eq!(config.temperature, 0.6);
        assert_eq!(config.vad_silence_duration_ms, 700);
        assert_eq!(config.dedup_window_ms, 1500);
        assert_eq!(
            config.instructions_path,
            Some(PathBuf::from("/etc/voicelink/instructions.md"))
        );
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_missing_token_url() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(name) => assert_eq!(name, "TOKEN_URL"),
            _ => panic!("Expected MissingVar for TOKEN_URL"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_temperature() {
        clear_env_vars();
        unsafe {
            env::set_var("TOKEN_URL", "http://localhost:3000/api/realtime-token");
            env::set_var("TEMPERATURE", "warm");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(name, value) => {
                assert_eq!(name, "TEMPERATURE");
                assert_eq!(value, "warm");
            }
            _ => panic!("Expected InvalidValue for TEMPERATURE"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("TOKEN_URL", "http://localhost:3000/api/realtime-token");
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(name, _) => assert_eq!(name, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }
}
