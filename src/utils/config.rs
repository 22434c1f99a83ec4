use serde::Deserialize;
use std::{fs, path::PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigLoadingError {
    #[error("Failed to read the config (./config.toml): {0}")]
    FailedToReadConfig(String),

    #[error("Failed to parse the config: {0}")]
    FailedToParseConfig(String),
}

impl From<toml::de::Error> for ConfigLoadingError {
    fn from(err: toml::de::Error) -> Self {
        ConfigLoadingError::FailedToParseConfig(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub media: MediaConfig,
    #[serde(default)]
    pub tagging: TaggingDefaults,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct MediaConfig {
    pub music_path: PathBuf,
}

/// Seed values for the DB-backed settings table, loaded once at
/// bootstrap and written into `settings` rows that don't already exist.
/// Runtime changes after that live in the DB, not here; see
/// `services::settings::SettingsStore`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaggingDefaults {
    pub auto_tag_on_scan: bool,
    pub confidence_auto_threshold: f64,
    pub confidence_review_threshold: f64,
    pub artwork_min_size: i64,
    pub artwork_max_size: i64,
    pub artwork_sources: Vec<String>,
    pub watch_stabilization_delay: i64,
    pub watch_poll_interval_secs: i64,
    pub fanarttv_api_key: String,
    pub preferred_countries: Vec<String>,
    pub preferred_media: Vec<String>,
    pub lyrics_enabled: bool,
    pub lyrics_auto_fetch: bool,
    pub replaygain_enabled: bool,
    pub replaygain_auto_calculate: bool,
    pub replaygain_reference_loudness: f64,
    pub max_retries: i64,
}

impl Default for TaggingDefaults {
    fn default() -> Self {
        Self {
            auto_tag_on_scan: false,
            confidence_auto_threshold: 85.0,
            confidence_review_threshold: 50.0,
            artwork_min_size: 500,
            artwork_max_size: 1400,
            artwork_sources: vec![
                "coverart".into(),
                "filesystem".into(),
                "fanarttv".into(),
                "itunes".into(),
            ],
            watch_stabilization_delay: 30,
            watch_poll_interval_secs: 60,
            fanarttv_api_key: String::new(),
            preferred_countries: vec!["US".into(), "GB".into(), "DE".into(), "IT".into()],
            preferred_media: vec!["Digital Media".into(), "CD".into()],
            lyrics_enabled: false,
            lyrics_auto_fetch: false,
            replaygain_enabled: false,
            replaygain_auto_calculate: false,
            replaygain_reference_loudness: -18.0,
            max_retries: 3,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigLoadingError> {
        let config_str = fs::read_to_string("config.toml").map_err(|err| ConfigLoadingError::FailedToReadConfig(err.to_string()))?;
        let config: Config = toml::from_str(&config_str)?;

        Ok(config)
    }
}

pub fn get_config() -> Result<&'static Config, ConfigLoadingError> {
    static CONFIG: OnceLock<Result<Config, ConfigLoadingError>> = OnceLock::new();

    let result = CONFIG.get_or_init(Config::load);

    match result {
        Ok(config) => Ok(config),
        Err(err) => Err(err.clone()),
    }
}
