use crate::error::{config_error, env_error, SyncResult};
use chrono::Duration;
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

/// Google Calendar REST endpoint
pub const DEFAULT_GOOGLE_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
/// Google OAuth token endpoint
pub const DEFAULT_GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Color used when neither a profile nor the household defines one
pub const DEFAULT_EVENT_COLOR: &str = "#4285F4";
/// Location of the optional tuning overlay
pub const SYNC_TUNING_PATH: &str = "config/sync.toml";

/// Tunables that rarely change, loaded from `config/sync.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncTuning {
    /// Trailing window in which a local edit wins over a remote read
    pub race_guard_secs: i64,
    /// Refresh access tokens that expire within this many seconds
    pub token_refresh_skew_secs: i64,
    /// Per-request timeout for provider calls
    pub request_timeout_secs: u64,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            race_guard_secs: 5,
            token_refresh_skew_secs: 60,
            request_timeout_secs: 30,
        }
    }
}

/// Main configuration structure for the sync engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Google OAuth client ID
    pub google_client_id: String,
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// Base URL of the Calendar REST API
    pub google_api_base: String,
    /// OAuth token endpoint
    pub google_token_url: String,
    /// Redis connection URL for the local event store
    pub redis_url: String,
    /// Household timezone, used for all-day events
    pub timezone: String,
    /// Fallback display color
    pub default_event_color: String,
    /// Default look-ahead of a list request, in days
    pub sync_window_days: i64,
    /// Tuning overlay
    pub tuning: SyncTuning,
}

impl Config {
    /// Load configuration from environment and config file
    pub fn load() -> SyncResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let google_client_id =
            env::var("GOOGLE_CLIENT_ID").map_err(|_| env_error("GOOGLE_CLIENT_ID"))?;
        let google_client_secret =
            env::var("GOOGLE_CLIENT_SECRET").map_err(|_| env_error("GOOGLE_CLIENT_SECRET"))?;

        let google_api_base =
            env::var("GOOGLE_API_BASE").unwrap_or_else(|_| DEFAULT_GOOGLE_API_BASE.to_string());
        let google_token_url =
            env::var("GOOGLE_TOKEN_URL").unwrap_or_else(|_| DEFAULT_GOOGLE_TOKEN_URL.to_string());
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| String::from("redis://127.0.0.1:6379"));
        let timezone = env::var("TIMEZONE").unwrap_or_else(|_| String::from("UTC"));
        let default_event_color =
            env::var("DEFAULT_EVENT_COLOR").unwrap_or_else(|_| DEFAULT_EVENT_COLOR.to_string());

        let sync_window_days = match env::var("SYNC_WINDOW_DAYS") {
            Ok(value) => value
                .parse::<i64>()
                .map_err(|_| config_error("Invalid SYNC_WINDOW_DAYS format"))?,
            Err(_) => 28,
        };

        // The tuning file is optional; a broken one is an error rather than silently ignored
        let tuning = match fs::read_to_string(SYNC_TUNING_PATH) {
            Ok(content) => toml::from_str::<SyncTuning>(&content)?,
            Err(_) => SyncTuning::default(),
        };

        Ok(Config {
            google_client_id,
            google_client_secret,
            google_api_base,
            google_token_url,
            redis_url,
            timezone,
            default_event_color,
            sync_window_days,
            tuning,
        })
    }
}

/// Snapshot of the settings the engine components work with
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub race_guard: Duration,
    pub token_refresh_skew: Duration,
    pub default_color: String,
    pub timezone: Tz,
    pub sync_window_days: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        let tuning = SyncTuning::default();
        Self {
            race_guard: Duration::seconds(tuning.race_guard_secs),
            token_refresh_skew: Duration::seconds(tuning.token_refresh_skew_secs),
            default_color: DEFAULT_EVENT_COLOR.to_string(),
            timezone: Tz::UTC,
            sync_window_days: 28,
        }
    }
}

impl SyncSettings {
    /// Derive engine settings from the loaded configuration
    pub fn from_config(config: &Config) -> SyncResult<Self> {
        let timezone = config
            .timezone
            .parse::<Tz>()
            .map_err(|e| config_error(&format!("Invalid TIMEZONE '{}': {}", config.timezone, e)))?;

        if config.tuning.race_guard_secs < 0 || config.tuning.token_refresh_skew_secs < 0 {
            return Err(config_error("Sync tuning durations must not be negative"));
        }

        Ok(Self {
            race_guard: Duration::seconds(config.tuning.race_guard_secs),
            token_refresh_skew: Duration::seconds(config.tuning.token_refresh_skew_secs),
            default_color: config.default_event_color.clone(),
            timezone,
            sync_window_days: config.sync_window_days,
        })
    }
}
