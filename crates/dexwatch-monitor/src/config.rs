//! Application configuration.

use crate::error::{AppError, AppResult};
use dexwatch_pipeline::ActivityWeights;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// WebSocket connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsSettings {
    /// Maximum reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Reconnect backoff floor (ms). Default: 1000.
    #[serde(default = "default_reconnect_floor_ms")]
    pub reconnect_floor_ms: u64,
    /// Reconnect backoff ceiling (ms). Default: 30000.
    #[serde(default = "default_reconnect_ceiling_ms")]
    pub reconnect_ceiling_ms: u64,
    /// Tracked-pair refresh cadence (s). Default: 60.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Subscribe response timeout (ms). Default: 10000.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

fn default_reconnect_floor_ms() -> u64 {
    1_000
}

fn default_reconnect_ceiling_ms() -> u64 {
    30_000
}

fn default_refresh_interval_secs() -> u64 {
    60
}

fn default_response_timeout_ms() -> u64 {
    10_000
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 0,
            reconnect_floor_ms: default_reconnect_floor_ms(),
            reconnect_ceiling_ms: default_reconnect_ceiling_ms(),
            refresh_interval_secs: default_refresh_interval_secs(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}

impl From<&WsSettings> for dexwatch_ws::ConnectionConfig {
    fn from(settings: &WsSettings) -> Self {
        Self {
            url: String::new(), // Set separately
            max_reconnect_attempts: settings.max_reconnect_attempts,
            reconnect_floor_ms: settings.reconnect_floor_ms,
            reconnect_ceiling_ms: settings.reconnect_ceiling_ms,
            refresh_interval_secs: settings.refresh_interval_secs,
            response_timeout_ms: settings.response_timeout_ms,
        }
    }
}

/// Snapshot backfill settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillSettings {
    /// Page size for `book_offers` requests. Default: 200.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    /// Per-request timeout (ms). Default: 10000.
    #[serde(default = "default_response_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_page_limit() -> u32 {
    200
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            request_timeout_ms: default_response_timeout_ms(),
        }
    }
}

/// Read facade settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Listen port. Default: 3001.
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_port() -> u16 {
    3_001
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            port: default_http_port(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ledger WebSocket URL.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Ledger JSON-RPC HTTP endpoint (snapshot backfill).
    #[serde(default = "default_snapshot_url")]
    pub snapshot_url: String,
    /// SQLite database path.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Inbound transaction channel capacity. Default: 1000.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub websocket: WsSettings,
    #[serde(default)]
    pub backfill: BackfillSettings,
    #[serde(default)]
    pub activity: ActivityWeights,
    #[serde(default)]
    pub http: HttpSettings,
}

fn default_ws_url() -> String {
    "wss://s.altnet.rippletest.net:51233".to_string()
}

fn default_snapshot_url() -> String {
    "https://s.altnet.rippletest.net:51234/".to_string()
}

fn default_db_path() -> String {
    "./data/dexwatch.db".to_string()
}

fn default_channel_capacity() -> usize {
    1_000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            snapshot_url: default_snapshot_url(),
            db_path: default_db_path(),
            channel_capacity: default_channel_capacity(),
            websocket: WsSettings::default(),
            backfill: BackfillSettings::default(),
            activity: ActivityWeights::default(),
            http: HttpSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration, falling back to defaults if no file exists.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("DEXWATCH_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("failed to parse config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.backfill.page_limit, 200);
        assert_eq!(config.websocket.reconnect_floor_ms, 1_000);
        assert_eq!(config.websocket.reconnect_ceiling_ms, 30_000);
        assert_eq!(config.activity.placement_weight, Decimal::ONE);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            ws_url = "ws://localhost:1234"

            [activity]
            placement_weight = "2"
            fill_weight = "9"
            "#,
        )
        .unwrap();
        assert_eq!(config.ws_url, "ws://localhost:1234");
        assert_eq!(config.http.port, 3_001);
        assert_eq!(config.activity.placement_weight, Decimal::from(2));
        assert_eq!(config.activity.fill_weight, Decimal::from(9));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = AppConfig::default();
        let raw = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.ws_url, config.ws_url);
        assert_eq!(parsed.backfill.page_limit, config.backfill.page_limit);
    }
}
