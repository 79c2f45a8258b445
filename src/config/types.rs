//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::common::errors::{ClientError, Result};
use crate::strategy::types::PatternType;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deriv API configuration
    #[serde(default)]
    pub deriv: DerivConfig,
    /// Pattern engine and orchestrator configuration
    #[serde(default)]
    pub engine: EngineConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

impl AppConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.deriv.symbol.trim().is_empty() {
            return Err(ClientError::Configuration("deriv.symbol must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.engine.confidence_threshold) {
            return Err(ClientError::Configuration(format!(
                "engine.confidence_threshold must be within [0, 1], got {}",
                self.engine.confidence_threshold
            )));
        }
        if self.engine.tick_buffer_capacity == 0 {
            return Err(ClientError::Configuration(
                "engine.tick_buffer_capacity must be at least 1".into(),
            ));
        }
        if self.engine.evaluation_interval_ms == 0 {
            return Err(ClientError::Configuration(
                "engine.evaluation_interval_ms must be positive".into(),
            ));
        }
        if self.engine.stake_fraction < Decimal::ZERO || self.engine.min_stake < Decimal::ZERO {
            return Err(ClientError::Configuration(
                "engine stake settings must not be negative".into(),
            ));
        }
        if self.settings.heartbeat_interval_seconds == 0 {
            return Err(ClientError::Configuration(
                "settings.heartbeat_interval_seconds must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Deriv API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivConfig {
    /// API token used for authorization
    #[serde(default)]
    pub api_token: Option<String>,
    /// Registered application id sent on the endpoint URL
    #[serde(default = "default_app_id")]
    pub app_id: u32,
    /// WebSocket endpoint without query parameters
    #[serde(default = "default_websocket_url")]
    pub websocket_url: String,
    /// Instrument to stream ticks for
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Account currency used for proposals
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Contract duration
    #[serde(default = "default_contract_duration")]
    pub contract_duration: u32,
    /// Contract duration unit (`t` = ticks)
    #[serde(default = "default_contract_duration_unit")]
    pub contract_duration_unit: String,
}

impl Default for DerivConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            app_id: default_app_id(),
            websocket_url: default_websocket_url(),
            symbol: default_symbol(),
            currency: default_currency(),
            contract_duration: default_contract_duration(),
            contract_duration_unit: default_contract_duration_unit(),
        }
    }
}

fn default_app_id() -> u32 {
    1089
}

fn default_websocket_url() -> String {
    "wss://ws.binaryws.com/websockets/v3".to_string()
}

fn default_symbol() -> String {
    "R_100".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_contract_duration() -> u32 {
    5
}

fn default_contract_duration_unit() -> String {
    "t".to_string()
}

/// Pattern engine and trade loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Evaluation cadence in milliseconds
    #[serde(default = "default_evaluation_interval")]
    pub evaluation_interval_ms: u64,
    /// Signals must be strictly more confident than this to trade
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Pattern types allowed to trade
    #[serde(default = "default_enabled_patterns")]
    pub enabled_patterns: Vec<PatternType>,
    /// Number of recent prices kept
    #[serde(default = "default_tick_buffer_capacity")]
    pub tick_buffer_capacity: usize,
    /// Share of the balance staked per trade
    #[serde(default = "default_stake_fraction")]
    pub stake_fraction: Decimal,
    /// Stake floor
    #[serde(default = "default_min_stake")]
    pub min_stake: Decimal,
    /// Cap on placements per cycle (unset = no cap)
    #[serde(default)]
    pub max_trades_per_cycle: Option<usize>,
    /// Skip trading while the balance is zero or negative
    #[serde(default)]
    pub skip_non_positive_balance: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_ms: default_evaluation_interval(),
            confidence_threshold: default_confidence_threshold(),
            enabled_patterns: default_enabled_patterns(),
            tick_buffer_capacity: default_tick_buffer_capacity(),
            stake_fraction: default_stake_fraction(),
            min_stake: default_min_stake(),
            max_trades_per_cycle: None,
            skip_non_positive_balance: false,
        }
    }
}

fn default_evaluation_interval() -> u64 {
    5000
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_enabled_patterns() -> Vec<PatternType> {
    vec![PatternType::OddEven]
}

fn default_tick_buffer_capacity() -> usize {
    20
}

fn default_stake_fraction() -> Decimal {
    dec!(0.01)
}

fn default_min_stake() -> Decimal {
    dec!(1)
}

/// Reconnect delay growth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay before every attempt
    #[default]
    Fixed,
    /// Delay doubles per attempt up to the configured maximum
    Exponential,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Time allowed for the transport to confirm it is open
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Heartbeat/ping interval in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Delay between reconnection attempts in milliseconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    #[serde(default)]
    pub reconnect_backoff: BackoffStrategy,
    /// Upper bound for exponential backoff in milliseconds
    #[serde(default = "default_max_reconnect_delay")]
    pub max_reconnect_delay_ms: u64,
    /// Maximum reconnection attempts (0 = infinite)
    #[serde(default)]
    pub max_reconnect_attempts: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            connect_timeout_seconds: default_connect_timeout(),
            request_timeout_seconds: default_request_timeout(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            reconnect_delay_ms: default_reconnect_delay(),
            reconnect_backoff: BackoffStrategy::Fixed,
            max_reconnect_delay_ms: default_max_reconnect_delay(),
            max_reconnect_attempts: 0,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    10
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_reconnect_delay() -> u64 {
    5000
}

fn default_max_reconnect_delay() -> u64 {
    60_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.deriv.app_id, 1089);
        assert_eq!(config.deriv.symbol, "R_100");
        assert_eq!(config.engine.tick_buffer_capacity, 20);
        assert_eq!(config.engine.enabled_patterns, vec![PatternType::OddEven]);
        assert_eq!(config.engine.stake_fraction, dec!(0.01));
        assert_eq!(config.settings.reconnect_delay_ms, 5000);
        assert_eq!(config.settings.reconnect_backoff, BackoffStrategy::Fixed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.engine.confidence_threshold = 1.5;
        assert!(matches!(config.validate(), Err(ClientError::Configuration(_))));

        let mut config = AppConfig::default();
        config.engine.tick_buffer_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.deriv.symbol = "  ".into();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.engine.evaluation_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_toml_shape() {
        let json = serde_json::json!({
            "engine": {"enabled_patterns": ["OddEven", "OverUnder"], "max_trades_per_cycle": 1},
            "settings": {"reconnect_backoff": "exponential"}
        });
        let config: AppConfig = serde_json::from_value(json).unwrap();
        assert_eq!(
            config.engine.enabled_patterns,
            vec![PatternType::OddEven, PatternType::OverUnder]
        );
        assert_eq!(config.engine.max_trades_per_cycle, Some(1));
        assert_eq!(config.settings.reconnect_backoff, BackoffStrategy::Exponential);
        assert_eq!(config.deriv.currency, "USD");
    }
}
