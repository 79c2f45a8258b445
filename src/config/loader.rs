//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{ClientError, Result};

/// Environment variable that overrides the configured API token
pub const API_TOKEN_ENV: &str = "DERIV_API_TOKEN";

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. `DERIV_API_TOKEN` for the API token
/// 2. Environment variables (prefixed with APP_, `__` between sections)
/// 3. Configuration file (TOML format)
/// 4. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        } else {
            tracing::warn!("Config file {} not found, using defaults", path);
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("APP")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("engine.enabled_patterns")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| ClientError::Configuration(e.to_string()))?;

    let mut app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ClientError::Configuration(e.to_string()))?;

    apply_token_override(&mut app_config);
    app_config.validate()?;
    Ok(app_config)
}

/// Load configuration from environment variables only
pub fn load_from_env() -> Result<AppConfig> {
    dotenvy::dotenv().ok();

    let mut app_config = AppConfig::default();
    if let Ok(symbol) = std::env::var("DERIV_SYMBOL") {
        app_config.deriv.symbol = symbol;
    }
    if let Some(app_id) = std::env::var("DERIV_APP_ID").ok().and_then(|v| v.parse().ok()) {
        app_config.deriv.app_id = app_id;
    }
    if let Ok(url) = std::env::var("DERIV_WS_URL") {
        app_config.deriv.websocket_url = url;
    }

    apply_token_override(&mut app_config);
    app_config.validate()?;
    Ok(app_config)
}

fn apply_token_override(config: &mut AppConfig) {
    if let Ok(token) = std::env::var(API_TOKEN_ENV) {
        if !token.trim().is_empty() {
            config.deriv.api_token = Some(token);
        }
    }
}
