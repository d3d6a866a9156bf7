/// Configuration loading from TOML file plus environment secrets
use std::path::Path;

use crate::error::{EtlError, Result};
use crate::types::{Config, SinkKind};

/// Environment variable carrying the remote API key
pub const API_KEY_VAR: &str = "CRYPTOCOMPARE_API_KEY";

/// Environment variable carrying the Postgres connection string
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| EtlError::ConfigError(format!("Failed to read config file: {}", e)))?;

    let mut config: Config = toml::from_str(&content)
        .map_err(|e| EtlError::ConfigError(format!("Failed to parse config: {}", e)))?;

    // Secrets come from the environment, never from the config file
    config.api.api_key = std::env::var(API_KEY_VAR)
        .map_err(|_| EtlError::ConfigError(format!("{} is not set", API_KEY_VAR)))?;

    if config.sink.kind == SinkKind::Postgres {
        let url = std::env::var(DATABASE_URL_VAR)
            .map_err(|_| EtlError::ConfigError(format!("{} is not set", DATABASE_URL_VAR)))?;
        config.sink.database_url = Some(url);
    }

    // Validate config
    validate_config(&config)?;

    Ok(config)
}

pub(crate) fn validate_config(config: &Config) -> Result<()> {
    if config.symbols.is_empty() {
        return Err(EtlError::ConfigError("No symbols configured".to_string()));
    }

    for symbol in &config.symbols {
        if symbol.symbol.trim().is_empty() {
            return Err(EtlError::ConfigError("Symbol name is empty".to_string()));
        }
        if symbol.quote_currency.trim().is_empty() {
            return Err(EtlError::ConfigError(format!(
                "Empty quote_currency for symbol {}",
                symbol.symbol
            )));
        }
    }

    // Validate fetch parameters
    if config.fetch.page_limit == 0 {
        return Err(EtlError::ConfigError("page_limit must be >= 1".to_string()));
    }
    if config.fetch.max_attempts == 0 {
        return Err(EtlError::ConfigError("max_attempts must be >= 1".to_string()));
    }

    // Validate boundaries
    let (start, end) = config.fetch.window()?;
    if start > end {
        return Err(EtlError::ConfigError(format!(
            "start_date {} is after end_date {}",
            config.fetch.start_date,
            config.fetch.end_date.as_deref().unwrap_or("now")
        )));
    }

    // Validate the optional normalization date filter
    let (filter_start, filter_end) = config.normalize.date_filter()?;
    if let (Some(filter_start), Some(filter_end)) = (filter_start, filter_end) {
        if filter_start > filter_end {
            return Err(EtlError::ConfigError(
                "filter_start must be <= filter_end".to_string(),
            ));
        }
    }

    Ok(())
}
