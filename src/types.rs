/// Core type definitions for the ingestion engine
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EtlError, Result};

/// One periodic OHLCV sample as delivered by the remote source.
///
/// Field names follow the upstream wire format; `conversion_type` and
/// `conversion_symbol` are passthrough fields dropped during normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(rename = "volumefrom")]
    pub volume_native: f64,
    #[serde(rename = "volumeto")]
    pub volume_quote: f64,
    #[serde(rename = "conversionType", default, skip_serializing_if = "Option::is_none")]
    pub conversion_type: Option<String>,
    #[serde(rename = "conversionSymbol", default, skip_serializing_if = "Option::is_none")]
    pub conversion_symbol: Option<String>,
}

impl Observation {
    /// All four price fields exactly zero marks a degenerate upstream period
    /// (pre-launch history for some symbols), not a price of zero.
    pub fn is_zero_ohlc(&self) -> bool {
        self.open == 0.0 && self.high == 0.0 && self.low == 0.0 && self.close == 0.0
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.time, 0)
    }
}

/// Sampling period of a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Hourly,
}

impl Granularity {
    pub fn period_secs(&self) -> i64 {
        match self {
            Granularity::Daily => 86_400,
            Granularity::Hourly => 3_600,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Hourly => "hourly",
        }
    }

    /// Remote history endpoint serving this granularity
    pub fn endpoint(&self) -> &str {
        match self {
            Granularity::Daily => "histoday",
            Granularity::Hourly => "histohour",
        }
    }

    /// Record-id prefix: hourly series carry an `_H` marker so daily and
    /// hourly ids for the same symbol never collide.
    pub fn record_prefix(&self, symbol: &str) -> String {
        match self {
            Granularity::Daily => symbol.to_string(),
            Granularity::Hourly => format!("{}_H", symbol),
        }
    }
}

/// Normalized output row in canonical column order:
/// record_id, coin_symbol, date[, hour], open, low, high, close,
/// trade_vol_native, trade_vol_usd
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub record_id: String,
    pub coin_symbol: String,
    pub date: String,
    /// `%H` for hourly series, absent for daily
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<String>,
    pub open: f64,
    pub low: f64,
    pub high: f64,
    pub close: f64,
    pub trade_vol_native: f64,
    pub trade_vol_usd: f64,
}

impl CanonicalRecord {
    /// Canonical textual rendering of the quote-currency volume
    pub fn trade_vol_usd_display(&self) -> String {
        format!("{:.2}", self.trade_vol_usd)
    }
}

/// Outcome of one symbol's walk + normalize + sink run
#[derive(Debug, Clone, Serialize)]
pub struct SymbolReport {
    pub symbol: String,
    pub observations_fetched: usize,
    pub records_emitted: usize,
    pub audit_findings: usize,
    pub error: Option<String>,
}

impl SymbolReport {
    pub fn failed(symbol: &str, err: &EtlError) -> Self {
        SymbolReport {
            symbol: symbol.to_string(),
            observations_fetched: 0,
            records_emitted: 0,
            audit_findings: 0,
            error: Some(err.to_string()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Report for a whole multi-symbol run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub timestamp: DateTime<Utc>,
    pub reports: Vec<SymbolReport>,
}

impl RunSummary {
    pub fn failed_count(&self) -> usize {
        self.reports.iter().filter(|r| !r.succeeded()).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Process configuration, loaded once at startup and passed by reference
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub fetch: FetchConfig,
    #[serde(default)]
    pub normalize: NormalizeConfig,
    pub sink: SinkConfig,
    pub symbols: Vec<SymbolConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Filled from CRYPTOCOMPARE_API_KEY, never read from the TOML file
    #[serde(skip)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    pub granularity: Granularity,
    /// Inclusive start boundary, `%Y-%m-%d`
    pub start_date: String,
    /// Inclusive end boundary, `%Y-%m-%d`; defaults to the current time
    pub end_date: Option<String>,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl FetchConfig {
    /// Inclusive `[start, end]` boundaries in epoch seconds
    pub fn window(&self) -> Result<(i64, i64)> {
        let start = boundary_timestamp(&self.start_date)?;
        let end = match &self.end_date {
            Some(date) => boundary_timestamp(date)?,
            None => Utc::now().timestamp(),
        };
        Ok((start, end))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolConfig {
    pub symbol: String,
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    /// Drop records whose OHLC fields are all zero (pre-launch history)
    #[serde(default)]
    pub drop_zero_ohlc: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NormalizeConfig {
    pub filter_start: Option<String>,
    pub filter_end: Option<String>,
}

impl NormalizeConfig {
    pub fn date_filter(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let start = self.filter_start.as_deref().map(parse_date).transpose()?;
        let end = self.filter_end.as_deref().map(parse_date).transpose()?;
        Ok((start, end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Csv,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    pub kind: SinkKind,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Persistence is attempted but always rolled back / discarded
    #[serde(default)]
    pub dry_run: bool,
    /// Filled from DATABASE_URL when the postgres sink is selected
    #[serde(skip)]
    pub database_url: Option<String>,
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| EtlError::ConfigError(format!("Invalid date '{}': {}", s, e)))
}

/// Midnight UTC of the given `%Y-%m-%d` date, in epoch seconds
pub fn boundary_timestamp(s: &str) -> Result<i64> {
    Ok(parse_date(s)?.and_time(NaiveTime::MIN).and_utc().timestamp())
}

fn default_base_url() -> String {
    "https://min-api.cryptocompare.com".to_string()
}

fn default_page_limit() -> u32 {
    2000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_quote_currency() -> String {
    "USD".to_string()
}

fn default_output_dir() -> String {
    "data".to_string()
}
