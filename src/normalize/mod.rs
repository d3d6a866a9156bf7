/// Normalization of a validated raw series into canonical records
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::error::{EtlError, Result};
use crate::types::{CanonicalRecord, Granularity, Observation};

/// Zero-padded width of the sequential portion of a record id
const RECORD_SEQ_WIDTH: usize = 5;

/// Per-symbol normalization knobs
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    /// Drop records whose OHLC fields are all exactly zero (known degenerate
    /// pre-launch state for some symbols); a zero volume alone is kept.
    pub drop_zero_ohlc: bool,
    /// Inclusive date window applied to the derived `date` column; trims
    /// final-page spillover earlier than the walk's start boundary.
    pub filter_start: Option<NaiveDate>,
    pub filter_end: Option<NaiveDate>,
}

/// Reshape an ascending raw series into canonical records.
///
/// Record ids are assigned after duplicate collapse, cleaning and date
/// filtering so the emitted sequence is exactly 1..N with no gaps.
/// Passthrough fields are dropped by construction. Fatal only for this
/// symbol's run.
pub fn normalize(
    symbol: &str,
    granularity: Granularity,
    options: &NormalizeOptions,
    series: &[Observation],
) -> Result<Vec<CanonicalRecord>> {
    // Entry check: every numeric field must be finite and non-negative
    for obs in series {
        check_fields(symbol, obs)?;
    }

    // Page overlap re-delivers the cursor record: an exact copy of an
    // already-kept observation is dropped so no two emitted records share a
    // date and hour. Exact copies share a timestamp, so after the ascending
    // sort they sit inside one same-time run.
    let mut duplicates = 0usize;
    let mut deduped: Vec<&Observation> = Vec::with_capacity(series.len());
    for obs in series {
        let repeat = deduped
            .iter()
            .rev()
            .take_while(|prev| prev.time == obs.time)
            .any(|prev| *prev == obs);
        if repeat {
            duplicates += 1;
            debug!(symbol, time = obs.time, "dropping duplicate observation");
            continue;
        }
        deduped.push(obs);
    }

    let prefix = granularity.record_prefix(symbol);
    let mut records: Vec<CanonicalRecord> = Vec::with_capacity(deduped.len());

    for obs in deduped {
        if options.drop_zero_ohlc && obs.is_zero_ohlc() {
            debug!(symbol, time = obs.time, "dropping degenerate zero-OHLC record");
            continue;
        }

        let datetime = obs.datetime().ok_or_else(|| {
            EtlError::SchemaMismatch(format!(
                "{}: timestamp {} is not representable",
                symbol, obs.time
            ))
        })?;
        let date = datetime.date_naive();

        if let Some(start) = options.filter_start {
            if date < start {
                continue;
            }
        }
        if let Some(end) = options.filter_end {
            if date > end {
                continue;
            }
        }

        let hour = match granularity {
            Granularity::Daily => None,
            Granularity::Hourly => Some(datetime.format("%H").to_string()),
        };

        let sequence = records.len() + 1;
        records.push(CanonicalRecord {
            record_id: format!("{}{:0width$}", prefix, sequence, width = RECORD_SEQ_WIDTH),
            coin_symbol: symbol.to_string(),
            date: date.format("%Y-%m-%d").to_string(),
            hour,
            open: obs.open,
            low: obs.low,
            high: obs.high,
            close: obs.close,
            trade_vol_native: obs.volume_native,
            trade_vol_usd: round_2dp(obs.volume_quote),
        });
    }

    info!(
        symbol,
        granularity = granularity.as_str(),
        input = series.len(),
        duplicates,
        records = records.len(),
        "normalization complete"
    );

    Ok(records)
}

fn check_fields(symbol: &str, obs: &Observation) -> Result<()> {
    let fields = [
        ("open", obs.open),
        ("high", obs.high),
        ("low", obs.low),
        ("close", obs.close),
        ("volume_native", obs.volume_native),
        ("volume_quote", obs.volume_quote),
    ];
    for (name, value) in fields {
        if !value.is_finite() || value < 0.0 {
            return Err(EtlError::SchemaMismatch(format!(
                "{}: field {} has invalid value {} at time {}",
                symbol, name, value, obs.time
            )));
        }
    }
    Ok(())
}

fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
