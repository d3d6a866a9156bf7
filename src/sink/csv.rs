/// CSV sink: one delimited artifact per symbol and granularity
use std::path::PathBuf;

use async_trait::async_trait;
use csv::WriterBuilder;
use tracing::info;

use crate::error::{EtlError, Result};
use crate::sink::{RecordSink, SinkReport};
use crate::types::{CanonicalRecord, Granularity};

pub struct CsvSink {
    output_dir: PathBuf,
    dry_run: bool,
}

impl CsvSink {
    pub fn new(output_dir: impl Into<PathBuf>, dry_run: bool) -> Self {
        CsvSink {
            output_dir: output_dir.into(),
            dry_run,
        }
    }

    fn header(granularity: Granularity) -> &'static [&'static str] {
        match granularity {
            Granularity::Daily => &[
                "record_id",
                "coin_symbol",
                "date",
                "open",
                "low",
                "high",
                "close",
                "trade_vol_native",
                "trade_vol_usd",
            ],
            Granularity::Hourly => &[
                "record_id",
                "coin_symbol",
                "date",
                "hour",
                "open",
                "low",
                "high",
                "close",
                "trade_vol_native",
                "trade_vol_usd",
            ],
        }
    }

    fn render(granularity: Granularity, records: &[CanonicalRecord]) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(Self::header(granularity))?;

        for record in records {
            let mut row = vec![
                record.record_id.clone(),
                record.coin_symbol.clone(),
                record.date.clone(),
            ];
            if granularity == Granularity::Hourly {
                row.push(record.hour.clone().unwrap_or_default());
            }
            row.push(record.open.to_string());
            row.push(record.low.to_string());
            row.push(record.high.to_string());
            row.push(record.close.to_string());
            row.push(record.trade_vol_native.to_string());
            row.push(record.trade_vol_usd_display());
            writer.write_record(&row)?;
        }

        writer
            .into_inner()
            .map_err(|e| {
                EtlError::FileError(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            })
    }
}

#[async_trait]
impl RecordSink for CsvSink {
    async fn write(
        &self,
        symbol: &str,
        granularity: Granularity,
        records: &[CanonicalRecord],
    ) -> Result<SinkReport> {
        let path = self
            .output_dir
            .join(format!("{}_{}.csv", symbol.to_lowercase(), granularity.as_str()));
        let destination = path.display().to_string();

        // Serialize first so a render failure never leaves a partial file
        let bytes = Self::render(granularity, records)?;

        if self.dry_run {
            info!(symbol, destination = %destination, rows = records.len(), "dry run: CSV not written");
            return Ok(SinkReport {
                destination,
                rows: records.len(),
                committed: false,
            });
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(&path, bytes).await?;

        info!(symbol, destination = %destination, rows = records.len(), "CSV written");
        Ok(SinkReport {
            destination,
            rows: records.len(),
            committed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(seq: usize, date: &str, hour: Option<&str>) -> CanonicalRecord {
        CanonicalRecord {
            record_id: format!("BTC{:05}", seq),
            coin_symbol: "BTC".to_string(),
            date: date.to_string(),
            hour: hour.map(|h| h.to_string()),
            open: 6416.31,
            low: 6332.45,
            high: 6584.43,
            close: 6572.38,
            trade_vol_native: 71253.44,
            trade_vol_usd: 459_972_829.34,
        }
    }

    #[tokio::test]
    async fn test_writes_daily_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path(), false);

        let records = vec![record(1, "2020-03-24", None), record(2, "2020-03-25", None)];
        let report = sink
            .write("BTC", Granularity::Daily, &records)
            .await
            .unwrap();

        assert!(report.committed);
        assert_eq!(report.rows, 2);

        let content = std::fs::read_to_string(dir.path().join("btc_daily.csv")).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "record_id,coin_symbol,date,open,low,high,close,trade_vol_native,trade_vol_usd"
        );
        assert_eq!(
            lines.next().unwrap(),
            "BTC00001,BTC,2020-03-24,6416.31,6332.45,6584.43,6572.38,71253.44,459972829.34"
        );
        assert_eq!(lines.count(), 1);
    }

    #[tokio::test]
    async fn test_hourly_header_includes_hour() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path(), false);

        let records = vec![record(1, "2020-03-24", Some("13"))];
        sink.write("ETH", Granularity::Hourly, &records)
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("eth_hourly.csv")).unwrap();
        assert!(content.starts_with(
            "record_id,coin_symbol,date,hour,open,low,high,close,trade_vol_native,trade_vol_usd"
        ));
        assert!(content.contains("BTC00001,BTC,2020-03-24,13,"));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path(), true);

        let report = sink
            .write("BTC", Granularity::Daily, &[record(1, "2020-03-24", None)])
            .await
            .unwrap();

        assert!(!report.committed);
        assert!(!dir.path().join("btc_daily.csv").exists());
    }
}
