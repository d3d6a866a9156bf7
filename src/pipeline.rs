/// Per-symbol orchestration: walk, audit, normalize, sink
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::fetch::{ObservationSource, PageWalker, RetryPolicy, ShutdownSignal, WalkPlan};
use crate::normalize::{self, NormalizeOptions};
use crate::sink::RecordSink;
use crate::types::{Config, RunSummary, SymbolConfig, SymbolReport};
use crate::validate;

pub struct Pipeline {
    config: Arc<Config>,
    walker: PageWalker,
    sink: Arc<dyn RecordSink>,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn ObservationSource>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        let retry = RetryPolicy::new(
            config.fetch.max_attempts,
            Duration::from_secs(config.fetch.retry_delay_secs),
        );
        Pipeline {
            config,
            walker: PageWalker::new(source, retry),
            sink,
        }
    }

    /// Run every configured symbol sequentially.
    ///
    /// A fatal error on one symbol is recorded in the summary and the run
    /// moves on to the next; cancellation and configuration errors stop
    /// everything.
    pub async fn run(&self, shutdown: &mut ShutdownSignal) -> Result<RunSummary> {
        let mut summary = RunSummary {
            timestamp: Utc::now(),
            reports: Vec::new(),
        };

        for symbol_config in &self.config.symbols {
            match self.run_symbol(symbol_config, shutdown).await {
                Ok(report) => summary.reports.push(report),
                Err(e) if e.is_symbol_fatal() => {
                    error!(symbol = %symbol_config.symbol, error = %e, "symbol run failed");
                    summary
                        .reports
                        .push(SymbolReport::failed(&symbol_config.symbol, &e));
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            symbols = summary.reports.len(),
            failed = summary.failed_count(),
            "run complete"
        );
        Ok(summary)
    }

    async fn run_symbol(
        &self,
        symbol_config: &SymbolConfig,
        shutdown: &mut ShutdownSignal,
    ) -> Result<SymbolReport> {
        let (start_boundary, end_boundary) = self.config.fetch.window()?;
        let plan = WalkPlan {
            symbol: symbol_config.symbol.clone(),
            quote_currency: symbol_config.quote_currency.clone(),
            granularity: self.config.fetch.granularity,
            start_boundary,
            end_boundary,
            page_limit: self.config.fetch.page_limit,
        };

        info!(
            symbol = %plan.symbol,
            start = start_boundary,
            end = end_boundary,
            granularity = plan.granularity.as_str(),
            "starting ingestion"
        );

        let series = self.walker.walk(&plan, shutdown).await?;

        let audit = validate::audit_series(&series, plan.granularity, start_boundary, end_boundary);
        for finding in &audit.findings {
            warn!(symbol = %plan.symbol, finding = %finding, "series audit finding");
        }

        let (filter_start, filter_end) = self.config.normalize.date_filter()?;
        let options = NormalizeOptions {
            drop_zero_ohlc: symbol_config.drop_zero_ohlc,
            filter_start,
            filter_end,
        };
        let records = normalize::normalize(&plan.symbol, plan.granularity, &options, &series)?;

        let sink_report = self
            .sink
            .write(&plan.symbol, plan.granularity, &records)
            .await?;
        info!(
            symbol = %plan.symbol,
            rows = sink_report.rows,
            destination = %sink_report.destination,
            committed = sink_report.committed,
            "symbol complete"
        );

        Ok(SymbolReport {
            symbol: plan.symbol,
            observations_fetched: series.len(),
            records_emitted: records.len(),
            audit_findings: audit.findings.len(),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EtlError, FetchError};
    use crate::fetch::retry::never_shutdown;
    use crate::fetch::PageRequest;
    use crate::sink::SinkReport;
    use crate::types::{
        boundary_timestamp, ApiConfig, CanonicalRecord, FetchConfig, Granularity, NormalizeConfig,
        SinkConfig, SinkKind,
    };
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type PageResult = std::result::Result<Vec<Value>, FetchError>;

    struct ScriptedSource {
        pages: Mutex<VecDeque<PageResult>>,
    }

    #[async_trait]
    impl ObservationSource for ScriptedSource {
        async fn fetch_page(&self, _request: &PageRequest) -> PageResult {
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Collects writes in memory instead of persisting them
    #[derive(Default)]
    struct CollectingSink {
        writes: Mutex<Vec<(String, Vec<CanonicalRecord>)>>,
    }

    #[async_trait]
    impl RecordSink for CollectingSink {
        async fn write(
            &self,
            symbol: &str,
            _granularity: Granularity,
            records: &[CanonicalRecord],
        ) -> Result<SinkReport> {
            self.writes
                .lock()
                .unwrap()
                .push((symbol.to_string(), records.to_vec()));
            Ok(SinkReport {
                destination: format!("mem://{}", symbol),
                rows: records.len(),
                committed: true,
            })
        }
    }

    fn record(time: i64, close: f64) -> Value {
        json!({
            "time": time,
            "open": close * 0.9,
            "high": close + 1.0,
            "low": close * 0.5,
            "close": close,
            "volumefrom": 10.0,
            "volumeto": 100.0
        })
    }

    fn config(symbols: Vec<&str>) -> Arc<Config> {
        Arc::new(Config {
            api: ApiConfig {
                base_url: "http://localhost".to_string(),
                api_key: "test".to_string(),
            },
            fetch: FetchConfig {
                granularity: Granularity::Daily,
                start_date: "2020-03-24".to_string(),
                end_date: Some("2020-03-25".to_string()),
                page_limit: 2000,
                max_attempts: 3,
                retry_delay_secs: 0,
            },
            normalize: NormalizeConfig::default(),
            sink: SinkConfig {
                kind: SinkKind::Csv,
                output_dir: "data".to_string(),
                dry_run: false,
                database_url: None,
            },
            symbols: symbols
                .into_iter()
                .map(|s| SymbolConfig {
                    symbol: s.to_string(),
                    quote_currency: "USD".to_string(),
                    drop_zero_ohlc: false,
                })
                .collect(),
        })
    }

    fn pipeline(
        pages: Vec<PageResult>,
        symbols: Vec<&str>,
    ) -> (Pipeline, Arc<CollectingSink>) {
        let source = Arc::new(ScriptedSource {
            pages: Mutex::new(pages.into_iter().collect()),
        });
        let sink = Arc::new(CollectingSink::default());
        (
            Pipeline::new(config(symbols), source, Arc::clone(&sink) as Arc<dyn RecordSink>),
            sink,
        )
    }

    #[tokio::test]
    async fn test_single_symbol_end_to_end() {
        let start = boundary_timestamp("2020-03-24").unwrap();
        let end = boundary_timestamp("2020-03-25").unwrap();
        let (pipeline, sink) = pipeline(
            vec![Ok(vec![record(end, 2.0), record(start, 1.0)])],
            vec!["SYM"],
        );

        let mut shutdown = never_shutdown();
        let summary = pipeline.run(&mut shutdown).await.unwrap();

        assert!(summary.all_succeeded());
        assert_eq!(summary.reports[0].observations_fetched, 2);
        assert_eq!(summary.reports[0].records_emitted, 2);
        assert_eq!(summary.reports[0].audit_findings, 0);

        let writes = sink.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        let ids: Vec<&str> = writes[0].1.iter().map(|r| r.record_id.as_str()).collect();
        assert_eq!(ids, vec!["SYM00001", "SYM00002"]);
    }

    #[tokio::test]
    async fn test_retry_then_success_emits_records() {
        let start = boundary_timestamp("2020-03-24").unwrap();
        let (pipeline, sink) = pipeline(
            vec![
                Err(FetchError::Transient("timeout".to_string())),
                Err(FetchError::Transient("timeout".to_string())),
                Ok(vec![record(start, 1.0)]),
            ],
            vec!["BTC"],
        );

        let mut shutdown = never_shutdown();
        let summary = pipeline.run(&mut shutdown).await.unwrap();

        assert!(summary.all_succeeded());
        assert_eq!(sink.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_emit_nothing_for_symbol() {
        let (pipeline, sink) = pipeline(
            vec![
                Err(FetchError::Transient("timeout".to_string())),
                Err(FetchError::Transient("timeout".to_string())),
                Err(FetchError::Transient("timeout".to_string())),
            ],
            vec!["BTC"],
        );

        let mut shutdown = never_shutdown();
        let summary = pipeline.run(&mut shutdown).await.unwrap();

        assert_eq!(summary.failed_count(), 1);
        assert!(summary.reports[0]
            .error
            .as_deref()
            .unwrap()
            .contains("Exhausted 3 retry attempts"));
        assert!(sink.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_symbol_does_not_stop_the_run() {
        let start = boundary_timestamp("2020-03-24").unwrap();
        let (pipeline, sink) = pipeline(
            vec![
                Err(FetchError::Permanent("fsym param is invalid.".to_string())),
                Ok(vec![record(start, 1.0)]),
            ],
            vec!["BAD", "ETH"],
        );

        let mut shutdown = never_shutdown();
        let summary = pipeline.run(&mut shutdown).await.unwrap();

        assert_eq!(summary.failed_count(), 1);
        assert!(!summary.reports[0].succeeded());
        assert!(summary.reports[1].succeeded());

        let writes = sink.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, "ETH");
    }

    #[tokio::test]
    async fn test_structural_drop_is_advisory() {
        let start = boundary_timestamp("2020-03-24").unwrap();
        let missing_close = json!({
            "time": boundary_timestamp("2020-03-25").unwrap(),
            "open": 1.0,
            "high": 2.0,
            "low": 0.5,
            "volumefrom": 10.0,
            "volumeto": 100.0
        });
        let (pipeline, sink) = pipeline(
            vec![Ok(vec![missing_close, record(start, 1.0)])],
            vec!["BTC"],
        );

        let mut shutdown = never_shutdown();
        let summary = pipeline.run(&mut shutdown).await.unwrap();

        // Run still succeeds; the dropped record surfaces as a count mismatch
        assert!(summary.all_succeeded());
        assert_eq!(summary.reports[0].observations_fetched, 1);
        assert!(summary.reports[0].audit_findings > 0);
        assert_eq!(sink.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_config_error_stops_the_run() {
        let start = boundary_timestamp("2020-03-24").unwrap();
        let source = Arc::new(ScriptedSource {
            pages: Mutex::new(vec![Ok(vec![record(start, 1.0)])].into_iter().collect()),
        });
        let sink = Arc::new(CollectingSink::default());

        let mut config = Arc::try_unwrap(config(vec!["BTC", "ETH"])).unwrap();
        config.fetch.start_date = "not-a-date".to_string();
        let pipeline = Pipeline::new(
            Arc::new(config),
            source,
            Arc::clone(&sink) as Arc<dyn RecordSink>,
        );

        // Not a per-symbol failure: the whole run aborts before any write
        let mut shutdown = never_shutdown();
        let result = pipeline.run(&mut shutdown).await;

        assert!(matches!(result, Err(EtlError::ConfigError(_))));
        assert!(sink.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_run() {
        let (tx, mut shutdown) = tokio::sync::watch::channel(true);
        let (pipeline, sink) = pipeline(Vec::new(), vec!["BTC", "ETH"]);

        let result = pipeline.run(&mut shutdown).await;
        assert!(matches!(result, Err(EtlError::Cancelled)));
        assert!(sink.writes.lock().unwrap().is_empty());
        drop(tx);
    }
}
