/// Main entry point for the ingestion engine
use std::sync::Arc;

use tracing::{error, info};

use coinflow::config::load_config;
use coinflow::error::{EtlError, Result};
use coinflow::fetch::CryptoCompareClient;
use coinflow::pipeline::Pipeline;
use coinflow::sink::{CsvSink, PostgresSink, RecordSink};
use coinflow::types::SinkKind;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("coinflow=info,info")),
        )
        .init();

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = Arc::new(load_config(&config_path)?);
    info!("Configuration loaded from {}", config_path);

    if config.sink.dry_run {
        info!("Running in DRY RUN mode, no output will be committed");
    }

    let source = Arc::new(CryptoCompareClient::new(
        config.api.base_url.clone(),
        config.api.api_key.clone(),
    ));

    let sink: Arc<dyn RecordSink> = match config.sink.kind {
        SinkKind::Csv => Arc::new(CsvSink::new(
            config.sink.output_dir.clone(),
            config.sink.dry_run,
        )),
        SinkKind::Postgres => {
            let url = config.sink.database_url.as_deref().ok_or_else(|| {
                EtlError::ConfigError("DATABASE_URL is not set".to_string())
            })?;
            let sink = PostgresSink::connect(url, config.sink.dry_run).await?;
            info!("Database connection established");
            Arc::new(sink)
        }
    };

    // Ctrl+C flips the shutdown flag; the run aborts at the next blocking point
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, cancelling run");
            let _ = shutdown_tx.send(true);
        }
    });

    let pipeline = Pipeline::new(Arc::clone(&config), source, sink);
    let summary = pipeline.run(&mut shutdown_rx).await?;

    let failed = summary.failed_count();
    if failed > 0 {
        error!("{} of {} symbols failed", failed, summary.reports.len());
        std::process::exit(1);
    }

    info!("All {} symbols completed successfully", summary.reports.len());
    Ok(())
}
