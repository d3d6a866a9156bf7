/// Sink adapters for canonical records
pub mod csv;
pub mod postgres;

pub use csv::CsvSink;
pub use postgres::PostgresSink;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CanonicalRecord, Granularity};

/// Where one symbol's records ended up
#[derive(Debug, Clone)]
pub struct SinkReport {
    pub destination: String,
    pub rows: usize,
    /// False in dry-run mode: the write was exercised but discarded
    pub committed: bool,
}

/// Persists one symbol's canonical records. The adapter owns transactional
/// semantics: a symbol's output is either fully committed or absent.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write(
        &self,
        symbol: &str,
        granularity: Granularity,
        records: &[CanonicalRecord],
    ) -> Result<SinkReport>;
}
