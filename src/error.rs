/// Centralized error types for the ingestion engine
use thiserror::Error;

/// Outcome tag for one remote fetch attempt.
///
/// The retry controller branches on this tag alone: `Transient` failures are
/// retried with a fixed delay, `Permanent` failures abort immediately.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent rejection: {0}")]
    Permanent(String),
}

#[derive(Error, Debug)]
pub enum EtlError {
    // Fetch Errors
    #[error("Upstream rejected request: {0}")]
    UpstreamRejected(String),

    #[error("Exhausted {attempts} retry attempts, last error: {last}")]
    ExhaustedRetries { attempts: u32, last: FetchError },

    // Pipeline Errors
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Run cancelled")]
    Cancelled,

    // Configuration Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // I/O & Serialization Errors
    #[error("File I/O error: {0}")]
    FileError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Deserialization failed: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, EtlError>;

impl EtlError {
    /// Check if the error aborts one symbol's run without stopping the others
    pub fn is_symbol_fatal(&self) -> bool {
        !matches!(self, EtlError::Cancelled | EtlError::ConfigError(_))
    }
}
