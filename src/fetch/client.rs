/// CryptoCompare history REST client
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;
use crate::types::Granularity;

/// Parameters for one page request against the remote source
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub symbol: String,
    pub quote_currency: String,
    pub page_limit: u32,
    /// Upper timestamp bound: the page contains observations with `time <= cursor`
    pub cursor: i64,
    pub granularity: Granularity,
}

/// Seam over the paginated remote source.
///
/// Records come back as raw JSON values so the structural check owns field
/// validation; pages may arrive in either internal order.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Value>, FetchError>;
}

#[derive(Debug, Deserialize)]
struct HistoryEnvelope {
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Data")]
    data: Option<HistoryData>,
}

#[derive(Debug, Deserialize)]
struct HistoryData {
    #[serde(rename = "Data", default)]
    data: Vec<Value>,
}

pub struct CryptoCompareClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl CryptoCompareClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        CryptoCompareClient {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ObservationSource for CryptoCompareClient {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Value>, FetchError> {
        let url = format!("{}/data/v2/{}", self.base_url, request.granularity.endpoint());

        let response = self
            .client
            .get(&url)
            .query(&[
                ("fsym", request.symbol.clone()),
                ("tsym", request.quote_currency.clone()),
                ("limit", request.page_limit.to_string()),
                ("toTs", request.cursor.to_string()),
                ("api_key", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(FetchError::Transient(format!("upstream returned {}", status)));
        }
        if status.is_client_error() {
            return Err(FetchError::Permanent(format!("upstream returned {}", status)));
        }

        let body = response.text().await.map_err(classify_request_error)?;

        let envelope: HistoryEnvelope = serde_json::from_str(&body)
            .map_err(|e| FetchError::Permanent(format!("malformed response body: {}", e)))?;

        if envelope.response != "Success" {
            return Err(FetchError::Permanent(format!(
                "upstream error response: {}",
                envelope.message
            )));
        }

        let records = envelope.data.map(|d| d.data).unwrap_or_default();
        debug!(
            symbol = %request.symbol,
            cursor = request.cursor,
            records = records.len(),
            "received page"
        );

        Ok(records)
    }
}

fn classify_request_error(err: reqwest::Error) -> FetchError {
    if err.is_builder() {
        FetchError::Permanent(format!("request construction failed: {}", err))
    } else {
        // Connection resets, timeouts, interrupted bodies: all retryable
        FetchError::Transient(format!("network error: {}", err))
    }
}
