/// Backward cursor pagination over the remote history endpoint
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::fetch::client::{ObservationSource, PageRequest};
use crate::fetch::retry::{RetryPolicy, ShutdownSignal};
use crate::types::{Granularity, Observation};
use crate::validate;

/// Inputs for one symbol's walk
#[derive(Debug, Clone)]
pub struct WalkPlan {
    pub symbol: String,
    pub quote_currency: String,
    pub granularity: Granularity,
    /// Inclusive, epoch seconds
    pub start_boundary: i64,
    /// Inclusive, epoch seconds; the initial cursor
    pub end_boundary: i64,
    pub page_limit: u32,
}

/// Assembles a complete raw series by paging backward from the end boundary.
///
/// Each page is fetched through the retry policy. Fetch failures are fatal
/// for the whole walk: either the full series comes back or nothing does.
pub struct PageWalker {
    source: Arc<dyn ObservationSource>,
    retry: RetryPolicy,
}

impl PageWalker {
    pub fn new(source: Arc<dyn ObservationSource>, retry: RetryPolicy) -> Self {
        PageWalker { source, retry }
    }

    /// Walk the full window, returning the raw series sorted ascending by time.
    ///
    /// Structurally invalid records are dropped with a warning and never abort
    /// the walk. The series may contain records earlier than `start_boundary`
    /// picked up on the final page; the normalization date filter trims them.
    pub async fn walk(
        &self,
        plan: &WalkPlan,
        shutdown: &mut ShutdownSignal,
    ) -> Result<Vec<Observation>> {
        let mut series: Vec<Observation> = Vec::new();
        let mut cursor = plan.end_boundary;
        let mut pages = 0usize;
        let mut dropped = 0usize;

        loop {
            let request = PageRequest {
                symbol: plan.symbol.clone(),
                quote_currency: plan.quote_currency.clone(),
                page_limit: plan.page_limit,
                cursor,
                granularity: plan.granularity,
            };

            let source = Arc::clone(&self.source);
            let page = self
                .retry
                .execute(|| source.fetch_page(&request), shutdown)
                .await?;
            pages += 1;

            if page.is_empty() {
                debug!(symbol = %plan.symbol, cursor, "empty page, source has no more history");
                break;
            }

            let mut earliest: Option<i64> = None;
            for raw in &page {
                match validate::parse_observation(raw) {
                    Ok(obs) => {
                        earliest = Some(earliest.map_or(obs.time, |t| t.min(obs.time)));
                        series.push(obs);
                    }
                    Err(violation) => {
                        dropped += 1;
                        warn!(
                            symbol = %plan.symbol,
                            error = %violation,
                            "dropping structurally invalid record"
                        );
                    }
                }
            }

            let Some(earliest) = earliest else {
                debug!(symbol = %plan.symbol, cursor, "page had no usable records, stopping");
                break;
            };

            if earliest <= plan.start_boundary {
                debug!(symbol = %plan.symbol, earliest, "reached start boundary");
                break;
            }

            if earliest >= cursor {
                // A page that does not move the cursor backward would loop forever
                warn!(
                    symbol = %plan.symbol,
                    cursor,
                    earliest,
                    "cursor did not advance, stopping walk"
                );
                break;
            }

            cursor = earliest;
        }

        series.sort_by_key(|obs| obs.time);

        info!(
            symbol = %plan.symbol,
            pages,
            records = series.len(),
            dropped,
            "walk complete"
        );

        Ok(series)
    }
}
