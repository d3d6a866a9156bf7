/// Bounded-attempt retry with a fixed inter-attempt delay
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{EtlError, FetchError, Result};

/// Cancellation flag: flipped to `true` once, observed at every blocking point
pub type ShutdownSignal = tokio::sync::watch::Receiver<bool>;

/// A signal that never fires, for callers without a cancellation source
pub fn never_shutdown() -> ShutdownSignal {
    let (tx, rx) = tokio::sync::watch::channel(false);
    // Keep the sender alive so the receiver never observes a closed channel
    std::mem::forget(tx);
    rx
}

async fn wait_for_shutdown(signal: &mut ShutdownSignal) {
    loop {
        if *signal.borrow() {
            return;
        }
        if signal.changed().await.is_err() {
            // Sender gone without ever cancelling; block forever
            std::future::pending::<()>().await;
        }
    }
}

/// Retry policy for a single remote call: constant backoff, no jitter.
///
/// The attempt counter is scoped to one `execute` call, so each page fetch
/// gets the full budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Invoke `op` until it succeeds, a permanent failure surfaces, or the
    /// attempt budget is spent. Only transient failures are retried.
    pub async fn execute<T, F, Fut>(&self, mut op: F, shutdown: &mut ShutdownSignal) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, FetchError>>,
    {
        let mut last = None;

        for attempt in 1..=self.max_attempts {
            if *shutdown.borrow() {
                return Err(EtlError::Cancelled);
            }

            // The in-flight call itself is cancellable, not just the sleep
            let outcome = tokio::select! {
                result = op() => result,
                _ = wait_for_shutdown(shutdown) => return Err(EtlError::Cancelled),
            };

            match outcome {
                Ok(value) => {
                    debug!(attempt, "fetch attempt succeeded");
                    return Ok(value);
                }
                Err(FetchError::Permanent(msg)) => {
                    warn!(attempt, error = %msg, "upstream rejected request, not retrying");
                    return Err(EtlError::UpstreamRejected(msg));
                }
                Err(err @ FetchError::Transient(_)) => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "transient fetch failure"
                    );
                    last = Some(err);

                    if attempt < self.max_attempts {
                        tokio::select! {
                            _ = tokio::time::sleep(self.delay) => {}
                            _ = wait_for_shutdown(shutdown) => return Err(EtlError::Cancelled),
                        }
                    }
                }
            }
        }

        Err(EtlError::ExhaustedRetries {
            attempts: self.max_attempts,
            last: last.unwrap_or_else(|| FetchError::Transient("no attempt executed".to_string())),
        })
    }
}
