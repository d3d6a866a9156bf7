pub mod client;
pub mod retry;
pub mod walker;

pub use client::{CryptoCompareClient, ObservationSource, PageRequest};
pub use retry::{RetryPolicy, ShutdownSignal};
pub use walker::{PageWalker, WalkPlan};
