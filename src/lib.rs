pub mod types;
pub mod error;
pub mod config;
pub mod fetch;
pub mod validate;
pub mod normalize;
pub mod sink;
pub mod pipeline;

pub use error::{EtlError, FetchError, Result};
pub use types::*;
