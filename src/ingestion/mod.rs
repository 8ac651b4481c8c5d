//! Data ingestion module - acquisition, refinement and aggregation of DVF transactions

pub mod aggregate;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod parse;
pub mod pipeline;
pub mod retry;
pub mod types;
pub mod utils;

pub use aggregate::{aggregate, AggregateReport};
pub use error::{IngestError, Result};
pub use pipeline::{analyze, MarketAnalysis};
pub use types::*;
