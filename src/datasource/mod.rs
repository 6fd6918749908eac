//! Event source abstraction for loading the exchange transaction history.

use crate::domain::RawEvent;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod csv_history;
pub mod mock;

pub use csv_history::{CsvHistorySource, HistoryCsvRow};
pub use mock::MockEventSource;

/// Source of raw account events.
///
/// Implementations apply the row-level clean-up of their format (sign
/// correction, skipped coins, loan/repayment time shifts) and return events in
/// file order; sorting is the engine's concern.
#[async_trait]
pub trait EventSource: Send + Sync + fmt::Debug {
    async fn fetch_events(&self) -> Result<Vec<RawEvent>, DataSourceError>;
}

/// Error type for event source operations.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("Parse error in {path} line {line}: {message}")]
    Parse {
        path: String,
        line: u64,
        message: String,
    },
    #[error("Unknown operation {operation:?} in {path} line {line}")]
    UnknownOperation {
        path: String,
        line: u64,
        operation: String,
    },
}
