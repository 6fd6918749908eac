//! Historical coin prices used for countervalue reporting.

use crate::domain::{Coin, Decimal, UtcTime};
use thiserror::Error;

pub mod daily;

pub use daily::DailyPriceTable;

/// Read-only price lookup. Implementations are built once and then shared.
pub trait PriceTable: Send + Sync {
    /// Countervalue price of one unit of `coin` at `time`.
    fn get_price(&self, coin: &Coin, time: UtcTime) -> Result<Decimal, PriceError>;
}

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("no price recorded for {coin} on {time}")]
    NotFound { coin: Coin, time: UtcTime },
    #[error("failed to read price file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed price file {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("invalid price row in {path}: {message}")]
    Parse { path: String, message: String },
}
