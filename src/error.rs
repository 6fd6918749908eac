use crate::config::ConfigError;
use crate::datasource::DataSourceError;
use crate::engine::{CoherenceError, LedgerError};
use crate::orchestration::ValidationError;
use crate::output::OutputError;
use crate::prices::PriceError;
use thiserror::Error;

/// Any failure that aborts a run.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Ingestion failed: {0}")]
    DataSource(#[from] DataSourceError),
    #[error("Price table error: {0}")]
    Price(#[from] PriceError),
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Ledger replay failed: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Coherence check failed: {0}")]
    Coherence(#[from] CoherenceError),
    #[error("Output failed: {0}")]
    Output(#[from] OutputError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Coin, Decimal, UtcTime};

    #[test]
    fn test_display_wraps_layer_error() {
        let err: AppError = CoherenceError::NegativeCumulative {
            coin: Coin::new("BTC"),
            time: UtcTime::from_ymd_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            cumulative: Decimal::from_str_canonical("-1").unwrap(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Coherence check failed: cumulative balance of BTC is -1 at 2025-01-01 00:00:00"
        );
    }
}
