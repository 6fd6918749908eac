pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod output;
pub mod prices;

pub use config::Config;
pub use datasource::{CsvHistorySource, DataSourceError, EventSource, MockEventSource};
pub use domain::{
    AccountScope, Coin, Decimal, EventKind, LedgerRecord, Movement, RawEvent, RecordKind, UtcTime,
};
pub use engine::{Account, LedgerError, LedgerOutcome, LedgerSettings, MarginAccount};
pub use error::AppError;
pub use orchestration::{Pipeline, RunReport};
pub use prices::{DailyPriceTable, PriceError, PriceTable};
