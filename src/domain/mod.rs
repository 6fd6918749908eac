//! Domain types for the margin ledger.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: UtcTime, Coin, AccountScope
//! - Raw exchange events and Tatax ledger records
//! - Normalized movements and the stable event ordering used to build them

pub mod decimal;
pub mod event;
pub mod movement;
pub mod ordering;
pub mod primitives;
pub mod record;

pub use decimal::Decimal;
pub use event::{EventKind, LedgerMapping, RawEvent};
pub use movement::{FeeLeg, Movement, SingleLeg, SingleLegKind, Swap, SwapError};
pub use ordering::{operation_rank, sort_events_deterministic, EventOrderingKey};
pub use primitives::{AccountScope, Coin, UtcTime, TIMESTAMP_FORMAT};
pub use record::{LedgerRecord, RecordKind, TataxCsvRow};
