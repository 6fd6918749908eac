//! Pure computation engine for the margin ledger.

use crate::domain::{AccountScope, Coin, Decimal, EventKind, SwapError, UtcTime};
use crate::prices::PriceError;
use thiserror::Error;

pub mod account;
pub mod coherence;
pub mod lot_inventory;
pub mod margin_account;
pub mod normalizer;
pub mod running_balance;

pub use account::{Account, LedgerOutcome};
pub use coherence::{CoherenceError, CoherenceReport};
pub use lot_inventory::{CoinBalance, ConsumedChunk, Lot, LotError};
pub use margin_account::{Emitted, MarginAccount};
pub use normalizer::normalize;
pub use running_balance::RunningBalance;

/// Tolerances and reporting choices shared by every replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Largest negative running balance that is corrected instead of rejected.
    pub balance_tolerance: Decimal,
    /// Allowed drift of a lot unit price, and of a P&L sign.
    pub price_tolerance: Decimal,
    /// Countervalue symbol of corrective entries.
    pub countervalue_coin: Coin,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            balance_tolerance: Decimal::new(rust_decimal::Decimal::new(1, 8)),
            price_tolerance: Decimal::new(rust_decimal::Decimal::new(1, 12)),
            countervalue_coin: Coin::new("EUR"),
        }
    }
}

/// Fatal conditions raised while normalizing or replaying an account.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no handler for {kind} of {coin} at {time}")]
    UnmanagedKind {
        kind: EventKind,
        coin: Coin,
        time: UtcTime,
    },
    #[error("unmatched swap leg: {kind} of {coin} at {time}")]
    UnmatchedSwapLeg {
        kind: EventKind,
        coin: Coin,
        time: UtcTime,
    },
    #[error(transparent)]
    InvalidSwap(#[from] SwapError),
    #[error(transparent)]
    Lot(#[from] LotError),
    #[error("invalid quantity {quantity} {coin} for {context} at {time}")]
    InvalidQuantity {
        context: &'static str,
        coin: Coin,
        time: UtcTime,
        quantity: Decimal,
    },
    #[error("loan balance of {coin} is {balance} after movement at {time}")]
    NegativeLoanBalance {
        coin: Coin,
        time: UtcTime,
        balance: Decimal,
    },
    #[error("running balance of {coin} is {balance} at {time}, beyond tolerance")]
    NegativeRunningBalance {
        coin: Coin,
        time: UtcTime,
        balance: Decimal,
    },
    #[error("profit on {coin} at {time} computed negative: {value}")]
    ProfitSignMismatch {
        coin: Coin,
        time: UtcTime,
        value: Decimal,
    },
    #[error("loss on {coin} at {time} computed positive: {value}")]
    LossSignMismatch {
        coin: Coin,
        time: UtcTime,
        value: Decimal,
    },
    #[error(transparent)]
    MissingPrice(#[from] PriceError),
    #[error("event of {coin} at {time} belongs to {actual}, not to {expected}")]
    WrongAccountScope {
        expected: AccountScope,
        actual: AccountScope,
        coin: Coin,
        time: UtcTime,
    },
    #[error("{0} accounts are not replayed by the margin ledger")]
    UnsupportedScope(AccountScope),
}
