//! Per-coin cumulative balance of emitted ledger records.

use crate::domain::{Coin, Decimal, LedgerRecord};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct RunningBalance {
    balances: BTreeMap<Coin, Decimal>,
}

impl RunningBalance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a record and return the coin's new balance.
    pub fn apply(&mut self, record: &LedgerRecord) -> Decimal {
        let balance = self
            .balances
            .entry(record.coin.clone())
            .or_insert_with(Decimal::zero);
        *balance += record.signed_quantity();
        *balance
    }

    pub fn get(&self, coin: &Coin) -> Decimal {
        self.balances.get(coin).copied().unwrap_or_default()
    }
}
