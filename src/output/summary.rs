//! JSON run summary.

use super::OutputError;
use crate::domain::{AccountScope, Coin, Decimal, LedgerRecord};
use crate::engine::LedgerOutcome;
use crate::prices::PriceTable;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    pub account: String,
    pub event_count: usize,
    pub record_count: usize,
    pub profit_and_loss_count: usize,
    pub realized_by_coin: BTreeMap<Coin, Decimal>,
    /// Realized P&L valued in the countervalue coin; coins without a price are absent.
    pub realized_countervalue: BTreeMap<Coin, Decimal>,
    pub realized_countervalue_total: Decimal,
    pub unpriced_coins: Vec<Coin>,
    pub loan_balances: BTreeMap<Coin, Decimal>,
    pub lot_totals: BTreeMap<Coin, Decimal>,
    /// Final per-coin totals of the post-replay coherence walk.
    pub coherence_totals: BTreeMap<Coin, Decimal>,
}

impl AccountSummary {
    /// Summarize an account outcome. Realized P&L of each coin is priced on the
    /// day of that coin's last P&L record.
    pub fn build(
        scope: AccountScope,
        event_count: usize,
        outcome: &LedgerOutcome,
        countervalue_coin: &Coin,
        prices: &dyn PriceTable,
    ) -> Self {
        let mut realized_countervalue = BTreeMap::new();
        let mut unpriced_coins = Vec::new();

        for (coin, amount) in &outcome.realized_by_coin {
            if coin == countervalue_coin {
                realized_countervalue.insert(coin.clone(), *amount);
                continue;
            }
            let Some(last) = last_record_of(&outcome.profit_and_losses, coin) else {
                continue;
            };
            match prices.get_price(coin, last.time) {
                Ok(price) => {
                    realized_countervalue.insert(coin.clone(), *amount * price);
                }
                Err(e) => {
                    warn!(account = %scope, coin = %coin, error = %e, "Realized P&L left unpriced");
                    unpriced_coins.push(coin.clone());
                }
            }
        }

        Self {
            account: scope.label().to_string(),
            event_count,
            record_count: outcome.records.len(),
            profit_and_loss_count: outcome.profit_and_losses.len(),
            realized_by_coin: outcome.realized_by_coin.clone(),
            realized_countervalue_total: realized_countervalue.values().sum(),
            realized_countervalue,
            unpriced_coins,
            loan_balances: outcome.loan_balances.clone(),
            lot_totals: outcome.lot_totals.clone(),
            coherence_totals: BTreeMap::new(),
        }
    }
}

fn last_record_of<'a>(records: &'a [LedgerRecord], coin: &Coin) -> Option<&'a LedgerRecord> {
    records
        .iter()
        .filter(|record| &record.coin == coin)
        .max_by_key(|record| record.time)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_label: String,
    pub countervalue_coin: Coin,
    pub raw_event_count: usize,
    pub accounts: Vec<AccountSummary>,
}

impl RunSummary {
    pub fn write(&self, path: &Path) -> Result<(), OutputError> {
        let file = std::fs::File::create(path).map_err(|source| OutputError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|source| OutputError::Json {
            path: path.display().to_string(),
            source,
        })?;
        writer.flush().map_err(|source| OutputError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}
