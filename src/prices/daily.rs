//! Day-granularity price table loaded from `*.prices` kline exports.

use super::{PriceError, PriceTable};
use crate::domain::{Coin, Decimal, UtcTime};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

const PRICE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";
const INVERTED_SCALE: u32 = 16;

#[derive(Debug, Deserialize)]
struct PriceRow {
    #[serde(rename = "Symbol")]
    symbol: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Close")]
    close: String,
}

#[derive(Debug, Clone, Default)]
pub struct DailyPriceTable {
    prices: HashMap<(Coin, NaiveDate), Decimal>,
}

impl DailyPriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, coin: Coin, date: NaiveDate, price: Decimal) {
        self.prices.insert((coin, date), price);
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Load every `*.prices` file of `dir`, in file name order.
    ///
    /// Rows of `inverted` symbols are quoted the other way round in the export
    /// and are stored as `1 / close`.
    pub fn load_dir(dir: &Path, inverted: &[Coin]) -> Result<Self, PriceError> {
        let io_err = |source| PriceError::Io {
            path: dir.display().to_string(),
            source,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("prices") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut table = Self::new();
        for path in &paths {
            let file = std::fs::File::open(path).map_err(|source| PriceError::Io {
                path: path.display().to_string(),
                source,
            })?;
            table.load_reader(file, &path.display().to_string(), inverted)?;
        }
        info!(files = paths.len(), prices = table.len(), "Price table loaded");
        Ok(table)
    }

    /// Load one CSV source with header `Symbol,Date,Open,High,Low,Close,Volume`.
    pub fn load_reader<R: Read>(
        &mut self,
        reader: R,
        source_name: &str,
        inverted: &[Coin],
    ) -> Result<(), PriceError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        for row in csv_reader.deserialize::<PriceRow>() {
            let row = row.map_err(|source| PriceError::Csv {
                path: source_name.to_string(),
                source,
            })?;
            let parse_err = |message: String| PriceError::Parse {
                path: source_name.to_string(),
                message,
            };

            let time = NaiveDateTime::parse_from_str(row.date.trim(), PRICE_DATE_FORMAT)
                .map_err(|e| parse_err(format!("date {:?}: {}", row.date, e)))?;
            let close = Decimal::from_str_canonical(&row.close)
                .map_err(|e| parse_err(format!("close {:?}: {}", row.close, e)))?;

            let coin = Coin::new(row.symbol.trim());
            let price = if inverted.contains(&coin) {
                Decimal::one()
                    .checked_div(close)
                    .map(|value| value.round_dp(INVERTED_SCALE))
                    .ok_or_else(|| parse_err(format!("zero close for {}", coin)))?
            } else {
                close
            };
            debug!(coin = %coin, date = %time.date(), price = %price, "Price row");
            self.insert(coin, time.date(), price);
        }
        Ok(())
    }
}

impl PriceTable for DailyPriceTable {
    fn get_price(&self, coin: &Coin, time: UtcTime) -> Result<Decimal, PriceError> {
        self.prices
            .get(&(coin.clone(), time.date()))
            .copied()
            .ok_or_else(|| PriceError::NotFound {
                coin: coin.clone(),
                time,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Symbol,Date,Open,High,Low,Close,Volume\n\
BTC,2025-01-01 00:00,90000,95000,89000,91000.5,12\n\
USDC,2025-01-01 00:00,1.05,1.06,1.04,1.25,100000\n";

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_lookup_is_by_day() {
        let mut table = DailyPriceTable::new();
        table.load_reader(SAMPLE.as_bytes(), "sample", &[]).unwrap();
        let evening = UtcTime::from_ymd_hms(2025, 1, 1, 23, 59, 59).unwrap();
        assert_eq!(table.get_price(&Coin::new("BTC"), evening).unwrap(), d("91000.5"));
    }

    #[test]
    fn test_inverted_symbols_store_reciprocal() {
        let mut table = DailyPriceTable::new();
        table
            .load_reader(SAMPLE.as_bytes(), "sample", &[Coin::new("USDC")])
            .unwrap();
        let time = UtcTime::from_ymd_hms(2025, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(table.get_price(&Coin::new("USDC"), time).unwrap(), d("0.8"));
    }

    #[test]
    fn test_missing_day_is_not_found() {
        let mut table = DailyPriceTable::new();
        table.load_reader(SAMPLE.as_bytes(), "sample", &[]).unwrap();
        let next_day = UtcTime::from_ymd_hms(2025, 1, 2, 0, 0, 0).unwrap();
        assert!(matches!(
            table.get_price(&Coin::new("BTC"), next_day),
            Err(PriceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_malformed_close_is_rejected() {
        let bad = "Symbol,Date,Open,High,Low,Close,Volume\nBTC,2025-01-01 00:00,1,1,1,abc,1\n";
        let mut table = DailyPriceTable::new();
        assert!(matches!(
            table.load_reader(bad.as_bytes(), "bad", &[]),
            Err(PriceError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_dir_reads_only_price_files() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("btc.prices"), SAMPLE).unwrap();
        std::fs::write(dir.path().join("history.csv"), "not,a,price\n").unwrap();
        let table = DailyPriceTable::load_dir(dir.path(), &[]).unwrap();
        assert_eq!(table.len(), 2);
    }
}
