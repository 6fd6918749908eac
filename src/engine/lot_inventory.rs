//! Per-coin FIFO inventory of acquisition lots.

use crate::domain::{Coin, Decimal, UtcTime};
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LotError {
    #[error("invalid lot for {coin} at {time}: amount {amount}, countervalue {counter_value}")]
    InvalidLot {
        coin: Coin,
        time: UtcTime,
        amount: Decimal,
        counter_value: Decimal,
    },
    #[error("unit price of {coin} lot acquired at {time} drifted from {expected} to {actual}")]
    PriceDrift {
        coin: Coin,
        time: UtcTime,
        expected: Decimal,
        actual: Decimal,
    },
}

/// A quantity of `coin` acquired by giving up `counter_value_amount` of
/// `counter_value_coin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lot {
    pub coin: Coin,
    pub amount: Decimal,
    pub counter_value_amount: Decimal,
    pub counter_value_coin: Coin,
    pub acquired_at: UtcTime,
    /// True when the acquired quantity has already been credited to the ledger.
    pub booked: bool,
    unit_price: Decimal,
}

impl Lot {
    /// Counter value per unit, fixed when the lot was created.
    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    fn into_chunk(self) -> ConsumedChunk {
        ConsumedChunk {
            amount: self.amount,
            counter_value: self.counter_value_amount,
            counter_value_coin: self.counter_value_coin,
            unit_price: self.unit_price,
            acquired_at: self.acquired_at,
            booked: self.booked,
        }
    }

    /// Take `amount` out of the lot, which must hold strictly more than that.
    fn split_off(&mut self, amount: Decimal, tolerance: Decimal) -> Result<ConsumedChunk, LotError> {
        let remaining = self.amount - amount;
        let remaining_counter_value = remaining * self.unit_price;
        let chunk_counter_value = self.counter_value_amount - remaining_counter_value;

        let recomputed = remaining_counter_value
            .checked_div(remaining)
            .unwrap_or(self.unit_price);
        if !recomputed.approx_eq(self.unit_price, tolerance) {
            return Err(LotError::PriceDrift {
                coin: self.coin.clone(),
                time: self.acquired_at,
                expected: self.unit_price,
                actual: recomputed,
            });
        }

        self.amount = remaining;
        self.counter_value_amount = remaining_counter_value;

        Ok(ConsumedChunk {
            amount,
            counter_value: chunk_counter_value,
            counter_value_coin: self.counter_value_coin.clone(),
            unit_price: self.unit_price,
            acquired_at: self.acquired_at,
            booked: self.booked,
        })
    }
}

/// The part of a lot handed out by [`CoinBalance::consume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedChunk {
    pub amount: Decimal,
    pub counter_value: Decimal,
    pub counter_value_coin: Coin,
    pub unit_price: Decimal,
    pub acquired_at: UtcTime,
    pub booked: bool,
}

/// FIFO queue of lots for one coin.
#[derive(Debug, Clone)]
pub struct CoinBalance {
    coin: Coin,
    lots: VecDeque<Lot>,
    price_tolerance: Decimal,
    total_added: Decimal,
    total_consumed: Decimal,
}

impl CoinBalance {
    pub fn new(coin: Coin, price_tolerance: Decimal) -> Self {
        Self {
            coin,
            lots: VecDeque::new(),
            price_tolerance,
            total_added: Decimal::zero(),
            total_consumed: Decimal::zero(),
        }
    }

    /// Append a lot at the tail of the queue. A zero amount is ignored.
    pub fn add_lot(
        &mut self,
        amount: Decimal,
        counter_value_amount: Decimal,
        counter_value_coin: Coin,
        acquired_at: UtcTime,
        booked: bool,
    ) -> Result<(), LotError> {
        if amount.is_negative() || counter_value_amount.is_negative() {
            return Err(LotError::InvalidLot {
                coin: self.coin.clone(),
                time: acquired_at,
                amount,
                counter_value: counter_value_amount,
            });
        }
        let Some(unit_price) = counter_value_amount.checked_div(amount) else {
            return Ok(());
        };

        self.total_added += amount;
        self.lots.push_back(Lot {
            coin: self.coin.clone(),
            amount,
            counter_value_amount,
            counter_value_coin,
            acquired_at,
            booked,
            unit_price,
        });
        Ok(())
    }

    /// Consume up to `target` oldest-first. The result may fall short of the
    /// target when the inventory runs out.
    pub fn consume(&mut self, target: Decimal) -> Result<Vec<ConsumedChunk>, LotError> {
        self.consume_matching(target, |_| true)
    }

    /// Like [`consume`](Self::consume), restricted to lots accepted by `accept`.
    /// Skipped lots keep their position in the queue.
    pub fn consume_matching<F>(
        &mut self,
        target: Decimal,
        accept: F,
    ) -> Result<Vec<ConsumedChunk>, LotError>
    where
        F: Fn(&Lot) -> bool,
    {
        let mut remaining = target;
        let mut chunks = Vec::new();
        let mut index = 0;

        while remaining.is_positive() && index < self.lots.len() {
            if !accept(&self.lots[index]) {
                index += 1;
                continue;
            }

            let chunk = if self.lots[index].amount <= remaining {
                match self.lots.remove(index) {
                    Some(lot) => lot.into_chunk(),
                    None => break,
                }
            } else {
                self.lots[index].split_off(remaining, self.price_tolerance)?
            };

            remaining -= chunk.amount;
            self.total_consumed += chunk.amount;
            chunks.push(chunk);
        }

        Ok(chunks)
    }

    /// Sum of the amounts still held.
    pub fn total(&self) -> Decimal {
        self.lots.iter().map(|lot| lot.amount).sum()
    }

    pub fn total_added(&self) -> Decimal {
        self.total_added
    }

    pub fn total_consumed(&self) -> Decimal {
        self.total_consumed
    }

    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn t(hour: u32) -> UtcTime {
        UtcTime::from_ymd_hms(2025, 1, 1, hour, 0, 0).unwrap()
    }

    fn usdc_balance() -> CoinBalance {
        CoinBalance::new(Coin::new("USDC"), d("0.000000000001"))
    }

    #[test]
    fn test_consume_walks_oldest_first() {
        let mut balance = usdc_balance();
        balance.add_lot(d("1000"), d("1"), Coin::new("BTC"), t(2), false).unwrap();
        balance.add_lot(d("500"), d("0.5"), Coin::new("BTC"), t(3), false).unwrap();

        let chunks = balance.consume(d("1200")).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].amount, d("1000"));
        assert_eq!(chunks[0].acquired_at, t(2));
        assert_eq!(chunks[1].amount, d("200"));
        assert_eq!(chunks[1].counter_value, d("0.2"));
        assert_eq!(balance.total(), d("300"));
    }

    #[test]
    fn test_partial_draw_keeps_unit_price() {
        let mut balance = usdc_balance();
        balance.add_lot(d("750"), d("1"), Coin::new("BTC"), t(2), false).unwrap();
        let before = balance.lots().next().unwrap().unit_price();

        balance.consume(d("100")).unwrap();
        let lot = balance.lots().next().unwrap();
        assert_eq!(lot.unit_price(), before);
        let recomputed = lot.counter_value_amount.checked_div(lot.amount).unwrap();
        assert!(recomputed.approx_eq(before, d("0.000000000001")));
    }

    #[test]
    fn test_short_inventory_returns_what_it_has() {
        let mut balance = usdc_balance();
        balance.add_lot(d("10"), d("0.01"), Coin::new("BTC"), t(2), false).unwrap();
        let chunks = balance.consume(d("25")).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].amount, d("10"));
        assert!(balance.is_empty());
    }

    #[test]
    fn test_consume_matching_skips_other_countervalue_coins() {
        let mut balance = usdc_balance();
        balance.add_lot(d("100"), d("0.1"), Coin::new("ETH"), t(1), false).unwrap();
        balance.add_lot(d("100"), d("0.001"), Coin::new("BTC"), t(2), false).unwrap();

        let btc = Coin::new("BTC");
        let chunks = balance
            .consume_matching(d("150"), |lot| lot.counter_value_coin == btc)
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].counter_value_coin, btc);

        let remaining: Vec<&Lot> = balance.lots().collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].counter_value_coin, Coin::new("ETH"));
    }

    #[test]
    fn test_conservation_of_amounts() {
        let mut balance = usdc_balance();
        balance.add_lot(d("3"), d("1"), Coin::new("BTC"), t(1), false).unwrap();
        balance.add_lot(d("7"), d("2"), Coin::new("BTC"), t(2), true).unwrap();
        balance.consume(d("4.5")).unwrap();
        balance.consume(d("1")).unwrap();

        assert_eq!(balance.total_added() - balance.total_consumed(), balance.total());
        assert_eq!(balance.total(), d("4.5"));
    }

    #[test]
    fn test_negative_lot_is_rejected() {
        let mut balance = usdc_balance();
        let err = balance
            .add_lot(d("-1"), d("1"), Coin::new("BTC"), t(1), false)
            .unwrap_err();
        assert!(matches!(err, LotError::InvalidLot { .. }));
    }

    #[test]
    fn test_zero_lot_is_ignored() {
        let mut balance = usdc_balance();
        balance.add_lot(d("0"), d("0"), Coin::new("BTC"), t(1), false).unwrap();
        assert!(balance.is_empty());
        assert!(balance.total_added().is_zero());
    }
}
