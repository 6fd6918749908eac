//! Normalized movements replayed by the ledger engine.

use crate::domain::{Coin, Decimal, UtcTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SingleLegKind {
    Transfer,
    Loan,
    Repayment,
    StandaloneFee,
}

/// A movement touching one coin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleLeg {
    pub kind: SingleLegKind,
    pub time: UtcTime,
    pub coin: Coin,
    pub quantity: Decimal,
}

impl SingleLeg {
    pub fn new(kind: SingleLegKind, time: UtcTime, coin: Coin, quantity: Decimal) -> Self {
        Self {
            kind,
            time,
            coin,
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeLeg {
    pub coin: Coin,
    pub quantity: Decimal,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SwapError {
    #[error("swap at {time} sells a positive quantity {quantity} {coin}")]
    PositiveSold {
        time: UtcTime,
        coin: Coin,
        quantity: Decimal,
    },
    #[error("swap at {time} buys a negative quantity {quantity} {coin}")]
    NegativeBought {
        time: UtcTime,
        coin: Coin,
        quantity: Decimal,
    },
    #[error("swap at {time} sells and buys the same coin {coin}")]
    SameCoin { time: UtcTime, coin: Coin },
}

/// A sell leg and a buy leg executed at the same instant, with an optional fee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Swap {
    pub time: UtcTime,
    pub sold_coin: Coin,
    /// Always <= 0.
    pub sold_quantity: Decimal,
    pub bought_coin: Coin,
    /// Always >= 0.
    pub bought_quantity: Decimal,
    pub fee: Option<FeeLeg>,
}

impl Swap {
    pub fn new(
        time: UtcTime,
        sold_coin: Coin,
        sold_quantity: Decimal,
        bought_coin: Coin,
        bought_quantity: Decimal,
    ) -> Result<Self, SwapError> {
        if sold_quantity.is_positive() {
            return Err(SwapError::PositiveSold {
                time,
                coin: sold_coin,
                quantity: sold_quantity,
            });
        }
        if bought_quantity.is_negative() {
            return Err(SwapError::NegativeBought {
                time,
                coin: bought_coin,
                quantity: bought_quantity,
            });
        }
        if sold_coin == bought_coin {
            return Err(SwapError::SameCoin {
                time,
                coin: sold_coin,
            });
        }
        Ok(Self {
            time,
            sold_coin,
            sold_quantity,
            bought_coin,
            bought_quantity,
            fee: None,
        })
    }

    pub fn with_fee(mut self, coin: Coin, quantity: Decimal) -> Self {
        self.fee = Some(FeeLeg { coin, quantity });
        self
    }

    /// Magnitude of the sold leg.
    pub fn sold_amount(&self) -> Decimal {
        self.sold_quantity.abs()
    }

    /// Bought units received per sold unit; zero when nothing was sold.
    pub fn execution_price(&self) -> Decimal {
        self.bought_quantity
            .checked_div(self.sold_amount())
            .unwrap_or_else(Decimal::zero)
    }

    /// Sold units paid per bought unit, the way an exchange quotes the pair.
    pub fn quote_price(&self) -> Option<Decimal> {
        self.sold_amount().checked_div(self.bought_quantity)
    }

    /// Attach a fee leg, merging with an existing fee in the same coin.
    ///
    /// Returns false, leaving the swap untouched, when a fee in another coin is
    /// already attached.
    pub fn attach_fee(&mut self, coin: &Coin, quantity: Decimal) -> bool {
        match &mut self.fee {
            None => {
                self.fee = Some(FeeLeg {
                    coin: coin.clone(),
                    quantity,
                });
                true
            }
            Some(fee) if &fee.coin == coin => {
                fee.quantity += quantity;
                true
            }
            Some(_) => false,
        }
    }
}

/// Closed set of movements the engine knows how to replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Movement {
    SingleLeg(SingleLeg),
    Swap(Swap),
}

impl Movement {
    pub fn time(&self) -> UtcTime {
        match self {
            Movement::SingleLeg(leg) => leg.time,
            Movement::Swap(swap) => swap.time,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Movement::SingleLeg(leg) => {
                format!("{:?} {} {} at {}", leg.kind, leg.quantity, leg.coin, leg.time)
            }
            Movement::Swap(swap) => {
                let mut text = format!(
                    "Swap {} {} -> {} {} at {}",
                    swap.sold_amount(),
                    swap.sold_coin,
                    swap.bought_quantity,
                    swap.bought_coin,
                    swap.time
                );
                if let Some(fee) = &swap.fee {
                    text.push_str(&format!(" fee {} {}", fee.quantity, fee.coin));
                }
                text
            }
        }
    }
}
