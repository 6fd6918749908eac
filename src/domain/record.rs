//! Tatax ledger records, the reportable output unit.

use crate::domain::{Coin, Decimal, EventKind, LedgerMapping, RawEvent, UtcTime};
use serde::{Deserialize, Serialize};

/// Tatax movement type.
///
/// Variant order is the tie-break order used when sorting exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Deposit,
    Credit,
    Earn,
    Airdrop,
    Debit,
    ExchangeFee,
    Withdrawal,
}

impl RecordKind {
    /// The `MovementType` column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Deposit => "DEPOSIT",
            RecordKind::Credit => "CREDIT",
            RecordKind::Earn => "EARN",
            RecordKind::Airdrop => "AIRDROP",
            RecordKind::Debit => "DEBIT",
            RecordKind::ExchangeFee => "EXCHANGE_FEE",
            RecordKind::Withdrawal => "WITHDRAWAL",
        }
    }

    /// True for kinds that take quantity out of the wallet.
    pub fn negates_amount(&self) -> bool {
        matches!(
            self,
            RecordKind::Debit | RecordKind::ExchangeFee | RecordKind::Withdrawal
        )
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One tax-reportable movement. `quantity` is always a magnitude.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub coin: Coin,
    pub time: UtcTime,
    pub kind: RecordKind,
    pub quantity: Decimal,
    pub countervalue: Option<Decimal>,
    pub countervalue_coin: Option<Coin>,
}

impl LedgerRecord {
    pub fn new(coin: Coin, time: UtcTime, kind: RecordKind, quantity: Decimal) -> Self {
        Self {
            coin,
            time,
            kind,
            quantity,
            countervalue: None,
            countervalue_coin: None,
        }
    }

    pub fn with_countervalue(
        coin: Coin,
        time: UtcTime,
        kind: RecordKind,
        quantity: Decimal,
        countervalue: Decimal,
        countervalue_coin: Coin,
    ) -> Self {
        Self {
            coin,
            time,
            kind,
            quantity,
            countervalue: Some(countervalue),
            countervalue_coin: Some(countervalue_coin),
        }
    }

    /// Map a raw event to the record it is reported as, or `None` for ignored kinds.
    pub fn from_raw_event(event: &RawEvent) -> Option<Self> {
        let kind = match event.kind.ledger_mapping() {
            LedgerMapping::Ignore => return None,
            LedgerMapping::Fixed(kind) => kind,
            LedgerMapping::DecideByAmount => {
                let transfer = event.kind == EventKind::TransferAccount;
                match (event.change.is_negative(), transfer) {
                    (true, true) => RecordKind::Withdrawal,
                    (true, false) => RecordKind::Debit,
                    (false, true) => RecordKind::Deposit,
                    (false, false) => RecordKind::Credit,
                }
            }
        };
        Some(Self::new(
            event.coin.clone(),
            event.time,
            kind,
            event.change.abs(),
        ))
    }

    /// Quantity with the sign of its effect on the wallet balance.
    pub fn signed_quantity(&self) -> Decimal {
        if self.kind.negates_amount() {
            -self.quantity
        } else {
            self.quantity
        }
    }

    pub fn to_csv_row(&self) -> TataxCsvRow {
        let countervalue = self
            .countervalue
            .map(|value| value.to_fixed_string(12))
            .unwrap_or_default();
        let countervalue_coin = self
            .countervalue_coin
            .as_ref()
            .map(|coin| coin.to_string())
            .unwrap_or_default();
        TataxCsvRow {
            symbol: self.coin.to_string(),
            token_address: String::new(),
            timestamp: self.time.format(),
            movement_type: self.kind.as_str().to_string(),
            quantity: self.quantity.to_fixed_string(12),
            countervalue: countervalue.clone(),
            symbol_countervalue: countervalue_coin.clone(),
            user_countervalue: countervalue.clone(),
            user_symbol_countervalue: countervalue_coin.clone(),
            source_countervalue: countervalue,
            source_symbol_countervalue: countervalue_coin,
        }
    }
}

impl std::fmt::Display for LedgerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} at {}", self.kind, self.quantity, self.coin, self.time)?;
        if let (Some(value), Some(coin)) = (&self.countervalue, &self.countervalue_coin) {
            write!(f, " (countervalue {} {})", value, coin)?;
        }
        Ok(())
    }
}

/// Row layout of the Tatax import file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TataxCsvRow {
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "TokenAddress")]
    pub token_address: String,
    #[serde(rename = "TimeStamp")]
    pub timestamp: String,
    #[serde(rename = "MovementType")]
    pub movement_type: String,
    #[serde(rename = "Quantity")]
    pub quantity: String,
    #[serde(rename = "Countervalue")]
    pub countervalue: String,
    #[serde(rename = "SymbolCountervalue")]
    pub symbol_countervalue: String,
    #[serde(rename = "UserCountervalue")]
    pub user_countervalue: String,
    #[serde(rename = "UserSymbolCountervalue")]
    pub user_symbol_countervalue: String,
    #[serde(rename = "SourceCountervalue")]
    pub source_countervalue: String,
    #[serde(rename = "SourceSymbolCountervalue")]
    pub source_symbol_countervalue: String,
}
