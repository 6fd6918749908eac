//! Cumulative-balance-never-negative checks on raw input and derived output.
//!
//! Each coin is walked independently, so the walks run in parallel on the
//! blocking pool.

use crate::domain::{Coin, Decimal, LedgerRecord, RawEvent, UtcTime};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CoherenceError {
    #[error("cumulative balance of {coin} is {cumulative} at {time}")]
    NegativeCumulative {
        coin: Coin,
        time: UtcTime,
        cumulative: Decimal,
    },
    #[error("coherence task failed: {0}")]
    TaskFailed(String),
}

/// Final cumulative balance per coin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoherenceReport {
    pub totals: BTreeMap<Coin, Decimal>,
}

type Entries = BTreeMap<Coin, Vec<(UtcTime, Decimal)>>;

/// Walk one coin's movements sorted by time, larger changes first on ties.
pub fn check_coin(coin: &Coin, mut entries: Vec<(UtcTime, Decimal)>) -> Result<Decimal, CoherenceError> {
    entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));
    let mut cumulative = Decimal::zero();
    for (time, change) in entries {
        cumulative += change;
        if cumulative.is_negative() {
            return Err(CoherenceError::NegativeCumulative {
                coin: coin.clone(),
                time,
                cumulative,
            });
        }
    }
    Ok(cumulative)
}

fn raw_entries(events: &[RawEvent]) -> Entries {
    let mut entries = Entries::new();
    for event in events {
        entries
            .entry(event.coin.clone())
            .or_default()
            .push((event.time, event.change));
    }
    entries
}

fn record_entries(records: &[LedgerRecord]) -> Entries {
    let mut entries = Entries::new();
    for record in records {
        entries
            .entry(record.coin.clone())
            .or_default()
            .push((record.time, record.signed_quantity()));
    }
    entries
}

fn check_sequential(entries: Entries) -> Result<CoherenceReport, CoherenceError> {
    let mut report = CoherenceReport::default();
    for (coin, coin_entries) in entries {
        let total = check_coin(&coin, coin_entries)?;
        report.totals.insert(coin, total);
    }
    Ok(report)
}

async fn check_parallel(entries: Entries) -> Result<CoherenceReport, CoherenceError> {
    let walks = entries.into_iter().map(|(coin, coin_entries)| async move {
        let total = tokio::task::spawn_blocking({
            let coin = coin.clone();
            move || check_coin(&coin, coin_entries)
        })
        .await
        .map_err(|e| CoherenceError::TaskFailed(e.to_string()))??;
        Ok::<_, CoherenceError>((coin, total))
    });

    let totals = try_join_all(walks).await?.into_iter().collect();
    Ok(CoherenceReport { totals })
}

/// Pre-replay check over raw events.
pub fn check_raw_events(events: &[RawEvent]) -> Result<CoherenceReport, CoherenceError> {
    check_sequential(raw_entries(events))
}

/// Post-replay check over emitted ledger records.
pub fn check_records(records: &[LedgerRecord]) -> Result<CoherenceReport, CoherenceError> {
    check_sequential(record_entries(records))
}

pub async fn check_raw_events_parallel(
    events: &[RawEvent],
) -> Result<CoherenceReport, CoherenceError> {
    let report = check_parallel(raw_entries(events)).await?;
    info!(coins = report.totals.len(), "Raw events are coherent");
    Ok(report)
}

pub async fn check_records_parallel(
    records: &[LedgerRecord],
) -> Result<CoherenceReport, CoherenceError> {
    let report = check_parallel(record_entries(records)).await?;
    info!(coins = report.totals.len(), "Ledger records are coherent");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountScope, EventKind, RecordKind};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn t(hour: u32) -> UtcTime {
        UtcTime::from_ymd_hms(2025, 1, 1, hour, 0, 0).unwrap()
    }

    fn raw(hour: u32, coin: &str, change: &str) -> RawEvent {
        RawEvent::new(
            t(hour),
            AccountScope::CrossMargin,
            EventKind::TransferAccount,
            Coin::new(coin),
            d(change),
        )
    }

    #[test]
    fn test_same_instant_credit_counts_first() {
        let events = vec![raw(1, "BTC", "-1"), raw(1, "BTC", "1")];
        let report = check_raw_events(&events).unwrap();
        assert_eq!(report.totals[&Coin::new("BTC")], Decimal::zero());
    }

    #[test]
    fn test_negative_cumulative_is_reported() {
        let events = vec![raw(1, "BTC", "1"), raw(2, "BTC", "-1.5"), raw(3, "ETH", "1")];
        match check_raw_events(&events) {
            Err(CoherenceError::NegativeCumulative { coin, time, cumulative }) => {
                assert_eq!(coin, Coin::new("BTC"));
                assert_eq!(time, t(2));
                assert_eq!(cumulative, d("-0.5"));
            }
            other => panic!("expected NegativeCumulative, got {:?}", other),
        }
    }

    #[test]
    fn test_records_use_kind_sign() {
        let records = vec![
            LedgerRecord::new(Coin::new("USDC"), t(1), RecordKind::Deposit, d("10")),
            LedgerRecord::new(Coin::new("USDC"), t(2), RecordKind::ExchangeFee, d("11")),
        ];
        assert!(check_records(&records).is_err());
    }

    #[tokio::test]
    async fn test_parallel_check_matches_sequential() {
        let events = vec![
            raw(1, "BTC", "1"),
            raw(2, "BTC", "-0.25"),
            raw(1, "ETH", "3"),
            raw(4, "USDC", "100"),
        ];
        let parallel = check_raw_events_parallel(&events).await.unwrap();
        let sequential = check_raw_events(&events).unwrap();
        assert_eq!(parallel, sequential);
    }

    #[tokio::test]
    async fn test_parallel_check_propagates_failure() {
        let events = vec![raw(1, "BTC", "1"), raw(2, "ETH", "-1")];
        assert!(matches!(
            check_raw_events_parallel(&events).await,
            Err(CoherenceError::NegativeCumulative { .. })
        ));
    }
}
