//! Sign validation, same-key aggregation and account assignment of raw events.

use crate::domain::{AccountScope, Coin, EventKind, LedgerMapping, RawEvent, UtcTime};
use crate::engine::{Account, LedgerError};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{kind} of {coin} at {time} has change {change}, expected {expected}")]
    UnexpectedSign {
        kind: EventKind,
        coin: Coin,
        time: UtcTime,
        change: String,
        expected: &'static str,
    },
}

/// Reject events whose sign contradicts the record kind they map to.
///
/// Zero changes pass either way.
pub fn validate_events(events: &[RawEvent]) -> Result<(), ValidationError> {
    for event in events {
        let LedgerMapping::Fixed(kind) = event.kind.ledger_mapping() else {
            continue;
        };
        let (bad, expected) = if kind.negates_amount() {
            (event.change.is_positive(), "negative")
        } else {
            (event.change.is_negative(), "positive")
        };
        if bad {
            return Err(ValidationError::UnexpectedSign {
                kind: event.kind,
                coin: event.coin.clone(),
                time: event.time,
                change: event.change.to_canonical_string(),
                expected,
            });
        }
    }
    Ok(())
}

/// Sum events sharing wallet, timestamp, operation and coin into one event.
///
/// The first event of each group keeps its user id and remark. Output is in
/// key order.
pub fn aggregate_events(events: Vec<RawEvent>) -> Vec<RawEvent> {
    let before = events.len();
    let mut groups: BTreeMap<(AccountScope, UtcTime, EventKind, Coin), RawEvent> = BTreeMap::new();
    for event in events {
        let key = (event.scope, event.time, event.kind, event.coin.clone());
        match groups.get_mut(&key) {
            Some(existing) => existing.change += event.change,
            None => {
                groups.insert(key, event);
            }
        }
    }
    let aggregated: Vec<RawEvent> = groups.into_values().collect();
    info!(before, after = aggregated.len(), "Events aggregated");
    aggregated
}

/// Route events to the account of their wallet. Every wallet with at least one
/// event gets an account.
pub fn assign_events(events: Vec<RawEvent>) -> Result<BTreeMap<AccountScope, Account>, LedgerError> {
    let mut accounts: BTreeMap<AccountScope, Account> = BTreeMap::new();
    for event in events {
        accounts
            .entry(event.scope)
            .or_insert_with(|| Account::new(event.scope))
            .push_event(event)?;
    }
    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Decimal;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn event(scope: AccountScope, kind: EventKind, coin: &str, change: &str) -> RawEvent {
        RawEvent::new(
            UtcTime::from_ymd_hms(2025, 1, 1, 2, 0, 0).unwrap(),
            scope,
            kind,
            Coin::new(coin),
            d(change),
        )
    }

    #[test]
    fn test_validate_rejects_positive_debit_kind() {
        let events = vec![event(
            AccountScope::CrossMargin,
            EventKind::MarginRepayment,
            "BTC",
            "0.5",
        )];
        match validate_events(&events) {
            Err(ValidationError::UnexpectedSign { kind, expected, .. }) => {
                assert_eq!(kind, EventKind::MarginRepayment);
                assert_eq!(expected, "negative");
            }
            other => panic!("Expected UnexpectedSign, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_negative_credit_kind() {
        let events = vec![event(AccountScope::Spot, EventKind::Deposit, "EUR", "-10")];
        assert!(matches!(
            validate_events(&events),
            Err(ValidationError::UnexpectedSign { expected: "positive", .. })
        ));
    }

    #[test]
    fn test_validate_skips_amount_decided_and_zero() {
        let events = vec![
            event(AccountScope::CrossMargin, EventKind::TransactionBuy, "BTC", "-1"),
            event(AccountScope::CrossMargin, EventKind::TransferAccount, "BTC", "-1"),
            event(AccountScope::CrossMargin, EventKind::TransactionFee, "BTC", "0"),
        ];
        assert!(validate_events(&events).is_ok());
    }

    #[test]
    fn test_aggregate_sums_identical_keys() {
        let events = vec![
            event(AccountScope::CrossMargin, EventKind::TransactionSold, "BTC", "-0.4")
                .with_note("first"),
            event(AccountScope::CrossMargin, EventKind::TransactionSold, "BTC", "-0.6"),
            event(AccountScope::CrossMargin, EventKind::TransactionRevenue, "USDC", "1000"),
            event(AccountScope::IsolatedMargin, EventKind::TransactionSold, "BTC", "-1"),
        ];
        let aggregated = aggregate_events(events);
        assert_eq!(aggregated.len(), 3);

        let sold = aggregated
            .iter()
            .find(|e| e.scope == AccountScope::CrossMargin && e.kind == EventKind::TransactionSold)
            .unwrap();
        assert_eq!(sold.change, d("-1"));
        assert_eq!(sold.note, "first");
    }

    #[test]
    fn test_assign_routes_by_scope() {
        let events = vec![
            event(AccountScope::CrossMargin, EventKind::MarginLoan, "BTC", "1"),
            event(AccountScope::Spot, EventKind::Deposit, "EUR", "10"),
            event(AccountScope::CrossMargin, EventKind::MarginRepayment, "BTC", "-1"),
        ];
        let accounts = assign_events(events).unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[&AccountScope::CrossMargin].events().len(), 2);
        assert_eq!(accounts[&AccountScope::Spot].events().len(), 1);
        assert!(!accounts.contains_key(&AccountScope::IsolatedMargin));
    }
}
