//! Stable event ordering for deterministic replay.

use crate::domain::{Coin, Decimal, EventKind, RawEvent, UtcTime};

/// Precedence of an event among events sharing a timestamp.
///
/// Loans come first so borrowed capital is available to same-instant trades;
/// a sell leg precedes its fee and buy leg; outbound transfers come last.
pub fn operation_rank(event: &RawEvent) -> u8 {
    match event.kind {
        EventKind::MarginLoan | EventKind::IsolatedMarginLoan => 0,
        EventKind::TransferAccount if event.change.is_positive() => 1,
        EventKind::TransactionSold | EventKind::TransactionSpend => 2,
        EventKind::TransactionFee => 3,
        EventKind::TransactionBuy | EventKind::TransactionRevenue => 4,
        EventKind::CrossMarginLiquidationSmallAssetTakeover => 5,
        EventKind::BnbFeeDeduction => 6,
        EventKind::IsolatedMarginLiquidationFee => 7,
        EventKind::MarginRepayment | EventKind::IsolatedMarginRepayment => 8,
        EventKind::TransferAccount => 9,
        _ => 10,
    }
}

/// Total ordering key for raw events.
///
/// Ordering: time -> operation rank -> signed change ascending -> coin
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventOrderingKey {
    pub time: UtcTime,
    pub rank: u8,
    pub change: Decimal,
    pub coin: Coin,
}

impl EventOrderingKey {
    pub fn from_event(event: &RawEvent) -> Self {
        EventOrderingKey {
            time: event.time,
            rank: operation_rank(event),
            change: event.change,
            coin: event.coin.clone(),
        }
    }

    /// Returns true if event_a should come before event_b.
    pub fn should_come_before(event_a: &RawEvent, event_b: &RawEvent) -> bool {
        Self::from_event(event_a) < Self::from_event(event_b)
    }
}

/// Sort events deterministically. The sort is stable, so fully equal keys keep
/// their input order.
pub fn sort_events_deterministic(events: &mut [RawEvent]) {
    events.sort_by_cached_key(EventOrderingKey::from_event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountScope;

    fn make_event(sec: u32, kind: EventKind, coin: &str, change: &str) -> RawEvent {
        RawEvent::new(
            UtcTime::from_ymd_hms(2025, 1, 1, 2, 0, sec).unwrap(),
            AccountScope::CrossMargin,
            kind,
            Coin::new(coin),
            Decimal::from_str_canonical(change).unwrap(),
        )
    }

    #[test]
    fn test_event_ordering_by_time() {
        let a = make_event(0, EventKind::TransferAccount, "USDC", "-10");
        let b = make_event(1, EventKind::MarginLoan, "BTC", "1");
        assert!(EventOrderingKey::should_come_before(&a, &b));
        assert!(!EventOrderingKey::should_come_before(&b, &a));
    }

    #[test]
    fn test_same_instant_precedence() {
        let mut events = vec![
            make_event(0, EventKind::TransferAccount, "USDC", "-5"),
            make_event(0, EventKind::MarginRepayment, "BTC", "-1"),
            make_event(0, EventKind::TransactionBuy, "USDC", "1000"),
            make_event(0, EventKind::TransactionFee, "BNB", "-0.01"),
            make_event(0, EventKind::TransactionSold, "BTC", "-1"),
            make_event(0, EventKind::TransferAccount, "USDC", "20"),
            make_event(0, EventKind::MarginLoan, "BTC", "1"),
        ];
        sort_events_deterministic(&mut events);
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::MarginLoan,
                EventKind::TransferAccount,
                EventKind::TransactionSold,
                EventKind::TransactionFee,
                EventKind::TransactionBuy,
                EventKind::MarginRepayment,
                EventKind::TransferAccount,
            ]
        );
        assert!(events[1].change.is_positive());
        assert!(events[6].change.is_negative());
    }

    #[test]
    fn test_ties_broken_by_change_then_coin() {
        let mut events = vec![
            make_event(0, EventKind::Deposit, "ETH", "1"),
            make_event(0, EventKind::Deposit, "BTC", "1"),
            make_event(0, EventKind::Deposit, "BTC", "0.5"),
        ];
        sort_events_deterministic(&mut events);
        assert_eq!(events[0].change, Decimal::from_str_canonical("0.5").unwrap());
        assert_eq!(events[1].coin, Coin::new("BTC"));
        assert_eq!(events[2].coin, Coin::new("ETH"));
    }
}
