//! Groups raw events into single-leg and swap movements.

use super::LedgerError;
use crate::domain::{
    sort_events_deterministic, Coin, Decimal, EventKind, FeeLeg, Movement, RawEvent, SingleLeg,
    SingleLegKind, Swap, UtcTime,
};
use tracing::debug;

/// Sell leg waiting for its buy leg.
#[derive(Debug)]
struct PendingSwap {
    kind: EventKind,
    time: UtcTime,
    coin: Coin,
    quantity: Decimal,
    fee: Option<FeeLeg>,
}

impl PendingSwap {
    fn open(event: &RawEvent) -> Self {
        Self {
            kind: event.kind,
            time: event.time,
            coin: event.coin.clone(),
            quantity: event.change,
            fee: None,
        }
    }

    fn attach_fee(&mut self, coin: &Coin, quantity: Decimal) -> bool {
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

    fn close(self, bought: &RawEvent) -> Result<Swap, LedgerError> {
        let swap = Swap::new(
            self.time,
            self.coin,
            self.quantity,
            bought.coin.clone(),
            bought.change,
        )?;
        Ok(match self.fee {
            Some(fee) => swap.with_fee(fee.coin, fee.quantity),
            None => swap,
        })
    }

    fn unmatched(self) -> LedgerError {
        LedgerError::UnmatchedSwapLeg {
            kind: self.kind,
            coin: self.coin,
            time: self.time,
        }
    }
}

fn single(kind: SingleLegKind, event: &RawEvent) -> Movement {
    Movement::SingleLeg(SingleLeg::new(
        kind,
        event.time,
        event.coin.clone(),
        event.change,
    ))
}

fn unmatched(event: &RawEvent) -> LedgerError {
    LedgerError::UnmatchedSwapLeg {
        kind: event.kind,
        coin: event.coin.clone(),
        time: event.time,
    }
}

/// Turn an account's raw events into the ordered movements the ledger replays.
///
/// Events are sorted with the deterministic event ordering first, so callers may
/// pass them in any order.
pub fn normalize(events: &[RawEvent]) -> Result<Vec<Movement>, LedgerError> {
    let mut sorted = events.to_vec();
    sort_events_deterministic(&mut sorted);

    let mut movements: Vec<Movement> = Vec::with_capacity(sorted.len());
    let mut pending: Option<PendingSwap> = None;
    let mut pending_liquidation: Option<PendingSwap> = None;

    for event in &sorted {
        match event.kind {
            EventKind::TransferAccount => movements.push(single(SingleLegKind::Transfer, event)),
            EventKind::MarginLoan | EventKind::IsolatedMarginLoan => {
                movements.push(single(SingleLegKind::Loan, event))
            }
            EventKind::MarginRepayment | EventKind::IsolatedMarginRepayment => {
                movements.push(single(SingleLegKind::Repayment, event))
            }
            EventKind::BnbFeeDeduction | EventKind::IsolatedMarginLiquidationFee => {
                movements.push(single(SingleLegKind::StandaloneFee, event))
            }
            EventKind::TransactionSold | EventKind::TransactionSpend => {
                if let Some(open) = pending.take() {
                    return Err(open.unmatched());
                }
                pending = Some(PendingSwap::open(event));
            }
            EventKind::TransactionFee => {
                if !event.is_margin_scoped() {
                    movements.push(single(SingleLegKind::StandaloneFee, event));
                    continue;
                }
                let attached = match (&mut pending, movements.last_mut()) {
                    (Some(open), _) => open.attach_fee(&event.coin, event.change),
                    (None, Some(Movement::Swap(closed))) if closed.time == event.time => {
                        closed.attach_fee(&event.coin, event.change)
                    }
                    _ => false,
                };
                if !attached {
                    movements.push(single(SingleLegKind::StandaloneFee, event));
                }
            }
            EventKind::TransactionBuy | EventKind::TransactionRevenue => {
                let open = pending.take().ok_or_else(|| unmatched(event))?;
                movements.push(Movement::Swap(open.close(event)?));
            }
            EventKind::CrossMarginLiquidationSmallAssetTakeover => {
                if event.change.is_negative() {
                    if let Some(open) = pending_liquidation.take() {
                        return Err(open.unmatched());
                    }
                    pending_liquidation = Some(PendingSwap::open(event));
                } else {
                    let open = pending_liquidation.take().ok_or_else(|| unmatched(event))?;
                    movements.push(Movement::Swap(open.close(event)?));
                }
            }
            other => {
                return Err(LedgerError::UnmanagedKind {
                    kind: other,
                    coin: event.coin.clone(),
                    time: event.time,
                })
            }
        }
    }

    if let Some(open) = pending.or(pending_liquidation) {
        return Err(open.unmatched());
    }

    debug!(
        events = sorted.len(),
        movements = movements.len(),
        "Normalized raw events"
    );
    Ok(movements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountScope;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn event(hour: u32, kind: EventKind, coin: &str, change: &str) -> RawEvent {
        RawEvent::new(
            UtcTime::from_ymd_hms(2025, 1, 1, hour, 0, 0).unwrap(),
            AccountScope::IsolatedMargin,
            kind,
            Coin::new(coin),
            d(change),
        )
    }

    #[test]
    fn test_sell_and_buy_fold_into_one_swap() {
        let events = vec![
            event(2, EventKind::TransactionBuy, "USDC", "1000"),
            event(2, EventKind::TransactionSpend, "BTC", "-1"),
        ];
        let movements = normalize(&events).unwrap();
        assert_eq!(movements.len(), 1);
        match &movements[0] {
            Movement::Swap(swap) => {
                assert_eq!(swap.sold_coin, Coin::new("BTC"));
                assert_eq!(swap.bought_coin, Coin::new("USDC"));
                assert_eq!(swap.execution_price(), d("1000"));
                assert!(swap.fee.is_none());
            }
            other => panic!("expected swap, got {:?}", other),
        }
    }

    #[test]
    fn test_margin_fee_attaches_to_swap() {
        let events = vec![
            event(2, EventKind::TransactionSold, "BTC", "-1"),
            event(2, EventKind::TransactionFee, "BNB", "-0.01"),
            event(2, EventKind::TransactionFee, "BNB", "-0.02"),
            event(2, EventKind::TransactionRevenue, "USDC", "1000"),
        ];
        let movements = normalize(&events).unwrap();
        assert_eq!(movements.len(), 1);
        let Movement::Swap(swap) = &movements[0] else {
            panic!("expected swap");
        };
        let fee = swap.fee.as_ref().unwrap();
        assert_eq!(fee.coin, Coin::new("BNB"));
        assert_eq!(fee.quantity, d("-0.03"));
    }

    #[test]
    fn test_fee_in_second_coin_becomes_standalone() {
        let events = vec![
            event(2, EventKind::TransactionSold, "BTC", "-1"),
            event(2, EventKind::TransactionFee, "BNB", "-0.01"),
            event(2, EventKind::TransactionFee, "USDC", "-1"),
            event(2, EventKind::TransactionBuy, "USDC", "1000"),
        ];
        let movements = normalize(&events).unwrap();
        assert_eq!(movements.len(), 2);
        assert!(matches!(
            &movements[0],
            Movement::SingleLeg(SingleLeg { kind: SingleLegKind::StandaloneFee, .. })
        ));
    }

    #[test]
    fn test_single_legs_map_one_to_one() {
        let events = vec![
            event(1, EventKind::TransferAccount, "USDC", "2000"),
            event(1, EventKind::IsolatedMarginLoan, "BTC", "1.5"),
            event(3, EventKind::IsolatedMarginRepayment, "BTC", "-1.5"),
            event(4, EventKind::BnbFeeDeduction, "BNB", "-0.1"),
        ];
        let kinds: Vec<SingleLegKind> = normalize(&events)
            .unwrap()
            .into_iter()
            .map(|movement| match movement {
                Movement::SingleLeg(leg) => leg.kind,
                Movement::Swap(_) => panic!("unexpected swap"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                SingleLegKind::Loan,
                SingleLegKind::Transfer,
                SingleLegKind::Repayment,
                SingleLegKind::StandaloneFee,
            ]
        );
    }

    #[test]
    fn test_liquidation_takeover_pair_is_a_swap() {
        let events = vec![
            event(5, EventKind::CrossMarginLiquidationSmallAssetTakeover, "BNB", "0.001"),
            event(5, EventKind::CrossMarginLiquidationSmallAssetTakeover, "ETH", "-0.01"),
        ];
        let movements = normalize(&events).unwrap();
        let Movement::Swap(swap) = &movements[0] else {
            panic!("expected swap");
        };
        assert_eq!(swap.sold_coin, Coin::new("ETH"));
        assert_eq!(swap.bought_coin, Coin::new("BNB"));
    }

    #[test]
    fn test_unmatched_sell_is_fatal() {
        let events = vec![event(2, EventKind::TransactionSold, "BTC", "-1")];
        assert!(matches!(
            normalize(&events),
            Err(LedgerError::UnmatchedSwapLeg { .. })
        ));
    }

    #[test]
    fn test_buy_without_sell_is_fatal() {
        let events = vec![event(2, EventKind::TransactionBuy, "BTC", "1")];
        assert!(matches!(
            normalize(&events),
            Err(LedgerError::UnmatchedSwapLeg { .. })
        ));
    }

    #[test]
    fn test_unmanaged_kind_is_fatal() {
        let events = vec![event(2, EventKind::AirdropAssets, "BTC", "1")];
        assert!(matches!(
            normalize(&events),
            Err(LedgerError::UnmanagedKind { kind: EventKind::AirdropAssets, .. })
        ));
    }
}
