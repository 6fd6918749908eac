//! Margin ledger replay: loans, lots, realized profit and loss.
//!
//! Coin held in a lot that is not `booked` is trading-derived capital the ledger
//! has not seen yet. Whenever such a chunk leaves the inventory through a
//! transfer, repayment or fee it is first credited at its stored counter value,
//! so the outgoing record never drives the running balance below zero.

use super::lot_inventory::{CoinBalance, ConsumedChunk};
use super::running_balance::RunningBalance;
use super::{normalize, LedgerError, LedgerSettings};
use crate::domain::{
    Coin, Decimal, LedgerRecord, Movement, RawEvent, RecordKind, SingleLeg, SingleLegKind, Swap,
    UtcTime,
};
use crate::prices::PriceTable;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// A record produced by a movement handler, before it is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emitted {
    pub record: LedgerRecord,
    pub reason: &'static str,
    /// Realized profit or loss; also reported in the P&L list.
    pub realized: bool,
}

impl Emitted {
    fn ledger(record: LedgerRecord, reason: &'static str) -> Self {
        Self {
            record,
            reason,
            realized: false,
        }
    }

    fn realized(record: LedgerRecord, reason: &'static str) -> Self {
        Self {
            record,
            reason,
            realized: true,
        }
    }
}

/// Mutable replay state owned by one margin account.
#[derive(Debug, Clone)]
struct LedgerState {
    loans: BTreeMap<Coin, Decimal>,
    inventories: BTreeMap<Coin, CoinBalance>,
    price_tolerance: Decimal,
}

impl LedgerState {
    fn new(price_tolerance: Decimal) -> Self {
        Self {
            loans: BTreeMap::new(),
            inventories: BTreeMap::new(),
            price_tolerance,
        }
    }

    fn loan_mut(&mut self, coin: &Coin) -> &mut Decimal {
        self.loans.entry(coin.clone()).or_insert_with(Decimal::zero)
    }

    fn inventory(&mut self, coin: &Coin) -> &mut CoinBalance {
        let tolerance = self.price_tolerance;
        self.inventories
            .entry(coin.clone())
            .or_insert_with(|| CoinBalance::new(coin.clone(), tolerance))
    }
}

fn is_nonzero(quantity: Decimal) -> bool {
    !quantity.is_zero()
}

/// Credit the chunks the ledger has not seen yet, dated at their acquisition.
fn credit_unbooked(
    coin: &Coin,
    chunks: &[ConsumedChunk],
    reason: &'static str,
    out: &mut Vec<Emitted>,
) {
    for chunk in chunks.iter().filter(|chunk| !chunk.booked) {
        out.push(Emitted::ledger(
            LedgerRecord::with_countervalue(
                coin.clone(),
                chunk.acquired_at,
                RecordKind::Credit,
                chunk.amount,
                chunk.counter_value,
                chunk.counter_value_coin.clone(),
            ),
            reason,
        ));
    }
}

/// Draw `amount` of `coin` out of the account: lots first, then owned capital.
fn draw_down(
    state: &mut LedgerState,
    coin: &Coin,
    time: UtcTime,
    amount: Decimal,
    kind: RecordKind,
    reason: &'static str,
) -> Result<Vec<Emitted>, LedgerError> {
    let mut out = Vec::new();
    let chunks = state.inventory(coin).consume(amount)?;
    credit_unbooked(coin, &chunks, "credit from previous swap", &mut out);
    out.push(Emitted::ledger(
        LedgerRecord::new(coin.clone(), time, kind, amount),
        reason,
    ));
    Ok(out)
}

fn handle_transfer(state: &mut LedgerState, leg: &SingleLeg) -> Result<Vec<Emitted>, LedgerError> {
    if leg.quantity.is_positive() {
        return Ok(vec![Emitted::ledger(
            LedgerRecord::new(leg.coin.clone(), leg.time, RecordKind::Deposit, leg.quantity),
            "transfer in",
        )]);
    }
    if leg.quantity.is_zero() {
        return Ok(Vec::new());
    }
    draw_down(
        state,
        &leg.coin,
        leg.time,
        leg.quantity.abs(),
        RecordKind::Withdrawal,
        "transfer out",
    )
}

fn handle_loan(state: &mut LedgerState, leg: &SingleLeg) -> Result<Vec<Emitted>, LedgerError> {
    if leg.quantity.is_negative() {
        return Err(LedgerError::InvalidQuantity {
            context: "loan",
            coin: leg.coin.clone(),
            time: leg.time,
            quantity: leg.quantity,
        });
    }
    *state.loan_mut(&leg.coin) += leg.quantity;
    Ok(Vec::new())
}

fn handle_repayment(
    state: &mut LedgerState,
    leg: &SingleLeg,
) -> Result<Vec<Emitted>, LedgerError> {
    if leg.quantity.is_positive() {
        return Err(LedgerError::InvalidQuantity {
            context: "repayment",
            coin: leg.coin.clone(),
            time: leg.time,
            quantity: leg.quantity,
        });
    }
    let amount = leg.quantity.abs();

    let loan = state.loan_mut(&leg.coin);
    let from_loan = (*loan).min(amount);
    *loan -= from_loan;

    let remaining = amount - from_loan;
    if !remaining.is_positive() {
        return Ok(Vec::new());
    }
    draw_down(
        state,
        &leg.coin,
        leg.time,
        remaining,
        RecordKind::Debit,
        "repayment",
    )
}

fn handle_fee(state: &mut LedgerState, leg: &SingleLeg) -> Result<Vec<Emitted>, LedgerError> {
    if leg.quantity.is_positive() {
        return Ok(vec![Emitted::ledger(
            LedgerRecord::new(leg.coin.clone(), leg.time, RecordKind::Credit, leg.quantity),
            "fee refund",
        )]);
    }
    if leg.quantity.is_zero() {
        return Ok(Vec::new());
    }
    draw_down(
        state,
        &leg.coin,
        leg.time,
        leg.quantity.abs(),
        RecordKind::Debit,
        "standalone fee",
    )
}

fn handle_swap(
    state: &mut LedgerState,
    swap: &Swap,
    price_tolerance: Decimal,
) -> Result<Vec<Emitted>, LedgerError> {
    let mut out = Vec::new();
    let sold = swap.sold_amount();
    let price = swap.execution_price();
    let time = swap.time;

    if sold.is_zero() {
        if swap.bought_quantity.is_positive() {
            out.push(Emitted::ledger(
                LedgerRecord::new(
                    swap.bought_coin.clone(),
                    time,
                    RecordKind::Credit,
                    swap.bought_quantity,
                ),
                "swap without sold leg",
            ));
        }
        handle_swap_fee(state, swap, &mut out)?;
        return Ok(out);
    }

    let mut remaining = sold;
    let mut residual_bought = swap.bought_quantity;

    // Loan-sourced capital: no record until the loan is settled.
    let loan = state.loan_mut(&swap.sold_coin);
    let from_loan = (*loan).min(remaining);
    if from_loan.is_positive() {
        *loan -= from_loan;
        let bought_with_loan = if from_loan == sold {
            swap.bought_quantity
        } else {
            from_loan * price
        };
        debug!(coin = %swap.sold_coin, amount = %from_loan, "Selling borrowed capital");
        state.inventory(&swap.bought_coin).add_lot(
            bought_with_loan,
            from_loan,
            swap.sold_coin.clone(),
            time,
            false,
        )?;
        remaining -= from_loan;
        residual_bought -= bought_with_loan;
    }

    // Capital obtained by an earlier swap from the coin bought now.
    if remaining.is_positive() {
        let bought_coin = swap.bought_coin.clone();
        let chunks = state
            .inventory(&swap.sold_coin)
            .consume_matching(remaining, |lot| lot.counter_value_coin == bought_coin)?;
        for chunk in &chunks {
            let inflow = chunk.amount * price;
            if chunk.booked {
                out.push(Emitted::ledger(
                    LedgerRecord::new(swap.sold_coin.clone(), time, RecordKind::Debit, chunk.amount),
                    "debit of booked lot",
                ));
            }
            out.push(Emitted::ledger(
                LedgerRecord::with_countervalue(
                    swap.bought_coin.clone(),
                    time,
                    RecordKind::Credit,
                    chunk.counter_value,
                    chunk.amount,
                    swap.sold_coin.clone(),
                ),
                "basis returned from previous swap",
            ));
            if let Some(realized) = realize(swap, chunk, inflow, price, price_tolerance)? {
                out.push(realized);
            }
            remaining -= chunk.amount;
            residual_bought -= inflow;
        }
    }

    // Owned capital: whatever is left is an ordinary exchange.
    if remaining.is_positive() {
        let chunks = state.inventory(&swap.sold_coin).consume(remaining)?;
        credit_unbooked(&swap.sold_coin, &chunks, "credit from previous swap", &mut out);

        let bought = residual_bought.max(Decimal::zero());
        out.push(Emitted::ledger(
            LedgerRecord::new(swap.sold_coin.clone(), time, RecordKind::Debit, remaining),
            "owned capital sold",
        ));
        if bought.is_positive() {
            out.push(Emitted::ledger(
                LedgerRecord::with_countervalue(
                    swap.bought_coin.clone(),
                    time,
                    RecordKind::Credit,
                    bought,
                    remaining,
                    swap.sold_coin.clone(),
                ),
                "owned capital bought",
            ));
        }
        state
            .inventory(&swap.bought_coin)
            .add_lot(bought, remaining, swap.sold_coin.clone(), time, true)?;
    }

    handle_swap_fee(state, swap, &mut out)?;
    Ok(out)
}

/// Profit or loss on a chunk bought back at `price`, in the coin bought now.
fn realize(
    swap: &Swap,
    chunk: &ConsumedChunk,
    inflow: Decimal,
    price: Decimal,
    tolerance: Decimal,
) -> Result<Option<Emitted>, LedgerError> {
    let pnl = inflow - chunk.counter_value;
    let coin = swap.bought_coin.clone();

    if price >= chunk.unit_price {
        if pnl.is_negative() && pnl.abs() > tolerance {
            return Err(LedgerError::ProfitSignMismatch {
                coin,
                time: swap.time,
                value: pnl,
            });
        }
        if !pnl.is_positive() {
            return Ok(None);
        }
        Ok(Some(Emitted::realized(
            LedgerRecord::new(coin, swap.time, RecordKind::Credit, pnl),
            "profit",
        )))
    } else {
        if pnl.is_positive() && pnl > tolerance {
            return Err(LedgerError::LossSignMismatch {
                coin,
                time: swap.time,
                value: pnl,
            });
        }
        if !pnl.is_negative() {
            return Ok(None);
        }
        Ok(Some(Emitted::realized(
            LedgerRecord::new(coin, swap.time, RecordKind::Debit, pnl.abs()),
            "loss",
        )))
    }
}

fn handle_swap_fee(
    state: &mut LedgerState,
    swap: &Swap,
    out: &mut Vec<Emitted>,
) -> Result<(), LedgerError> {
    let Some(fee) = &swap.fee else {
        return Ok(());
    };
    if fee.quantity.is_positive() {
        out.push(Emitted::ledger(
            LedgerRecord::new(fee.coin.clone(), swap.time, RecordKind::Credit, fee.quantity),
            "fee refund",
        ));
    } else if fee.quantity.is_negative() {
        let mut amount = fee.quantity.abs();
        // A fee in the sold coin is paid like the sold leg: loan first.
        if fee.coin == swap.sold_coin {
            let loan = state.loan_mut(&fee.coin);
            let from_loan = (*loan).min(amount);
            *loan -= from_loan;
            amount -= from_loan;
        }
        if amount.is_positive() {
            out.extend(draw_down(
                state,
                &fee.coin,
                swap.time,
                amount,
                RecordKind::ExchangeFee,
                "fee payment",
            )?);
        }
    }
    Ok(())
}

/// Ledger engine for one margin account.
pub struct MarginAccount<'p> {
    settings: LedgerSettings,
    prices: &'p dyn PriceTable,
    state: LedgerState,
    running: RunningBalance,
    records: Vec<LedgerRecord>,
    profit_and_losses: Vec<LedgerRecord>,
}

impl<'p> MarginAccount<'p> {
    pub fn new(settings: LedgerSettings, prices: &'p dyn PriceTable) -> Self {
        let state = LedgerState::new(settings.price_tolerance);
        Self {
            settings,
            prices,
            state,
            running: RunningBalance::new(),
            records: Vec::new(),
            profit_and_losses: Vec::new(),
        }
    }

    /// Normalize and replay every event of the account, in order.
    pub fn compute_plus_minus(&mut self, events: &[RawEvent]) -> Result<(), LedgerError> {
        let movements = normalize(events)?;
        info!(movements = movements.len(), "Replaying margin movements");
        for movement in &movements {
            self.replay(movement)?;
        }
        info!(
            records = self.records.len(),
            realized = self.profit_and_losses.len(),
            "Margin replay completed"
        );
        Ok(())
    }

    /// Replay a single movement and commit the records it emits.
    pub fn replay(&mut self, movement: &Movement) -> Result<(), LedgerError> {
        debug!(movement = %movement.describe(), "Replaying movement");
        let emitted = match movement {
            Movement::SingleLeg(leg) => match leg.kind {
                SingleLegKind::Transfer => handle_transfer(&mut self.state, leg),
                SingleLegKind::Loan => handle_loan(&mut self.state, leg),
                SingleLegKind::Repayment => handle_repayment(&mut self.state, leg),
                SingleLegKind::StandaloneFee => handle_fee(&mut self.state, leg),
            },
            Movement::Swap(swap) => {
                handle_swap(&mut self.state, swap, self.settings.price_tolerance)
            }
        }?;

        for item in emitted {
            self.commit(item, movement.time())?;
        }
        self.check_loans(movement.time())
    }

    fn commit(&mut self, item: Emitted, movement_time: UtcTime) -> Result<(), LedgerError> {
        if !is_nonzero(item.record.quantity) {
            return Ok(());
        }
        debug!(reason = item.reason, record = %item.record, "Emitting ledger record");

        let balance = self.running.apply(&item.record);
        if balance.is_negative() {
            let coin = item.record.coin.clone();
            if balance.abs() > self.settings.balance_tolerance {
                return Err(LedgerError::NegativeRunningBalance {
                    coin,
                    time: item.record.time,
                    balance,
                });
            }
            let correction = self.corrective_credit(coin, balance.abs(), movement_time)?;
            warn!(record = %correction, "Correcting rounding deficit");
            self.running.apply(&correction);
            self.records.push(correction);
        }

        if item.realized {
            self.profit_and_losses.push(item.record.clone());
        }
        self.records.push(item.record);
        Ok(())
    }

    fn corrective_credit(
        &self,
        coin: Coin,
        deficit: Decimal,
        movement_time: UtcTime,
    ) -> Result<LedgerRecord, LedgerError> {
        let time = movement_time.minus_seconds(1);
        let price = self.prices.get_price(&coin, time)?;
        Ok(LedgerRecord::with_countervalue(
            coin,
            time,
            RecordKind::Credit,
            deficit,
            deficit * price,
            self.settings.countervalue_coin.clone(),
        ))
    }

    fn check_loans(&self, time: UtcTime) -> Result<(), LedgerError> {
        match self.state.loans.iter().find(|(_, balance)| balance.is_negative()) {
            Some((coin, balance)) => Err(LedgerError::NegativeLoanBalance {
                coin: coin.clone(),
                time,
                balance: *balance,
            }),
            None => Ok(()),
        }
    }

    pub fn records(&self) -> &[LedgerRecord] {
        &self.records
    }

    pub fn profit_and_losses(&self) -> &[LedgerRecord] {
        &self.profit_and_losses
    }

    /// Realized P&L summed per coin.
    pub fn realized_by_coin(&self) -> BTreeMap<Coin, Decimal> {
        let mut totals = BTreeMap::new();
        for record in &self.profit_and_losses {
            *totals.entry(record.coin.clone()).or_insert_with(Decimal::zero) +=
                record.signed_quantity();
        }
        totals
    }

    pub fn loan_balance(&self, coin: &Coin) -> Decimal {
        self.state.loans.get(coin).copied().unwrap_or_default()
    }

    pub fn loan_balances(&self) -> BTreeMap<Coin, Decimal> {
        self.state.loans.clone()
    }

    pub fn running_balance(&self, coin: &Coin) -> Decimal {
        self.running.get(coin)
    }

    pub fn inventory(&self, coin: &Coin) -> Option<&CoinBalance> {
        self.state.inventories.get(coin)
    }

    /// Amount still held in lots, per coin.
    pub fn lot_totals(&self) -> BTreeMap<Coin, Decimal> {
        self.state
            .inventories
            .iter()
            .map(|(coin, inventory)| (coin.clone(), inventory.total()))
            .filter(|(_, total)| is_nonzero(*total))
            .collect()
    }

    pub fn into_records(self) -> (Vec<LedgerRecord>, Vec<LedgerRecord>) {
        (self.records, self.profit_and_losses)
    }
}
