//! Aggregation root: the raw events and derived ledger of one wallet.

use super::{LedgerError, LedgerSettings, MarginAccount};
use crate::domain::{AccountScope, Coin, Decimal, LedgerRecord, RawEvent};
use crate::prices::PriceTable;
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything a replay derives for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerOutcome {
    pub records: Vec<LedgerRecord>,
    pub profit_and_losses: Vec<LedgerRecord>,
    pub realized_by_coin: BTreeMap<Coin, Decimal>,
    pub loan_balances: BTreeMap<Coin, Decimal>,
    pub lot_totals: BTreeMap<Coin, Decimal>,
}

#[derive(Debug, Clone)]
pub struct Account {
    scope: AccountScope,
    events: Vec<RawEvent>,
    outcome: Option<LedgerOutcome>,
}

impl Account {
    pub fn new(scope: AccountScope) -> Self {
        Self {
            scope,
            events: Vec::new(),
            outcome: None,
        }
    }

    pub fn scope(&self) -> AccountScope {
        self.scope
    }

    /// Add an ingested event; events of another wallet are rejected.
    pub fn push_event(&mut self, event: RawEvent) -> Result<(), LedgerError> {
        if event.scope != self.scope {
            return Err(LedgerError::WrongAccountScope {
                expected: self.scope,
                actual: event.scope,
                coin: event.coin,
                time: event.time,
            });
        }
        self.events.push(event);
        Ok(())
    }

    pub fn events(&self) -> &[RawEvent] {
        &self.events
    }

    pub fn is_margin(&self) -> bool {
        self.scope.is_margin()
    }

    /// Replay the account from scratch. Any earlier outcome is discarded first,
    /// so a failed replay leaves no partial output behind.
    pub fn compute_plus_minus(
        &mut self,
        settings: &LedgerSettings,
        prices: &dyn PriceTable,
    ) -> Result<&LedgerOutcome, LedgerError> {
        self.outcome = None;
        if !self.scope.is_margin() {
            return Err(LedgerError::UnsupportedScope(self.scope));
        }

        let mut engine = MarginAccount::new(settings.clone(), prices);
        engine.compute_plus_minus(&self.events)?;

        let realized_by_coin = engine.realized_by_coin();
        let loan_balances = engine.loan_balances();
        let lot_totals = engine.lot_totals();
        let (records, profit_and_losses) = engine.into_records();

        Ok(self.outcome.insert(LedgerOutcome {
            records,
            profit_and_losses,
            realized_by_coin,
            loan_balances,
            lot_totals,
        }))
    }

    pub fn outcome(&self) -> Option<&LedgerOutcome> {
        self.outcome.as_ref()
    }
}
