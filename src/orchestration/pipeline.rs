use crate::config::Config;
use crate::datasource::EventSource;
use crate::domain::{AccountScope, RawEvent};
use crate::engine::{coherence, Account};
use crate::error::AppError;
use crate::orchestration::validate::{aggregate_events, assign_events, validate_events};
use crate::output::{self, AccountSummary, RunSummary};
use crate::prices::PriceTable;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Wallets that are replayed into a ledger, in replay order.
const REPLAYED_SCOPES: [AccountScope; 2] = [AccountScope::CrossMargin, AccountScope::IsolatedMargin];

/// What a completed run produced.
#[derive(Debug)]
pub struct RunReport {
    pub accounts: BTreeMap<AccountScope, Account>,
    pub summary: RunSummary,
    pub written: Vec<PathBuf>,
}

#[derive(Clone)]
pub struct Pipeline {
    config: Config,
    source: Arc<dyn EventSource>,
    prices: Arc<dyn PriceTable>,
}

impl Pipeline {
    pub fn new(config: Config, source: Arc<dyn EventSource>, prices: Arc<dyn PriceTable>) -> Self {
        Self {
            config,
            source,
            prices,
        }
    }

    /// Run every stage once; the first failure aborts the run before any file
    /// is written.
    pub async fn run(&self) -> Result<RunReport, AppError> {
        let events = self.source.fetch_events().await?;
        info!(events = events.len(), "Events ingested");

        validate_events(&events)?;
        let events = aggregate_events(events);
        let mut accounts = assign_events(events.clone())?;

        for account in accounts.values().filter(|account| account.is_margin()) {
            coherence::check_raw_events_parallel(account.events()).await?;
        }

        let settings = self.config.ledger_settings();
        let mut summaries = Vec::new();
        for scope in REPLAYED_SCOPES {
            let Some(account) = accounts.get_mut(&scope) else {
                continue;
            };
            let event_count = account.events().len();
            info!(account = %scope, events = event_count, "Replaying account");
            let outcome = account.compute_plus_minus(&settings, self.prices.as_ref())?;
            let report = coherence::check_records_parallel(&outcome.records).await?;

            let mut summary = AccountSummary::build(
                scope,
                event_count,
                outcome,
                &settings.countervalue_coin,
                self.prices.as_ref(),
            );
            summary.coherence_totals = report.totals;
            info!(
                account = %scope,
                records = summary.record_count,
                profit_and_losses = summary.profit_and_loss_count,
                "Account replayed"
            );
            summaries.push(summary);
        }

        let summary = RunSummary {
            run_label: self.config.run_label.clone(),
            countervalue_coin: settings.countervalue_coin.clone(),
            raw_event_count: events.len(),
            accounts: summaries,
        };

        let written = self.write(&events, &accounts, &summary)?;
        info!(files = written.len(), dir = %self.config.output_dir.display(), "Run written");

        Ok(RunReport {
            accounts,
            summary,
            written,
        })
    }

    fn write(
        &self,
        events: &[RawEvent],
        accounts: &BTreeMap<AccountScope, Account>,
        summary: &RunSummary,
    ) -> Result<Vec<PathBuf>, AppError> {
        let outcomes: Vec<_> = REPLAYED_SCOPES
            .iter()
            .filter_map(|scope| {
                accounts
                    .get(scope)
                    .and_then(Account::outcome)
                    .map(|outcome| (*scope, outcome))
            })
            .collect();
        Ok(output::write_run(
            &self.config.output_dir,
            &self.config.run_label,
            events,
            &outcomes,
            summary,
        )?)
    }
}
