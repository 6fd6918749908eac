//! Per-year CSV exports and the JSON run summary.

use crate::domain::{AccountScope, LedgerRecord, RawEvent};
use crate::engine::LedgerOutcome;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod summary;
pub mod writer;

pub use summary::{AccountSummary, RunSummary};
pub use writer::{sort_for_export, write_raw_export, write_records_csv};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error on {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("JSON error on {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// File name prefix of an account's exports.
fn account_prefix(scope: AccountScope) -> &'static str {
    match scope {
        AccountScope::Spot => "Spot",
        AccountScope::CrossMargin => "CrossMargin",
        AccountScope::IsolatedMargin => "IsolatedMargin",
    }
}

fn years_of<T>(items: &[T], year: impl Fn(&T) -> i32) -> Vec<i32> {
    let mut years: Vec<i32> = items.iter().map(year).collect();
    years.sort_unstable();
    years.dedup();
    years
}

fn records_of_year(records: &[LedgerRecord], year: i32) -> Vec<LedgerRecord> {
    records
        .iter()
        .filter(|record| record.time.year() == year)
        .cloned()
        .collect()
}

/// Write every export of a run to `<output_dir>/<run_label>/` and return the
/// paths written.
pub fn write_run(
    output_dir: &Path,
    run_label: &str,
    raw_events: &[RawEvent],
    accounts: &[(AccountScope, &LedgerOutcome)],
    summary: &RunSummary,
) -> Result<Vec<PathBuf>, OutputError> {
    let dir = output_dir.join(run_label);
    std::fs::create_dir_all(&dir).map_err(|source| OutputError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let mut written = Vec::new();

    for year in years_of(raw_events, |event| event.time.year()) {
        let events: Vec<RawEvent> = raw_events
            .iter()
            .filter(|event| event.time.year() == year)
            .cloned()
            .collect();

        let adapted: Vec<LedgerRecord> = writer::sort_raw_events(events.clone())
            .iter()
            .filter_map(LedgerRecord::from_raw_event)
            .collect();
        let path = dir.join(format!("{}_TataxAdaptedByTimeStamp_{}.csv", run_label, year));
        write_records_csv(&path, &adapted)?;
        written.push(path);

        let path = dir.join(format!("{}_NotAdaptedByTimeStamp_{}.csv", run_label, year));
        write_raw_export(&path, &writer::sort_raw_events(events))?;
        written.push(path);
    }

    for (scope, outcome) in accounts {
        let prefix = account_prefix(*scope);
        for year in years_of(&outcome.records, |record| record.time.year()) {
            let path = dir.join(format!("{}_{}Ledger_{}.csv", run_label, prefix, year));
            write_records_csv(&path, &sort_for_export(records_of_year(&outcome.records, year)))?;
            written.push(path);
        }
        for year in years_of(&outcome.profit_and_losses, |record| record.time.year()) {
            let path = dir.join(format!("{}_{}ProfitAndLosses_{}.csv", run_label, prefix, year));
            write_records_csv(
                &path,
                &sort_for_export(records_of_year(&outcome.profit_and_losses, year)),
            )?;
            written.push(path);
        }
    }

    let path = dir.join("summary.json");
    summary.write(&path)?;
    written.push(path);

    Ok(written)
}
