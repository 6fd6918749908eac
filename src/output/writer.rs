//! Delimited text writers for Tatax records and raw history rows.

use super::OutputError;
use crate::datasource::HistoryCsvRow;
use crate::domain::{LedgerRecord, RawEvent};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<(), OutputError> {
    let csv_err = |source| OutputError::Csv {
        path: path.display().to_string(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    let mut count = 0usize;
    for row in rows {
        writer.serialize(row).map_err(csv_err)?;
        count += 1;
    }
    writer.flush().map_err(|source| OutputError::Io {
        path: path.display().to_string(),
        source,
    })?;
    debug!(path = %path.display(), rows = count, "Export written");
    Ok(())
}

/// Write records in the Tatax import layout, in the given order.
pub fn write_records_csv(path: &Path, records: &[LedgerRecord]) -> Result<(), OutputError> {
    write_rows(path, records.iter().map(LedgerRecord::to_csv_row))
}

/// Write events in the exchange's own column layout, in the given order.
pub fn write_raw_export(path: &Path, events: &[RawEvent]) -> Result<(), OutputError> {
    write_rows(path, events.iter().map(HistoryCsvRow::from_event))
}

/// Order raw events by time, larger changes first.
pub fn sort_raw_events(mut events: Vec<RawEvent>) -> Vec<RawEvent> {
    events.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| b.change.cmp(&a.change)));
    events
}

/// Order ledger records by symbol, newest first, then movement type.
pub fn sort_for_export(mut records: Vec<LedgerRecord>) -> Vec<LedgerRecord> {
    records.sort_by(|a, b| {
        a.coin
            .cmp(&b.coin)
            .then_with(|| b.time.cmp(&a.time))
            .then_with(|| a.kind.cmp(&b.kind))
    });
    records
}
