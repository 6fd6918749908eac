//! Reader for the exchange transaction history CSV export.

use super::{DataSourceError, EventSource};
use crate::domain::{AccountScope, Coin, Decimal, EventKind, LedgerMapping, RawEvent, UtcTime};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One row of the export, in the exchange's own column layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryCsvRow {
    #[serde(rename = "User_ID")]
    pub user_id: String,
    #[serde(rename = "UTC_Time")]
    pub utc_time: String,
    #[serde(rename = "Account")]
    pub account: String,
    #[serde(rename = "Operation")]
    pub operation: String,
    #[serde(rename = "Coin")]
    pub coin: String,
    #[serde(rename = "Change")]
    pub change: String,
    #[serde(rename = "Remark")]
    pub remark: String,
}

impl HistoryCsvRow {
    pub fn from_event(event: &RawEvent) -> Self {
        Self {
            user_id: event.user_id.clone(),
            utc_time: event.time.format(),
            account: event.scope.label().to_string(),
            operation: event.kind.display_name().to_string(),
            coin: event.coin.to_string(),
            change: event.change.to_canonical_string(),
            remark: event.note.clone(),
        }
    }
}

/// Flexible Earn subscriptions still outstanding, per coin.
///
/// A redemption larger than what was subscribed carries the accrued interest,
/// which is reported as an interest event; everything else is dropped.
#[derive(Debug, Default)]
struct FlexibleEarnTracker {
    subscribed: HashMap<Coin, Decimal>,
}

impl FlexibleEarnTracker {
    fn subscribe(&mut self, coin: &Coin, change: Decimal) -> Result<(), String> {
        if !change.is_negative() {
            return Err(format!("subscription of {} with non-negative change {}", coin, change));
        }
        *self.subscribed.entry(coin.clone()).or_insert_with(Decimal::zero) += change.abs();
        Ok(())
    }

    /// Returns the interest carried by the redemption, if any.
    fn redeem(&mut self, coin: &Coin, change: Decimal) -> Result<Option<Decimal>, String> {
        let Some(subscribed) = self.subscribed.get(coin).copied() else {
            return Err(format!("redemption of {} without a previous subscription", coin));
        };
        if change > subscribed {
            self.subscribed.remove(coin);
            Ok(Some(change - subscribed))
        } else {
            self.subscribed.insert(coin.clone(), subscribed - change);
            Ok(None)
        }
    }
}

/// Swap direction fixes for rows whose operation disagrees with the sign.
fn corrected_kind(kind: EventKind, change: Decimal) -> EventKind {
    match kind {
        EventKind::TransactionSold if change.is_positive() => EventKind::TransactionBuy,
        EventKind::TransactionBuy if change.is_negative() => EventKind::TransactionSold,
        EventKind::TransactionSpend if change.is_positive() => EventKind::TransactionRevenue,
        EventKind::TransactionRevenue if change.is_negative() => EventKind::TransactionSpend,
        other => other,
    }
}

/// Reads every `*.csv` file of a directory, in file name order.
#[derive(Debug, Clone)]
pub struct CsvHistorySource {
    dir: PathBuf,
    skip_coins: Vec<Coin>,
}

impl CsvHistorySource {
    pub fn new(dir: impl Into<PathBuf>, skip_coins: Vec<Coin>) -> Self {
        Self {
            dir: dir.into(),
            skip_coins,
        }
    }

    async fn history_files(&self) -> Result<Vec<PathBuf>, DataSourceError> {
        let io_err = |source| DataSourceError::Io {
            path: self.dir.display().to_string(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("csv") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Parse one export; `earn` carries Flexible Earn state across files.
    fn parse_file(
        &self,
        path: &Path,
        bytes: &[u8],
        earn: &mut FlexibleEarnTracker,
        events: &mut Vec<RawEvent>,
    ) -> Result<(), DataSourceError> {
        let path_str = path.display().to_string();
        let mut reader = csv::Reader::from_reader(bytes);
        let headers = reader
            .headers()
            .map_err(|source| DataSourceError::Csv {
                path: path_str.clone(),
                source,
            })?
            .clone();

        for record in reader.records() {
            let record = record.map_err(|source| DataSourceError::Csv {
                path: path_str.clone(),
                source,
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let row: HistoryCsvRow =
                record
                    .deserialize(Some(&headers))
                    .map_err(|source| DataSourceError::Csv {
                        path: path_str.clone(),
                        source,
                    })?;
            if let Some(event) = self.parse_row(&path_str, line, row, earn)? {
                events.push(event);
            }
        }
        Ok(())
    }

    fn parse_row(
        &self,
        path: &str,
        line: u64,
        row: HistoryCsvRow,
        earn: &mut FlexibleEarnTracker,
    ) -> Result<Option<RawEvent>, DataSourceError> {
        let parse_err = |message: String| DataSourceError::Parse {
            path: path.to_string(),
            line,
            message,
        };

        let Some(kind) = EventKind::from_display_name(&row.operation) else {
            return Err(DataSourceError::UnknownOperation {
                path: path.to_string(),
                line,
                operation: row.operation,
            });
        };
        let Some(scope) = AccountScope::from_label(&row.account) else {
            warn!(account = %row.account, line, "Skipping row of an unmodeled wallet");
            return Ok(None);
        };
        let time = UtcTime::parse(&row.utc_time)
            .map_err(|e| parse_err(format!("time {:?}: {}", row.utc_time, e)))?;
        let change = Decimal::from_str_canonical(&row.change)
            .map_err(|e| parse_err(format!("change {:?}: {}", row.change, e)))?;
        let coin = Coin::new(row.coin.trim());

        if self.skip_coins.contains(&coin) {
            debug!(coin = %coin, line, "Skipping configured coin");
            return Ok(None);
        }

        let fixed = corrected_kind(kind, change);
        if fixed != kind {
            warn!(
                from = %kind,
                to = %fixed,
                change = %change,
                line,
                "Operation changed due to incoherence between type and change"
            );
        }

        let (kind, time, change) = match fixed {
            EventKind::MarginLoan | EventKind::IsolatedMarginLoan => {
                (fixed, time.minus_seconds(1), change)
            }
            EventKind::MarginRepayment | EventKind::IsolatedMarginRepayment => {
                (fixed, time.plus_seconds(1), change)
            }
            EventKind::SimpleEarnFlexibleSubscription => {
                earn.subscribe(&coin, change).map_err(parse_err)?;
                return Ok(None);
            }
            EventKind::SimpleEarnFlexibleRedemption => {
                match earn.redeem(&coin, change).map_err(parse_err)? {
                    Some(interest) => (EventKind::SimpleEarnFlexibleInterest, time, interest),
                    None => return Ok(None),
                }
            }
            other => (other, time, change),
        };

        if kind.ledger_mapping() == LedgerMapping::Ignore && kind != EventKind::TransferAccount {
            return Ok(None);
        }

        Ok(Some(
            RawEvent::new(time, scope, kind, coin, change)
                .with_user_id(row.user_id.trim())
                .with_note(row.remark),
        ))
    }
}

#[async_trait]
impl EventSource for CsvHistorySource {
    async fn fetch_events(&self) -> Result<Vec<RawEvent>, DataSourceError> {
        let files = self.history_files().await?;
        let mut earn = FlexibleEarnTracker::default();
        let mut events = Vec::new();

        for path in &files {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| DataSourceError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
            let before = events.len();
            self.parse_file(path, &bytes, &mut earn, &mut events)?;
            debug!(file = %path.display(), events = events.len() - before, "History file read");
        }

        info!(files = files.len(), events = events.len(), "Transaction history loaded");
        Ok(events)
    }
}
