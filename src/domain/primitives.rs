//! Domain primitives: UtcTime, Coin, AccountScope.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Timestamp format used by the exchange history export and the Tatax import.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Wall-clock UTC timestamp with second resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UtcTime(pub NaiveDateTime);

impl UtcTime {
    pub fn new(time: NaiveDateTime) -> Self {
        UtcTime(time)
    }

    /// Build from calendar fields; `None` for an impossible date or time.
    pub fn from_ymd_hms(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_opt(hour, min, sec))
            .map(UtcTime)
    }

    /// Parse a `yyyy-MM-dd HH:mm:ss` timestamp.
    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).map(UtcTime)
    }

    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn plus_seconds(&self, seconds: i64) -> Self {
        UtcTime(self.0 + Duration::seconds(seconds))
    }

    pub fn minus_seconds(&self, seconds: i64) -> Self {
        UtcTime(self.0 - Duration::seconds(seconds))
    }

    pub fn format(&self) -> String {
        self.0.format(TIMESTAMP_FORMAT).to_string()
    }
}

impl std::fmt::Display for UtcTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Coin/asset symbol (e.g., "BTC", "USDC").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coin(pub String);

impl Coin {
    pub fn new(coin: impl Into<String>) -> Self {
        Coin(coin.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Coin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exchange wallet an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccountScope {
    Spot,
    CrossMargin,
    IsolatedMargin,
}

impl AccountScope {
    pub const ALL: [AccountScope; 3] = [
        AccountScope::Spot,
        AccountScope::CrossMargin,
        AccountScope::IsolatedMargin,
    ];

    /// The `Account` column value used by the exchange export.
    pub fn label(&self) -> &'static str {
        match self {
            AccountScope::Spot => "Spot",
            AccountScope::CrossMargin => "Cross Margin",
            AccountScope::IsolatedMargin => "Isolated Margin",
        }
    }

    /// Resolve the `Account` column value; `None` for wallets this tool does not model.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|scope| scope.label() == label.trim())
    }

    pub fn is_margin(&self) -> bool {
        !matches!(self, AccountScope::Spot)
    }
}

impl std::fmt::Display for AccountScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
