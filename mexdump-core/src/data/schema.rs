//! Channels, bar resolutions and the fixed record shapes written to disk.

use chrono::{DateTime, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::fmt;
use std::str::FromStr;

/// Header for bar files. Also the CSV field order of [`BarRecord`].
pub const BAR_HEADER: [&str; 13] = [
    "timestamp",
    "symbol",
    "open",
    "high",
    "low",
    "close",
    "trades",
    "volume",
    "vwap",
    "lastSize",
    "turnover",
    "homeNotional",
    "foreignNotional",
];

/// Header for quote files, in the archive's column order.
pub const QUOTE_HEADER: [&str; 6] = [
    "timestamp",
    "symbol",
    "bidSize",
    "bidPrice",
    "askPrice",
    "askSize",
];

/// Header for trade files, in the archive's column order.
pub const TRADE_HEADER: [&str; 10] = [
    "timestamp",
    "symbol",
    "side",
    "size",
    "price",
    "tickDirection",
    "trdMatchID",
    "grossValue",
    "homeNotional",
    "foreignNotional",
];

/// Category of data requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Bars,
    Quotes,
    Trades,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Bars => "bars",
            Channel::Quotes => "quotes",
            Channel::Trades => "trades",
        }
    }

    /// Record-kind name used by the archive source (`quote`, `trade`).
    /// Bars are not served by the archive.
    pub fn archive_kind(&self) -> Option<&'static str> {
        match self {
            Channel::Bars => None,
            Channel::Quotes => Some("quote"),
            Channel::Trades => Some("trade"),
        }
    }

    pub fn header(&self) -> &'static [&'static str] {
        match self {
            Channel::Bars => &BAR_HEADER,
            Channel::Quotes => &QUOTE_HEADER,
            Channel::Trades => &TRADE_HEADER,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bars" => Ok(Channel::Bars),
            "quotes" => Ok(Channel::Quotes),
            "trades" => Ok(Channel::Trades),
            other => Err(format!(
                "unknown channel '{other}'. Valid: bars, quotes, trades"
            )),
        }
    }
}

/// Bucket size for bar data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BarResolution {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
}

impl BarResolution {
    pub const ALL: [BarResolution; 4] = [
        BarResolution::OneMinute,
        BarResolution::FiveMinutes,
        BarResolution::OneHour,
        BarResolution::OneDay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BarResolution::OneMinute => "1m",
            BarResolution::FiveMinutes => "5m",
            BarResolution::OneHour => "1h",
            BarResolution::OneDay => "1d",
        }
    }

    /// Span of one bucket.
    pub fn bucket(&self) -> Duration {
        match self {
            BarResolution::OneMinute => Duration::minutes(1),
            BarResolution::FiveMinutes => Duration::minutes(5),
            BarResolution::OneHour => Duration::hours(1),
            BarResolution::OneDay => Duration::days(1),
        }
    }

    /// Cursor advance after a non-empty page of `page_size` rows.
    pub fn stride(&self, page_size: u32) -> Duration {
        self.bucket() * page_size as i32
    }
}

impl fmt::Display for BarResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BarResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BarResolution::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown bar resolution '{s}'. Valid: 1m, 5m, 1h, 1d"))
    }
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Every day from `start` to `end`, inclusive.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

/// One bucketed bar as returned by the query API.
///
/// Field order matches [`BAR_HEADER`]; serde's camelCase names double as the
/// CSV column names. Prices and notionals stay `serde_json::Number` so they
/// are written back exactly as the API sent them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BarRecord {
    pub timestamp: String,
    pub symbol: String,
    pub open: Option<Number>,
    pub high: Option<Number>,
    pub low: Option<Number>,
    pub close: Option<Number>,
    pub trades: Option<u64>,
    pub volume: Option<u64>,
    pub vwap: Option<Number>,
    pub last_size: Option<u64>,
    pub turnover: Option<u64>,
    pub home_notional: Option<Number>,
    pub foreign_notional: Option<Number>,
}

impl BarRecord {
    /// UTC calendar date of the bar's timestamp.
    pub fn date(&self) -> Option<NaiveDate> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.naive_utc().date())
    }
}

/// Rewrite the archive's `D` date/time separator to the ISO-8601 `T`.
///
/// Only the first occurrence is replaced; everything else is kept verbatim.
pub fn normalize_timestamp(raw: &str) -> String {
    raw.replacen('D', "T", 1)
}
