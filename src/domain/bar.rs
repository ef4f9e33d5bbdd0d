//! Price bar representation.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a bar timestamp. A bare `YYYY-MM-DD` date means midnight.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Average true range supplied by the indicator pipeline, if any.
    pub atr: Option<f64>,
}

impl Bar {
    /// ATR as a fraction of the close price.
    pub fn normalized_volatility(&self) -> Option<f64> {
        match self.atr {
            Some(atr) if self.close > 0.0 && atr.is_finite() => Some(atr / self.close),
            _ => None,
        }
    }

    /// high >= max(open, close), low <= min(open, close), all prices positive.
    pub fn is_consistent(&self) -> bool {
        self.low > 0.0
            && self.high >= self.low
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
    }
}
