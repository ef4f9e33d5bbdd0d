//! CSV file bar and signal sources.
//!
//! Bars live in `<dir>/<SYMBOL>.csv` with columns
//! `timestamp,open,high,low,close,volume[,atr]`. Signals live in
//! `<dir>/<SYMBOL>_signals.csv` with columns
//! `timestamp,action,price,stop_loss,take_profit,confidence`.

use chrono::NaiveDateTime;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::domain::bar::{Bar, parse_timestamp};
use crate::domain::error::FxRiskError;
use crate::domain::signal::{Action, Signal};
use crate::domain::symbol::normalize;
use crate::ports::data_port::{DataPort, SignalPort};

const SIGNAL_SUFFIX: &str = "_signals";

#[derive(Debug, Deserialize)]
struct BarRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
    #[serde(default)]
    atr: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SignalRow {
    timestamp: String,
    action: String,
    price: f64,
    stop_loss: f64,
    take_profit: f64,
    confidence: f64,
}

fn timestamp(value: &str, path: &Path) -> Result<NaiveDateTime, FxRiskError> {
    parse_timestamp(value).ok_or_else(|| FxRiskError::Data {
        reason: format!("invalid timestamp '{}' in {}", value, path.display()),
    })
}

fn open_reader(path: &Path) -> Result<csv::Reader<fs::File>, FxRiskError> {
    let file = fs::File::open(path).map_err(|e| FxRiskError::Data {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;
    Ok(csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file))
}

pub struct CsvBarSource {
    base_path: PathBuf,
}

impl CsvBarSource {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", normalize(symbol)))
    }
}

impl DataPort for CsvBarSource {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Bar>, FxRiskError> {
        let path = self.csv_path(symbol);
        let mut rdr = open_reader(&path)?;
        let mut bars = Vec::new();

        for row in rdr.deserialize::<BarRow>() {
            let row = row?;
            let ts = timestamp(&row.timestamp, &path)?;
            if start.is_some_and(|s| ts < s) || end.is_some_and(|e| ts > e) {
                continue;
            }
            let bar = Bar {
                timestamp: ts,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
                atr: row.atr,
            };
            if !bar.is_consistent() {
                warn!(symbol, timestamp = %ts, "inconsistent bar range");
            }
            bars.push(bar);
        }

        bars.sort_by_key(|b| b.timestamp);
        debug!(symbol, bars = bars.len(), path = %path.display(), "bars loaded");
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, FxRiskError> {
        let mut symbols = Vec::new();
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "csv") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !stem.ends_with(SIGNAL_SUFFIX) {
                symbols.push(normalize(stem));
            }
        }
        symbols.sort();
        Ok(symbols)
    }
}

pub struct CsvSignalSource {
    base_path: PathBuf,
}

impl CsvSignalSource {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path
            .join(format!("{}{}.csv", normalize(symbol), SIGNAL_SUFFIX))
    }
}

impl SignalPort for CsvSignalSource {
    fn fetch_signals(&self, symbol: &str) -> Result<Vec<(NaiveDateTime, Signal)>, FxRiskError> {
        let path = self.csv_path(symbol);
        if !path.exists() {
            debug!(symbol, path = %path.display(), "no signal file");
            return Ok(Vec::new());
        }

        let mut rdr = open_reader(&path)?;
        let mut signals = Vec::new();
        for row in rdr.deserialize::<SignalRow>() {
            let row = row?;
            let action: Action = row.action.parse().map_err(|reason| FxRiskError::Data {
                reason: format!("{} in {}", reason, path.display()),
            })?;
            signals.push((
                timestamp(&row.timestamp, &path)?,
                Signal {
                    action,
                    price: row.price,
                    stop_loss: row.stop_loss,
                    take_profit: row.take_profit,
                    confidence: row.confidence,
                },
            ));
        }
        signals.sort_by_key(|(ts, _)| *ts);
        Ok(signals)
    }
}
