#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use fxrisk::domain::bar::Bar;
use fxrisk::domain::error::FxRiskError;
use fxrisk::domain::live::{MarketFeed, Quote};
use fxrisk::domain::signal::{Action, Signal};
use fxrisk::ports::data_port::{DataPort, SignalPort};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

/// Monday 2024-01-15 00:00 plus `hours`.
pub fn t(hours: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 15)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + Duration::hours(hours)
}

pub fn bar(timestamp: NaiveDateTime, low: f64, high: f64, close: f64) -> Bar {
    Bar {
        timestamp,
        open: close,
        high,
        low,
        close,
        volume: 1000.0,
        atr: None,
    }
}

/// A bar with a 5-pip range around `close`.
pub fn quiet_bar(timestamp: NaiveDateTime, close: f64) -> Bar {
    bar(timestamp, close - 0.0005, close + 0.0005, close)
}

pub fn signal(action: Action, price: f64, stop_loss: f64, take_profit: f64, confidence: f64) -> Signal {
    Signal {
        action,
        price,
        stop_loss,
        take_profit,
        confidence,
    }
}

pub fn buy(price: f64, stop_loss: f64, take_profit: f64) -> Signal {
    signal(Action::Buy, price, stop_loss, take_profit, 90.0)
}

pub fn sell(price: f64, stop_loss: f64, take_profit: f64) -> Signal {
    signal(Action::Sell, price, stop_loss, take_profit, 90.0)
}

pub struct MockDataPort {
    pub bars: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            bars: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.bars.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Bar>, FxRiskError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(FxRiskError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .bars
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| start.is_none_or(|s| b.timestamp >= s))
                    .filter(|b| end.is_none_or(|e| b.timestamp <= e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, FxRiskError> {
        let mut symbols: Vec<String> = self.bars.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub struct MockSignalPort {
    pub signals: HashMap<String, Vec<(NaiveDateTime, Signal)>>,
}

impl MockSignalPort {
    pub fn new() -> Self {
        Self {
            signals: HashMap::new(),
        }
    }

    pub fn with_signal(mut self, symbol: &str, at: NaiveDateTime, signal: Signal) -> Self {
        self.signals
            .entry(symbol.to_string())
            .or_default()
            .push((at, signal));
        self
    }
}

impl SignalPort for MockSignalPort {
    fn fetch_signals(&self, symbol: &str) -> Result<Vec<(NaiveDateTime, Signal)>, FxRiskError> {
        Ok(self.signals.get(symbol).cloned().unwrap_or_default())
    }
}

/// Feed that hands out each queued quote once per symbol, in order.
pub struct ScriptedFeed {
    quotes: Mutex<HashMap<String, Vec<Quote>>>,
    failing: Vec<String>,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self {
            quotes: Mutex::new(HashMap::new()),
            failing: Vec::new(),
        }
    }

    pub fn push(self, symbol: &str, bar: Bar, signal: Option<Signal>) -> Self {
        self.quotes
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_default()
            .push(Quote {
                bar,
                signal,
                atr: None,
            });
        self
    }

    pub fn failing(mut self, symbol: &str) -> Self {
        self.failing.push(symbol.to_string());
        self
    }
}

impl MarketFeed for ScriptedFeed {
    fn poll(&self, symbol: &str) -> Result<Option<Quote>, FxRiskError> {
        if self.failing.iter().any(|s| s == symbol) {
            return Err(FxRiskError::Data {
                reason: format!("feed unavailable for {symbol}"),
            });
        }
        let mut quotes = self.quotes.lock().unwrap();
        Ok(quotes
            .get_mut(symbol)
            .filter(|q| !q.is_empty())
            .map(|q| q.remove(0)))
    }
}

pub fn write_file(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

/// Two-symbol scenario: a EURUSD long stopped out for -200, then a GBPUSD
/// short that reaches its target for +392.
pub fn two_trade_bars() -> (Vec<Bar>, Vec<Bar>) {
    let eurusd = vec![
        bar(t(0), 1.0995, 1.1005, 1.1000),
        bar(t(1), 1.0940, 1.1010, 1.0960),
    ];
    let gbpusd = vec![
        quiet_bar(t(0), 1.2700),
        quiet_bar(t(1), 1.2700),
        quiet_bar(t(2), 1.2700),
        bar(t(3), 1.2590, 1.2710, 1.2620),
    ];
    (eurusd, gbpusd)
}

pub const EURUSD_CSV: &str = "timestamp,open,high,low,close,volume\n\
2024-01-15 00:00:00,1.1000,1.1005,1.0995,1.1000,1000\n\
2024-01-15 01:00:00,1.0960,1.1010,1.0940,1.0960,1000\n";

pub const EURUSD_SIGNALS_CSV: &str = "timestamp,action,price,stop_loss,take_profit,confidence\n\
2024-01-15 00:00:00,BUY,1.1000,1.0950,1.1100,90\n";

pub const GBPUSD_CSV: &str = "timestamp,open,high,low,close,volume\n\
2024-01-15 00:00:00,1.2700,1.2705,1.2695,1.2700,1000\n\
2024-01-15 01:00:00,1.2700,1.2705,1.2695,1.2700,1000\n\
2024-01-15 02:00:00,1.2700,1.2705,1.2695,1.2700,1000\n\
2024-01-15 03:00:00,1.2620,1.2710,1.2590,1.2620,1000\n";

pub const GBPUSD_SIGNALS_CSV: &str = "timestamp,action,price,stop_loss,take_profit,confidence\n\
2024-01-15 02:00:00,SELL,1.2700,1.2750,1.2600,85\n";

/// Writes the two-symbol scenario as CSV files into `dir`.
pub fn write_two_trade_data(dir: &Path) {
    write_file(dir, "EURUSD.csv", EURUSD_CSV);
    write_file(dir, "EURUSD_signals.csv", EURUSD_SIGNALS_CSV);
    write_file(dir, "GBPUSD.csv", GBPUSD_CSV);
    write_file(dir, "GBPUSD_signals.csv", GBPUSD_SIGNALS_CSV);
}
