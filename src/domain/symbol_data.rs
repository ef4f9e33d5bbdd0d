//! Per-symbol bar and signal series, and the unified timeline across symbols.

use chrono::NaiveDateTime;
use std::collections::{BTreeSet, HashMap};

use super::bar::Bar;
use super::signal::Signal;
use super::symbol::normalize;

#[derive(Debug, Clone)]
pub struct SymbolData {
    pub symbol: String,
    pub bars: Vec<Bar>,
    pub signals: HashMap<NaiveDateTime, Signal>,
    bar_index: HashMap<NaiveDateTime, usize>,
}

impl SymbolData {
    pub fn new(symbol: &str, bars: Vec<Bar>) -> Self {
        let bar_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.timestamp, i))
            .collect();
        SymbolData {
            symbol: normalize(symbol),
            bars,
            signals: HashMap::new(),
            bar_index,
        }
    }

    pub fn with_signals(mut self, signals: impl IntoIterator<Item = (NaiveDateTime, Signal)>) -> Self {
        self.signals.extend(signals);
        self
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn bar_at(&self, timestamp: NaiveDateTime) -> Option<&Bar> {
        self.bar_index.get(&timestamp).map(|&i| &self.bars[i])
    }

    pub fn signal_at(&self, timestamp: NaiveDateTime) -> Option<&Signal> {
        self.signals.get(&timestamp)
    }
}

/// Sorted, de-duplicated timestamps of every bar across all symbols.
pub fn build_unified_timeline(data: &[SymbolData]) -> Vec<NaiveDateTime> {
    let unique: BTreeSet<NaiveDateTime> = data
        .iter()
        .flat_map(|d| d.bars.iter().map(|bar| bar.timestamp))
        .collect();
    unique.into_iter().collect()
}
