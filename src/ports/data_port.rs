//! Market data and signal source ports.

use chrono::NaiveDateTime;

use crate::domain::bar::Bar;
use crate::domain::error::FxRiskError;
use crate::domain::signal::Signal;

/// Historical bars for a symbol.
pub trait DataPort {
    /// Bars with `start <= timestamp <= end` (either bound optional), in
    /// timestamp order.
    fn fetch_bars(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<Bar>, FxRiskError>;

    fn list_symbols(&self) -> Result<Vec<String>, FxRiskError>;
}

/// Precomputed trading signals for a symbol.
pub trait SignalPort {
    /// Signals keyed by the bar timestamp they apply to. An absent source is
    /// an empty list, not an error.
    fn fetch_signals(&self, symbol: &str) -> Result<Vec<(NaiveDateTime, Signal)>, FxRiskError>;
}
