//! Position ledger: the single owner of account state, open positions,
//! currency exposure, trade history and the equity curve.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::error::FxRiskError;
use super::exposure::CurrencyExposure;
use super::position::{ExitReason, Position, PositionId, PositionStatus, Side, TradeRecord};
use super::symbol::{CurrencyPair, SymbolTable};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AccountState {
    pub initial_balance: f64,
    pub balance: f64,
    pub peak_balance: f64,
}

impl AccountState {
    pub fn new(initial_balance: f64) -> Self {
        AccountState {
            initial_balance,
            balance: initial_balance,
            peak_balance: initial_balance,
        }
    }

    /// (peak - balance) / peak, zero when the peak is not positive.
    pub fn drawdown(&self) -> f64 {
        if self.peak_balance > 0.0 {
            (self.peak_balance - self.balance) / self.peak_balance
        } else {
            0.0
        }
    }

    fn realize(&mut self, pnl: f64) {
        self.balance += pnl;
        if self.balance > self.peak_balance {
            self.peak_balance = self.balance;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// Read-only copy of the state sizing and gating decisions depend on.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerSnapshot {
    pub account: AccountState,
    pub open_positions: Vec<Position>,
    pub exposure: CurrencyExposure,
}

impl LedgerSnapshot {
    pub fn open_count(&self) -> usize {
        self.open_positions.len()
    }

    pub fn balance(&self) -> f64 {
        self.account.balance
    }

    pub fn drawdown(&self) -> f64 {
        self.account.drawdown()
    }

    /// Sum of risk amounts of open positions entered within `window` of `now`.
    pub fn open_risk_within(&self, now: NaiveDateTime, window: Duration) -> f64 {
        let cutoff = now - window;
        self.open_positions
            .iter()
            .filter(|p| p.entry_time >= cutoff)
            .map(|p| p.risk_amount)
            .sum()
    }

    /// Open risk within the window as a fraction of balance.
    pub fn risk_ratio_within(&self, now: NaiveDateTime, window: Duration) -> f64 {
        if self.account.balance > 0.0 {
            self.open_risk_within(now, window) / self.account.balance
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct Ledger {
    account: AccountState,
    symbols: SymbolTable,
    open: BTreeMap<PositionId, Position>,
    exposure: CurrencyExposure,
    history: Vec<TradeRecord>,
    history_index: HashMap<PositionId, usize>,
    closed_order: Vec<PositionId>,
    equity_curve: Vec<EquityPoint>,
    next_id: u64,
}

impl Ledger {
    pub fn new(initial_balance: f64, symbols: SymbolTable) -> Self {
        Ledger {
            account: AccountState::new(initial_balance),
            symbols,
            open: BTreeMap::new(),
            exposure: CurrencyExposure::new(),
            history: Vec::new(),
            history_index: HashMap::new(),
            closed_order: Vec::new(),
            equity_curve: Vec::new(),
            next_id: 1,
        }
    }

    /// Open a position and commit its notional to both currency legs.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        symbol: &str,
        size: f64,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        side: Side,
        entry_time: NaiveDateTime,
    ) -> Result<PositionId, FxRiskError> {
        let spec = self
            .symbols
            .get(symbol)
            .ok_or_else(|| FxRiskError::UnknownSymbol {
                symbol: symbol.to_string(),
            })?;
        let pair = CurrencyPair::parse(symbol).ok_or_else(|| FxRiskError::UnknownSymbol {
            symbol: symbol.to_string(),
        })?;
        if !(size > 0.0 && size.is_finite()) {
            return Err(FxRiskError::InvalidOrder {
                symbol: symbol.to_string(),
                reason: format!("size must be positive, got {size}"),
            });
        }
        if !(entry_price > 0.0 && entry_price.is_finite()) {
            return Err(FxRiskError::InvalidOrder {
                symbol: symbol.to_string(),
                reason: format!("entry price must be positive, got {entry_price}"),
            });
        }
        if side.sign() * (entry_price - stop_loss) <= 0.0 {
            return Err(FxRiskError::InvalidOrder {
                symbol: symbol.to_string(),
                reason: format!("stop {stop_loss} is not on the losing side of entry {entry_price}"),
            });
        }

        let id = PositionId(self.next_id);
        self.next_id += 1;

        let position = Position {
            id,
            symbol: pair.symbol(),
            side,
            size,
            entry_price,
            stop_loss,
            take_profit,
            entry_time,
            risk_amount: spec.value_of((entry_price - stop_loss).abs(), size),
            status: PositionStatus::Open,
            exit_price: None,
            exit_time: None,
            realized_pnl: None,
            exit_reason: None,
        };

        self.exposure.add(&pair, position.notional());
        self.history_index.insert(id, self.history.len());
        self.history.push(TradeRecord::from(&position));

        info!(
            id = %id,
            symbol = %position.symbol,
            side = ?side,
            size,
            entry_price,
            risk = position.risk_amount,
            "position opened"
        );
        self.open.insert(id, position);
        Ok(id)
    }

    /// Close an open position and realise its P&L into the balance.
    pub fn close(
        &mut self,
        id: PositionId,
        exit_price: f64,
        exit_time: NaiveDateTime,
        reason: ExitReason,
    ) -> Result<f64, FxRiskError> {
        let open = self
            .open
            .get(&id)
            .ok_or(FxRiskError::PositionNotFound { id: id.0 })?;
        let spec = self
            .symbols
            .get(&open.symbol)
            .ok_or_else(|| FxRiskError::UnknownSymbol {
                symbol: open.symbol.clone(),
            })?;
        let mut position = self
            .open
            .remove(&id)
            .ok_or(FxRiskError::PositionNotFound { id: id.0 })?;
        let pnl = position.pnl_at(exit_price, &spec);

        self.account.realize(pnl);

        if let Some(pair) = CurrencyPair::parse(&position.symbol) {
            let clamped = self.exposure.release(&pair, position.notional());
            if !clamped.is_empty() {
                warn!(
                    id = %id,
                    currencies = ?clamped,
                    "exposure would go negative on close, clamped to zero"
                );
            }
        }

        position.status = PositionStatus::Closed;
        position.exit_price = Some(exit_price);
        position.exit_time = Some(exit_time);
        position.realized_pnl = Some(pnl);
        position.exit_reason = Some(reason);

        if let Some(&idx) = self.history_index.get(&id) {
            self.history[idx].merge_close(&position);
        }
        self.closed_order.push(id);

        info!(
            id = %id,
            symbol = %position.symbol,
            exit_price,
            pnl,
            reason = %reason,
            balance = self.account.balance,
            "position closed"
        );
        Ok(pnl)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            account: self.account,
            open_positions: self.open.values().cloned().collect(),
            exposure: self.exposure.clone(),
        }
    }

    pub fn account(&self) -> &AccountState {
        &self.account
    }

    pub fn balance(&self) -> f64 {
        self.account.balance
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn exposure(&self) -> &CurrencyExposure {
        &self.exposure
    }

    pub fn get_position(&self, id: PositionId) -> Option<&Position> {
        self.open.get(&id)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.open.values()
    }

    pub fn position_count(&self) -> usize {
        self.open.len()
    }

    /// Every record in the order positions were opened.
    pub fn history(&self) -> &[TradeRecord] {
        &self.history
    }

    /// Closed records in the order they were closed.
    pub fn closed_trades(&self) -> Vec<TradeRecord> {
        self.closed_order
            .iter()
            .filter_map(|id| self.history_index.get(id))
            .map(|&idx| self.history[idx].clone())
            .collect()
    }

    /// Mark-to-market P&L of open positions. Symbols without a price are
    /// valued at entry.
    pub fn unrealized_pnl(&self, prices: &HashMap<String, f64>) -> f64 {
        self.open
            .values()
            .filter_map(|pos| {
                let price = prices.get(&pos.symbol)?;
                let spec = self.symbols.get(&pos.symbol)?;
                Some(pos.pnl_at(*price, &spec))
            })
            .sum()
    }

    pub fn equity(&self, prices: &HashMap<String, f64>) -> f64 {
        self.account.balance + self.unrealized_pnl(prices)
    }

    pub fn record_equity(&mut self, timestamp: NaiveDateTime, equity: f64) {
        debug!(%timestamp, equity, "equity recorded");
        self.equity_curve.push(EquityPoint { timestamp, equity });
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn ledger() -> Ledger {
        Ledger::new(10_000.0, SymbolTable::default())
    }

    fn open_eurusd(ledger: &mut Ledger, side: Side) -> PositionId {
        let (stop, target) = match side {
            Side::Long => (1.0950, 1.1100),
            Side::Short => (1.1050, 1.0900),
        };
        ledger
            .add("EURUSD", 0.4, 1.1000, stop, target, side, at(15, 9))
            .unwrap()
    }

    #[test]
    fn new_ledger() {
        let ledger = ledger();
        assert_relative_eq!(ledger.balance(), 10_000.0);
        assert_relative_eq!(ledger.account().peak_balance, 10_000.0);
        assert_eq!(ledger.position_count(), 0);
        assert!(ledger.history().is_empty());
        assert!(ledger.equity_curve().is_empty());
    }

    #[test]
    fn add_sets_risk_exposure_and_history() {
        let mut ledger = ledger();
        let id = open_eurusd(&mut ledger, Side::Long);

        let pos = ledger.get_position(id).unwrap();
        assert_eq!(pos.status, PositionStatus::Open);
        assert_relative_eq!(pos.risk_amount, 200.0, epsilon = 1e-6);
        assert_relative_eq!(ledger.exposure().get("EUR"), 0.44, epsilon = 1e-12);
        assert_relative_eq!(ledger.exposure().get("USD"), 0.44, epsilon = 1e-12);
        assert_eq!(ledger.history().len(), 1);
        assert!(!ledger.history()[0].is_closed());
        // balance untouched until close
        assert_relative_eq!(ledger.balance(), 10_000.0);
    }

    #[test]
    fn add_unknown_symbol_fails() {
        let mut ledger = ledger();
        let result = ledger.add("XAUUSD", 0.1, 2000.0, 1990.0, 2020.0, Side::Long, at(15, 9));
        assert!(matches!(result, Err(FxRiskError::UnknownSymbol { .. })));
        assert_eq!(ledger.position_count(), 0);
    }

    #[test]
    fn add_rejects_non_positive_size() {
        let mut ledger = ledger();
        let result = ledger.add("EURUSD", 0.0, 1.1, 1.09, 1.11, Side::Long, at(15, 9));
        assert!(matches!(result, Err(FxRiskError::InvalidOrder { .. })));
    }

    #[test]
    fn add_rejects_stop_beyond_entry() {
        let mut ledger = ledger();
        let long = ledger.add("EURUSD", 0.4, 1.0940, 1.0950, 1.1100, Side::Long, at(15, 9));
        assert!(matches!(result_reason(&long), Some(r) if r.contains("losing side")));
        let short = ledger.add("EURUSD", 0.4, 1.1000, 1.0950, 1.0900, Side::Short, at(15, 9));
        assert!(matches!(short, Err(FxRiskError::InvalidOrder { .. })));
        assert_eq!(ledger.position_count(), 0);
        assert!(ledger.history().is_empty());
    }

    fn result_reason(result: &Result<PositionId, FxRiskError>) -> Option<&str> {
        match result {
            Err(FxRiskError::InvalidOrder { reason, .. }) => Some(reason),
            _ => None,
        }
    }

    #[test]
    fn close_long_at_stop_loses_two_hundred() {
        let mut ledger = ledger();
        let id = open_eurusd(&mut ledger, Side::Long);
        let pnl = ledger
            .close(id, 1.0950, at(15, 10), ExitReason::StopLoss)
            .unwrap();

        assert_relative_eq!(pnl, -200.0, epsilon = 1e-6);
        assert_relative_eq!(ledger.balance(), 9_800.0, epsilon = 1e-6);
        assert_relative_eq!(ledger.account().peak_balance, 10_000.0);
        assert_eq!(ledger.exposure().get("EUR"), 0.0);
        assert_eq!(ledger.position_count(), 0);

        let record = &ledger.history()[0];
        assert!(record.is_closed());
        assert_eq!(record.exit_reason, Some(ExitReason::StopLoss));
        assert_eq!(record.exit_price, Some(1.0950));
    }

    #[test]
    fn close_short_mirrors_sign() {
        let mut ledger = ledger();
        let id = open_eurusd(&mut ledger, Side::Short);
        let pnl = ledger
            .close(id, 1.0900, at(15, 12), ExitReason::TakeProfit)
            .unwrap();
        assert_relative_eq!(pnl, 400.0, epsilon = 1e-6);
        assert_relative_eq!(ledger.account().peak_balance, 10_400.0, epsilon = 1e-6);
    }

    #[test]
    fn close_unknown_id_is_an_error() {
        let mut ledger = ledger();
        let result = ledger.close(PositionId(42), 1.1, at(15, 10), ExitReason::Manual);
        assert!(matches!(result, Err(FxRiskError::PositionNotFound { id: 42 })));
    }

    #[test]
    fn close_twice_is_an_error() {
        let mut ledger = ledger();
        let id = open_eurusd(&mut ledger, Side::Long);
        ledger.close(id, 1.1, at(15, 10), ExitReason::Manual).unwrap();
        let again = ledger.close(id, 1.1, at(15, 11), ExitReason::Manual);
        assert!(matches!(again, Err(FxRiskError::PositionNotFound { .. })));
        assert_relative_eq!(ledger.balance(), 10_000.0, epsilon = 1e-6);
    }

    #[test]
    fn closed_trades_follow_close_order() {
        let mut ledger = ledger();
        let first = open_eurusd(&mut ledger, Side::Long);
        let second = ledger
            .add("GBPUSD", 0.2, 1.2700, 1.2650, 1.2800, Side::Long, at(15, 9))
            .unwrap();
        ledger.close(second, 1.2800, at(15, 10), ExitReason::TakeProfit).unwrap();
        ledger.close(first, 1.0950, at(15, 11), ExitReason::StopLoss).unwrap();

        let closed: Vec<PositionId> = ledger.closed_trades().iter().map(|t| t.id).collect();
        assert_eq!(closed, vec![second, first]);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut ledger = ledger();
        let id = open_eurusd(&mut ledger, Side::Long);
        let snap = ledger.snapshot();
        ledger.close(id, 1.1, at(15, 10), ExitReason::Manual).unwrap();
        assert_eq!(snap.open_count(), 1);
        assert_eq!(ledger.snapshot().open_count(), 0);
    }

    #[test]
    fn open_risk_within_window() {
        let mut ledger = ledger();
        ledger
            .add("EURUSD", 0.4, 1.1000, 1.0950, 1.1100, Side::Long, at(1, 9))
            .unwrap();
        ledger
            .add("GBPUSD", 0.4, 1.2700, 1.2650, 1.2800, Side::Long, at(10, 9))
            .unwrap();
        let snap = ledger.snapshot();
        let now = at(10, 12);
        assert_relative_eq!(snap.open_risk_within(now, Duration::days(1)), 200.0, epsilon = 1e-6);
        assert_relative_eq!(snap.open_risk_within(now, Duration::days(30)), 400.0, epsilon = 1e-6);
        assert_relative_eq!(snap.risk_ratio_within(now, Duration::days(1)), 0.02, epsilon = 1e-9);
    }

    #[test]
    fn unrealized_and_equity() {
        let mut ledger = ledger();
        open_eurusd(&mut ledger, Side::Long);
        let mut prices = HashMap::new();
        prices.insert("EURUSD".to_string(), 1.1050);
        assert_relative_eq!(ledger.unrealized_pnl(&prices), 200.0, epsilon = 1e-6);
        assert_relative_eq!(ledger.equity(&prices), 10_200.0, epsilon = 1e-6);
        assert_relative_eq!(ledger.equity(&HashMap::new()), 10_000.0);
    }

    #[test]
    fn record_equity_appends() {
        let mut ledger = ledger();
        ledger.record_equity(at(15, 9), 10_050.0);
        assert_eq!(ledger.equity_curve().len(), 1);
        assert_eq!(ledger.equity_curve()[0].timestamp, at(15, 9));
    }

    #[test]
    fn drawdown_from_peak() {
        let mut account = AccountState::new(10_000.0);
        account.realize(1_000.0);
        account.realize(-2_200.0);
        assert_relative_eq!(account.peak_balance, 11_000.0);
        assert_relative_eq!(account.drawdown(), 0.2, epsilon = 1e-12);
    }
}
