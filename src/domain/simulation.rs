//! Bar-by-bar backtest driver.
//!
//! Each step of the unified timeline runs three phases in order: exits on
//! the step's bars, entries from the step's signals, then equity accounting.
//! Exits always precede entries, so a position is never opened and closed on
//! the same bar and a same-step close frees capacity for new entries.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::bar::Bar;
use super::config::SimulationConfig;
use super::error::FxRiskError;
use super::ledger::Ledger;
use super::metrics::Metrics;
use super::position::{ExitReason, PositionId, Side};
use super::risk_gate::RiskGate;
use super::signal::Signal;
use super::sizing::{PositionSizer, SizingRequest};
use super::symbol_data::{SymbolData, build_unified_timeline};

/// A trade the risk gate refused.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub size: f64,
    pub reason: String,
}

/// What happened during one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    pub exits: usize,
    pub entries: usize,
    pub rejections: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum EntryOutcome {
    Opened(PositionId),
    Rejected,
    Unsized,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub ledger: Ledger,
    pub rejections: Vec<Rejection>,
    pub steps: usize,
}

impl BacktestResult {
    pub fn metrics(&self, periods_per_year: f64) -> Metrics {
        Metrics::compute(
            &self.ledger.closed_trades(),
            self.ledger.equity_curve(),
            self.ledger.account().initial_balance,
            periods_per_year,
        )
    }
}

pub struct Simulation {
    config: SimulationConfig,
    ledger: Ledger,
    sizer: PositionSizer,
    gate: RiskGate,
    last_close: HashMap<String, f64>,
    rejections: Vec<Rejection>,
    halted: Option<String>,
    steps: usize,
    last_timestamp: Option<NaiveDateTime>,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        let ledger = Ledger::new(config.initial_balance, config.symbols.clone());
        let sizer = PositionSizer::new(
            config.limits.clone(),
            config.sizing.clone(),
            config.symbols.clone(),
        );
        let gate = RiskGate::new(config.limits.clone());
        Simulation {
            config,
            ledger,
            sizer,
            gate,
            last_close: HashMap::new(),
            rejections: Vec::new(),
            halted: None,
            steps: 0,
            last_timestamp: None,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn rejections(&self) -> &[Rejection] {
        &self.rejections
    }

    /// Circuit breaker reason while new entries are suspended.
    pub fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    /// Run the exit, entry and accounting phases for one timestamp.
    ///
    /// Per-symbol entry failures are logged and skipped. Ledger errors while
    /// closing positions abort the step.
    pub fn step(
        &mut self,
        timestamp: NaiveDateTime,
        data: &[SymbolData],
    ) -> Result<StepReport, FxRiskError> {
        for d in data {
            if let Some(bar) = d.bar_at(timestamp) {
                self.last_close.insert(d.symbol.clone(), bar.close);
            }
        }

        let mut report = StepReport {
            exits: self.process_exits(timestamp, data)?,
            ..StepReport::default()
        };
        self.process_entries(timestamp, data, &mut report);

        let equity = self.ledger.equity(&self.last_close);
        self.ledger.record_equity(timestamp, equity);

        self.steps += 1;
        self.last_timestamp = Some(timestamp);
        Ok(report)
    }

    fn process_exits(
        &mut self,
        timestamp: NaiveDateTime,
        data: &[SymbolData],
    ) -> Result<usize, FxRiskError> {
        let triggered: Vec<(PositionId, ExitReason, f64)> = self
            .ledger
            .open_positions()
            .filter_map(|pos| {
                let bar = find_bar(data, &pos.symbol, timestamp)?;
                let (reason, price) = pos.exit_trigger(bar, self.config.trigger_mode)?;
                Some((pos.id, reason, price))
            })
            .collect();

        for (id, reason, price) in &triggered {
            self.ledger.close(*id, *price, timestamp, *reason)?;
        }
        Ok(triggered.len())
    }

    fn process_entries(
        &mut self,
        timestamp: NaiveDateTime,
        data: &[SymbolData],
        report: &mut StepReport,
    ) {
        if self.breaker_tripped(timestamp) {
            return;
        }

        for d in data {
            if self.ledger.position_count() >= self.config.max_open_positions {
                debug!(%timestamp, "concurrency cap reached, skipping remaining signals");
                break;
            }
            let (Some(bar), Some(signal)) = (d.bar_at(timestamp), d.signal_at(timestamp)) else {
                continue;
            };
            if !signal.is_actionable(self.config.confidence_threshold) {
                continue;
            }
            let Some(side) = signal.action.side() else {
                continue;
            };

            match self.try_enter(&d.symbol, bar, signal, side, timestamp) {
                Ok(EntryOutcome::Opened(_)) => report.entries += 1,
                Ok(EntryOutcome::Rejected) => report.rejections += 1,
                Ok(EntryOutcome::Unsized) => {}
                Err(e) => {
                    warn!(symbol = %d.symbol, %timestamp, error = %e, "entry failed, symbol skipped");
                }
            }
        }
    }

    /// Updates the halt state, logging on each transition.
    fn breaker_tripped(&mut self, timestamp: NaiveDateTime) -> bool {
        let snapshot = self.ledger.snapshot();
        match (self.gate.should_stop_trading(&snapshot, timestamp), &self.halted) {
            (Some(reason), None) => {
                warn!(%timestamp, %reason, "circuit breaker tripped, entries suspended");
                self.halted = Some(reason);
                true
            }
            (Some(_), Some(_)) => true,
            (None, Some(_)) => {
                info!(%timestamp, "circuit breaker cleared, entries resumed");
                self.halted = None;
                false
            }
            (None, None) => false,
        }
    }

    fn try_enter(
        &mut self,
        symbol: &str,
        bar: &Bar,
        signal: &Signal,
        side: Side,
        timestamp: NaiveDateTime,
    ) -> Result<EntryOutcome, FxRiskError> {
        let snapshot = self.ledger.snapshot();
        let request = SizingRequest {
            symbol,
            side,
            entry_price: bar.close,
            stop_loss: signal.stop_loss,
            balance: snapshot.balance(),
            volatility: bar.normalized_volatility(),
        };
        let size = self.sizer.calculate(&request, &snapshot);
        if size <= 0.0 {
            return Ok(EntryOutcome::Unsized);
        }

        let decision = self.gate.check(symbol, size, bar.close, &snapshot, timestamp);
        if !decision.allowed {
            info!(symbol, size, %timestamp, reason = %decision.reason, "entry rejected by risk gate");
            self.rejections.push(Rejection {
                timestamp,
                symbol: symbol.to_string(),
                size,
                reason: decision.reason,
            });
            return Ok(EntryOutcome::Rejected);
        }

        let id = self.ledger.add(
            symbol,
            size,
            bar.close,
            signal.stop_loss,
            signal.take_profit,
            side,
            timestamp,
        )?;
        Ok(EntryOutcome::Opened(id))
    }

    /// Close everything still open at each symbol's last known close.
    pub fn finish(mut self) -> Result<BacktestResult, FxRiskError> {
        if let Some(timestamp) = self.last_timestamp {
            let remaining: Vec<(PositionId, f64)> = self
                .ledger
                .open_positions()
                .map(|p| {
                    let price = self.last_close.get(&p.symbol).copied().unwrap_or(p.entry_price);
                    (p.id, price)
                })
                .collect();
            for (id, price) in remaining {
                self.ledger.close(id, price, timestamp, ExitReason::EndOfPeriod)?;
            }
        }

        Ok(BacktestResult {
            ledger: self.ledger,
            rejections: self.rejections,
            steps: self.steps,
        })
    }
}

fn find_bar<'a>(data: &'a [SymbolData], symbol: &str, timestamp: NaiveDateTime) -> Option<&'a Bar> {
    data.iter()
        .find(|d| d.symbol == symbol)
        .and_then(|d| d.bar_at(timestamp))
}

/// Run a full backtest over the unified timeline of `data`, restricted to
/// the configured start and end when set.
pub fn run_backtest(
    data: &[SymbolData],
    config: &SimulationConfig,
) -> Result<BacktestResult, FxRiskError> {
    let timeline: Vec<NaiveDateTime> = build_unified_timeline(data)
        .into_iter()
        .filter(|ts| config.start.is_none_or(|start| *ts >= start))
        .filter(|ts| config.end.is_none_or(|end| *ts <= end))
        .collect();

    info!(
        symbols = data.len(),
        steps = timeline.len(),
        initial_balance = config.initial_balance,
        "backtest started"
    );

    let mut simulation = Simulation::new(config.clone());
    for timestamp in timeline {
        simulation.step(timestamp, data)?;
    }
    let result = simulation.finish()?;

    info!(
        steps = result.steps,
        trades = result.ledger.closed_trades().len(),
        rejections = result.rejections.len(),
        balance = result.ledger.balance(),
        "backtest finished"
    );
    Ok(result)
}
