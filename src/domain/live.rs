//! Live trading session: a trading loop and a monitoring loop sharing one
//! ledger behind a mutex.
//!
//! One trading iteration is one step: every symbol is polled, then exits run
//! for all polled bars, then entries, then equity is marked to the latest
//! known closes.
//!
//! Every read-decide-write sequence (snapshot, size, gate, add) runs while the
//! ledger lock is held, so concurrent callers can never jointly push the book
//! past a limit that each of them checked on its own. Cancellation is a shared
//! stop flag checked at the top of each loop iteration.

use chrono::{NaiveDateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::bar::Bar;
use super::config::{LiveConfig, RiskLimits, SizingPolicy};
use super::error::FxRiskError;
use super::ledger::Ledger;
use super::position::{ExitReason, PositionId};
use super::risk_gate::{GateDecision, RiskGate, RiskSummary};
use super::signal::Signal;
use super::sizing::{PositionSizer, SizingRequest};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

pub type SharedLedger = Arc<Mutex<Ledger>>;

pub fn shared(ledger: Ledger) -> SharedLedger {
    Arc::new(Mutex::new(ledger))
}

/// Cloneable stop flag for the session's loops.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Latest market state for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub bar: Bar,
    pub signal: Option<Signal>,
    pub atr: Option<f64>,
}

/// Source of live quotes and signals.
pub trait MarketFeed: Send + Sync {
    /// `Ok(None)` when nothing new is available for `symbol`.
    fn poll(&self, symbol: &str) -> Result<Option<Quote>, FxRiskError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryDecision {
    Opened(PositionId),
    Rejected(GateDecision),
    Skipped(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    pub polled: usize,
    pub exits: usize,
    pub entries: usize,
    pub rejections: usize,
    pub failures: usize,
}

pub struct LiveSession {
    ledger: SharedLedger,
    sizer: PositionSizer,
    gate: RiskGate,
    config: LiveConfig,
    stop: StopHandle,
    last_close: Mutex<HashMap<String, f64>>,
}

impl LiveSession {
    pub fn new(
        ledger: SharedLedger,
        limits: RiskLimits,
        policy: SizingPolicy,
        config: LiveConfig,
    ) -> Result<Self, FxRiskError> {
        let symbols = lock(&ledger)?.symbols().clone();
        Ok(LiveSession {
            sizer: PositionSizer::new(limits.clone(), policy, symbols),
            gate: RiskGate::new(limits),
            ledger,
            config,
            stop: StopHandle::default(),
            last_close: Mutex::new(HashMap::new()),
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    /// Size, gate and open a position for `signal`, all under one lock.
    pub fn evaluate_entry(
        &self,
        symbol: &str,
        signal: &Signal,
        atr: Option<f64>,
        now: NaiveDateTime,
    ) -> Result<EntryDecision, FxRiskError> {
        if !signal.is_actionable(self.config.confidence_threshold) {
            return Ok(EntryDecision::Skipped("not actionable"));
        }
        let Some(side) = signal.action.side() else {
            return Ok(EntryDecision::Skipped("not actionable"));
        };

        let mut ledger = lock(&self.ledger)?;
        if ledger.position_count() >= self.config.max_open_positions {
            return Ok(EntryDecision::Skipped("concurrency cap"));
        }

        let snapshot = ledger.snapshot();
        let request = SizingRequest {
            symbol,
            side,
            entry_price: signal.price,
            stop_loss: signal.stop_loss,
            balance: snapshot.balance(),
            volatility: atr.filter(|_| signal.price > 0.0).map(|a| a / signal.price),
        };
        let size = self.sizer.calculate(&request, &snapshot);
        if size <= 0.0 {
            return Ok(EntryDecision::Skipped("zero size"));
        }

        let decision = self.gate.check(symbol, size, signal.price, &snapshot, now);
        if !decision.allowed {
            info!(symbol, size, reason = %decision.reason, "entry rejected by risk gate");
            return Ok(EntryDecision::Rejected(decision));
        }

        let id = ledger.add(
            symbol,
            size,
            signal.price,
            signal.stop_loss,
            signal.take_profit,
            side,
            now,
        )?;
        Ok(EntryDecision::Opened(id))
    }

    /// Close every open position on `symbol` whose stop or target `bar` reaches.
    pub fn process_exits(&self, symbol: &str, bar: &Bar) -> Result<Vec<(PositionId, f64)>, FxRiskError> {
        let mut ledger = lock(&self.ledger)?;
        let triggered: Vec<(PositionId, ExitReason, f64)> = ledger
            .open_positions()
            .filter(|p| p.symbol == symbol)
            .filter_map(|p| {
                let (reason, price) = p.exit_trigger(bar, self.config.trigger_mode)?;
                Some((p.id, reason, price))
            })
            .collect();

        let mut closed = Vec::with_capacity(triggered.len());
        for (id, reason, price) in triggered {
            let pnl = ledger.close(id, price, bar.timestamp, reason)?;
            closed.push((id, pnl));
        }
        Ok(closed)
    }

    /// One pass of the trading loop over every configured symbol.
    ///
    /// Feed and entry failures are isolated to their symbol. Ledger integrity
    /// errors propagate.
    pub fn trading_iteration(
        &self,
        feed: &dyn MarketFeed,
        now: NaiveDateTime,
    ) -> Result<IterationReport, FxRiskError> {
        let mut report = IterationReport::default();

        let halt = {
            let ledger = lock(&self.ledger)?;
            self.gate.should_stop_trading(&ledger.snapshot(), now)
        };
        if let Some(reason) = &halt {
            warn!(%reason, "circuit breaker tripped, stopping session");
            self.stop.stop();
        }

        let mut quotes = Vec::with_capacity(self.config.symbols.len());
        for symbol in &self.config.symbols {
            match feed.poll(symbol) {
                Ok(Some(quote)) => quotes.push((symbol.as_str(), quote)),
                Ok(None) => {}
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "poll failed");
                    report.failures += 1;
                }
            }
        }
        report.polled = quotes.len();

        for (symbol, quote) in &quotes {
            report.exits += self.process_exits(symbol, &quote.bar)?.len();
        }

        if halt.is_none() {
            for (symbol, quote) in &quotes {
                let Some(signal) = &quote.signal else {
                    continue;
                };
                match self.evaluate_entry(symbol, signal, quote.atr, now) {
                    Ok(EntryDecision::Opened(_)) => report.entries += 1,
                    Ok(EntryDecision::Rejected(_)) => report.rejections += 1,
                    Ok(EntryDecision::Skipped(why)) => debug!(symbol = %symbol, why, "entry skipped"),
                    Err(e @ FxRiskError::LedgerPoisoned) => return Err(e),
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "entry failed");
                        report.failures += 1;
                    }
                }
            }
        }

        self.record_equity(&quotes, now)?;
        Ok(report)
    }

    /// Mark open positions to the latest close seen for each symbol.
    fn record_equity(&self, quotes: &[(&str, Quote)], now: NaiveDateTime) -> Result<(), FxRiskError> {
        let mut last_close = self.last_close.lock().unwrap_or_else(PoisonError::into_inner);
        for (symbol, quote) in quotes {
            last_close.insert(symbol.to_string(), quote.bar.close);
        }
        let mut ledger = lock(&self.ledger)?;
        let equity = ledger.equity(&last_close);
        ledger.record_equity(now, equity);
        Ok(())
    }

    /// Log a risk summary and raise the stop flag if the breaker has tripped.
    pub fn monitoring_iteration(&self, now: NaiveDateTime) -> Result<RiskSummary, FxRiskError> {
        let snapshot = lock(&self.ledger)?.snapshot();
        let summary = self.gate.summary(&snapshot, now);
        info!(
            balance = summary.balance,
            drawdown = summary.current_drawdown,
            open_positions = summary.open_positions,
            daily_risk = summary.daily_risk,
            "risk summary"
        );
        if let Some(reason) = self.gate.should_stop_trading(&snapshot, now) {
            warn!(%reason, "circuit breaker tripped, stopping session");
            self.stop.stop();
        }
        Ok(summary)
    }

    /// Run both loops on their own threads until stopped or a loop fails.
    pub fn run(&self, feed: &dyn MarketFeed) -> Result<(), FxRiskError> {
        info!(symbols = ?self.config.symbols, "live session started");
        let outcome = thread::scope(|scope| {
            let trading = scope.spawn(|| {
                self.run_loop("trading", self.config.poll_interval, |now| {
                    self.trading_iteration(feed, now).map(|_| ())
                })
            });
            let monitoring = scope.spawn(|| {
                self.run_loop("monitoring", self.config.monitor_interval, |now| {
                    self.monitoring_iteration(now).map(|_| ())
                })
            });

            let trading = trading
                .join()
                .map_err(|_| FxRiskError::WorkerPanicked { worker: "trading" });
            let monitoring = monitoring
                .join()
                .map_err(|_| FxRiskError::WorkerPanicked { worker: "monitoring" });
            trading.and_then(|r| r).and(monitoring.and_then(|r| r))
        });
        info!("live session stopped");
        outcome
    }

    fn run_loop(
        &self,
        name: &'static str,
        interval: Duration,
        mut iteration: impl FnMut(NaiveDateTime) -> Result<(), FxRiskError>,
    ) -> Result<(), FxRiskError> {
        while !self.stop.is_stopped() {
            if let Err(e) = iteration(Utc::now().naive_utc()) {
                error!(loop_name = name, error = %e, "loop failed, stopping session");
                self.stop.stop();
                return Err(e);
            }
            self.sleep_unless_stopped(interval);
        }
        debug!(loop_name = name, "loop exited");
        Ok(())
    }

    fn sleep_unless_stopped(&self, interval: Duration) {
        let deadline = Instant::now() + interval;
        while !self.stop.is_stopped() {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

fn lock(ledger: &SharedLedger) -> Result<MutexGuard<'_, Ledger>, FxRiskError> {
    ledger.lock().map_err(|_| FxRiskError::LedgerPoisoned)
}
