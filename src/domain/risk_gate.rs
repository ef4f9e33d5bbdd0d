//! Admission control for new positions, the trading circuit breaker and a
//! risk summary for monitoring.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::config::RiskLimits;
use super::ledger::LedgerSnapshot;
use super::symbol::CurrencyPair;

/// Outcome of a gate check. A rejection is an ordinary value, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: String,
}

impl GateDecision {
    fn allow() -> Self {
        GateDecision {
            allowed: true,
            reason: "ok".to_string(),
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        GateDecision {
            allowed: false,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.allowed {
            write!(f, "allowed")
        } else {
            write!(f, "rejected: {}", self.reason)
        }
    }
}

/// Rolling windows for open-risk limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskWindow {
    Daily,
    Weekly,
    Monthly,
}

impl RiskWindow {
    pub const ALL: [RiskWindow; 3] = [RiskWindow::Daily, RiskWindow::Weekly, RiskWindow::Monthly];

    pub fn duration(self) -> Duration {
        match self {
            RiskWindow::Daily => Duration::days(1),
            RiskWindow::Weekly => Duration::days(7),
            RiskWindow::Monthly => Duration::days(30),
        }
    }

    pub fn limit(self, limits: &RiskLimits) -> f64 {
        match self {
            RiskWindow::Daily => limits.max_daily_risk,
            RiskWindow::Weekly => limits.max_weekly_risk,
            RiskWindow::Monthly => limits.max_monthly_risk,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskWindow::Daily => "daily",
            RiskWindow::Weekly => "weekly",
            RiskWindow::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RiskGate {
    limits: RiskLimits,
}

impl RiskGate {
    pub fn new(limits: RiskLimits) -> Self {
        RiskGate { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Decide whether a position of `size` at `entry_price` may be opened.
    /// Rules run in a fixed order and the first failure is reported.
    pub fn check(
        &self,
        symbol: &str,
        size: f64,
        entry_price: f64,
        snapshot: &LedgerSnapshot,
        now: NaiveDateTime,
    ) -> GateDecision {
        if snapshot.open_count() >= self.limits.max_positions {
            return GateDecision::reject("max positions");
        }

        let balance = snapshot.balance();
        if balance <= 0.0 {
            return GateDecision::reject("non-positive balance");
        }
        let Some(pair) = CurrencyPair::parse(symbol) else {
            return GateDecision::reject("invalid symbol");
        };

        for window in RiskWindow::ALL {
            if snapshot.risk_ratio_within(now, window.duration()) >= window.limit(&self.limits) {
                return GateDecision::reject(format!("{} risk limit", window.label()));
            }
        }

        if snapshot.drawdown() >= self.limits.max_drawdown {
            return GateDecision::reject("max drawdown");
        }

        let added = size * entry_price;
        for leg in [&pair.base, &pair.quote] {
            let projected = (snapshot.exposure.get(leg) + added) / balance;
            if projected > self.limits.max_exposure_per_currency {
                return GateDecision::reject(format!("max {leg} exposure"));
            }
        }

        GateDecision::allow()
    }

    /// Reason to halt new entries, if any: drawdown limit, daily risk limit,
    /// or balance below the absolute floor.
    pub fn should_stop_trading(
        &self,
        snapshot: &LedgerSnapshot,
        now: NaiveDateTime,
    ) -> Option<String> {
        let drawdown = snapshot.drawdown();
        if drawdown >= self.limits.max_drawdown {
            return Some(format!("max drawdown reached: {:.2}%", drawdown * 100.0));
        }

        let daily = snapshot.risk_ratio_within(now, RiskWindow::Daily.duration());
        if daily >= self.limits.max_daily_risk {
            return Some(format!("daily risk limit exceeded: {:.2}%", daily * 100.0));
        }

        let floor = snapshot.account.initial_balance * self.limits.min_balance_fraction;
        if snapshot.balance() < floor {
            return Some(format!(
                "balance {:.2} below floor {:.2}",
                snapshot.balance(),
                floor
            ));
        }

        None
    }

    pub fn summary(&self, snapshot: &LedgerSnapshot, now: NaiveDateTime) -> RiskSummary {
        RiskSummary {
            balance: snapshot.balance(),
            peak_balance: snapshot.account.peak_balance,
            current_drawdown: snapshot.drawdown(),
            open_positions: snapshot.open_count(),
            daily_risk: snapshot.risk_ratio_within(now, RiskWindow::Daily.duration()),
            weekly_risk: snapshot.risk_ratio_within(now, RiskWindow::Weekly.duration()),
            monthly_risk: snapshot.risk_ratio_within(now, RiskWindow::Monthly.duration()),
            currency_exposure: snapshot
                .exposure
                .iter()
                .map(|(ccy, v)| (ccy.to_string(), v))
                .collect(),
            limits: self.limits.clone(),
        }
    }
}

/// Point-in-time view of risk usage against the configured limits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSummary {
    pub balance: f64,
    pub peak_balance: f64,
    pub current_drawdown: f64,
    pub open_positions: usize,
    pub daily_risk: f64,
    pub weekly_risk: f64,
    pub monthly_risk: f64,
    pub currency_exposure: BTreeMap<String, f64>,
    pub limits: RiskLimits,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::{AccountState, Ledger};
    use crate::domain::position::{ExitReason, Side};
    use crate::domain::symbol::SymbolTable;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn gate() -> RiskGate {
        RiskGate::new(RiskLimits::default())
    }

    fn ledger() -> Ledger {
        Ledger::new(10_000.0, SymbolTable::default())
    }

    #[test]
    fn allows_with_empty_ledger() {
        let d = gate().check("EURUSD", 0.4, 1.1, &ledger().snapshot(), at(15, 9));
        assert!(d.allowed);
        assert_eq!(d.reason, "ok");
    }

    #[test]
    fn max_positions_rejects_regardless_of_size() {
        let mut ledger = ledger();
        for symbol in ["EURUSD", "GBPUSD", "USDJPY"] {
            // tiny stops so window risk stays far below limits
            let price = if symbol == "USDJPY" { 150.0 } else { 1.1 };
            ledger
                .add(symbol, 0.01, price, price * 0.9999, price * 1.01, Side::Long, at(1, 9))
                .unwrap();
        }
        let gate = RiskGate::new(RiskLimits {
            max_positions: 3,
            ..RiskLimits::default()
        });
        let d = gate.check("AUDUSD", 0.0, 0.65, &ledger.snapshot(), at(15, 9));
        assert_eq!(
            d,
            GateDecision {
                allowed: false,
                reason: "max positions".into()
            }
        );
    }

    #[test]
    fn daily_risk_window_rejects() {
        let mut ledger = ledger();
        // 600 of risk opened an hour ago is 6% of balance
        ledger
            .add("EURUSD", 1.2, 1.1000, 1.0950, 1.1100, Side::Long, at(15, 8))
            .unwrap();
        let d = gate().check("GBPUSD", 0.1, 1.27, &ledger.snapshot(), at(15, 9));
        assert_eq!(d.reason, "daily risk limit");
    }

    #[test]
    fn weekly_window_only_counts_recent_positions() {
        let mut ledger = ledger();
        // two 600 risk positions, 3 and 14 days old: weekly 6%, monthly 12%
        ledger
            .add("EURUSD", 1.2, 1.1000, 1.0950, 1.1100, Side::Long, at(12, 9))
            .unwrap();
        ledger
            .add("GBPUSD", 1.2, 1.2700, 1.2650, 1.2800, Side::Long, at(1, 9))
            .unwrap();
        let limits = RiskLimits {
            max_weekly_risk: 0.05,
            ..RiskLimits::default()
        };
        let d = RiskGate::new(limits).check("USDJPY", 0.1, 150.0, &ledger.snapshot(), at(15, 9));
        assert_eq!(d.reason, "weekly risk limit");
    }

    #[test]
    fn drawdown_rejects() {
        let mut ledger = ledger();
        let id = ledger
            .add("EURUSD", 2.0, 1.1000, 1.0900, 1.1100, Side::Long, at(1, 9))
            .unwrap();
        // 2 lots * 100 pips * $10 = 2000 loss = 20% drawdown
        ledger.close(id, 1.0900, at(1, 12), ExitReason::StopLoss).unwrap();
        let d = gate().check("EURUSD", 0.1, 1.09, &ledger.snapshot(), at(15, 9));
        assert_eq!(d.reason, "max drawdown");
    }

    #[test]
    fn exposure_rejects_naming_leg() {
        let snapshot = ledger().snapshot();
        // 0.3 * 10000 = 3000 cap, 2.0 * 1600 = 3200 > cap
        let d = gate().check("USDJPY", 2.0, 1_600.0, &snapshot, at(15, 9));
        assert_eq!(d.reason, "max USD exposure");
    }

    #[test]
    fn exposure_at_cap_is_allowed() {
        let snapshot = ledger().snapshot();
        let d = gate().check("EURUSD", 2.0, 1_500.0, &snapshot, at(15, 9));
        assert!(d.allowed);
    }

    #[test]
    fn first_failing_rule_wins() {
        let mut ledger = ledger();
        let id = ledger
            .add("EURUSD", 2.0, 1.1000, 1.0900, 1.1100, Side::Long, at(1, 9))
            .unwrap();
        ledger.close(id, 1.0900, at(1, 12), ExitReason::StopLoss).unwrap();
        let gate = RiskGate::new(RiskLimits {
            max_positions: 0,
            ..RiskLimits::default()
        });
        // drawdown and exposure would also fail
        let d = gate.check("USDJPY", 2.0, 10_000.0, &ledger.snapshot(), at(15, 9));
        assert_eq!(d.reason, "max positions");
    }

    #[test]
    fn invalid_symbol_rejected() {
        let d = gate().check("GOLD", 0.1, 1.0, &ledger().snapshot(), at(15, 9));
        assert_eq!(d.reason, "invalid symbol");
    }

    #[test]
    fn circuit_breaker_quiet_when_healthy() {
        assert_eq!(gate().should_stop_trading(&ledger().snapshot(), at(15, 9)), None);
    }

    #[test]
    fn circuit_breaker_trips_on_drawdown() {
        let mut ledger = ledger();
        let id = ledger
            .add("EURUSD", 2.0, 1.1000, 1.0900, 1.1100, Side::Long, at(1, 9))
            .unwrap();
        ledger.close(id, 1.0900, at(1, 12), ExitReason::StopLoss).unwrap();
        let reason = gate().should_stop_trading(&ledger.snapshot(), at(15, 9)).unwrap();
        assert!(reason.starts_with("max drawdown reached"));
    }

    #[test]
    fn circuit_breaker_trips_on_balance_floor() {
        let snapshot = LedgerSnapshot {
            account: AccountState {
                initial_balance: 10_000.0,
                balance: 4_900.0,
                peak_balance: 4_900.0,
            },
            open_positions: Vec::new(),
            exposure: Default::default(),
        };
        let reason = gate().should_stop_trading(&snapshot, at(15, 9)).unwrap();
        assert!(reason.contains("below floor"));
    }

    #[test]
    fn summary_reports_usage() {
        let mut ledger = ledger();
        ledger
            .add("EURUSD", 0.4, 1.1000, 1.0950, 1.1100, Side::Long, at(15, 8))
            .unwrap();
        let summary = gate().summary(&ledger.snapshot(), at(15, 9));
        assert_eq!(summary.open_positions, 1);
        assert!((summary.daily_risk - 0.02).abs() < 1e-9);
        assert!((summary.currency_exposure["EUR"] - 0.44).abs() < 1e-12);
        assert_eq!(summary.limits.max_positions, 5);
    }
}
