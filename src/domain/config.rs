//! Typed run configuration: risk limits, sizing policy and simulation settings.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::time::Duration;

use super::position::TriggerMode;
use super::symbol::SymbolTable;

/// Limits the gate and circuit breaker enforce. Fractions are of balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskLimits {
    pub max_risk_per_trade: f64,
    pub max_daily_risk: f64,
    pub max_weekly_risk: f64,
    pub max_monthly_risk: f64,
    pub max_drawdown: f64,
    pub max_positions: usize,
    pub max_exposure_per_currency: f64,
    /// Carried for reporting; correlation is judged by shared currency legs.
    pub max_correlation: f64,
    /// Circuit breaker floor as a fraction of the initial balance.
    pub min_balance_fraction: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        RiskLimits {
            max_risk_per_trade: 0.02,
            max_daily_risk: 0.05,
            max_weekly_risk: 0.10,
            max_monthly_risk: 0.20,
            max_drawdown: 0.15,
            max_positions: 5,
            max_exposure_per_currency: 0.30,
            max_correlation: 0.7,
            min_balance_fraction: 0.5,
        }
    }
}

/// Lot bounds applied after all sizing adjustments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizingPolicy {
    pub min_lot: f64,
    pub max_lot: f64,
}

impl Default for SizingPolicy {
    fn default() -> Self {
        SizingPolicy {
            min_lot: 0.01,
            max_lot: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub initial_balance: f64,
    pub confidence_threshold: f64,
    /// Concurrency cap of the loop itself, checked before sizing.
    pub max_open_positions: usize,
    pub trigger_mode: TriggerMode,
    pub periods_per_year: f64,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub limits: RiskLimits,
    pub sizing: SizingPolicy,
    pub symbols: SymbolTable,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            initial_balance: 10_000.0,
            confidence_threshold: 75.0,
            max_open_positions: 3,
            trigger_mode: TriggerMode::Range,
            periods_per_year: 252.0,
            start: None,
            end: None,
            limits: RiskLimits::default(),
            sizing: SizingPolicy::default(),
            symbols: SymbolTable::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveConfig {
    pub symbols: Vec<String>,
    pub confidence_threshold: f64,
    pub max_open_positions: usize,
    pub trigger_mode: TriggerMode,
    pub poll_interval: Duration,
    pub monitor_interval: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        LiveConfig {
            symbols: Vec::new(),
            confidence_threshold: 75.0,
            max_open_positions: 3,
            trigger_mode: TriggerMode::Range,
            poll_interval: Duration::from_secs(300),
            monitor_interval: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_limit_defaults() {
        let l = RiskLimits::default();
        assert!((l.max_risk_per_trade - 0.02).abs() < f64::EPSILON);
        assert!((l.max_daily_risk - 0.05).abs() < f64::EPSILON);
        assert!((l.max_weekly_risk - 0.10).abs() < f64::EPSILON);
        assert!((l.max_monthly_risk - 0.20).abs() < f64::EPSILON);
        assert!((l.max_drawdown - 0.15).abs() < f64::EPSILON);
        assert_eq!(l.max_positions, 5);
        assert!((l.max_exposure_per_currency - 0.30).abs() < f64::EPSILON);
    }

    #[test]
    fn simulation_defaults() {
        let c = SimulationConfig::default();
        assert!((c.initial_balance - 10_000.0).abs() < f64::EPSILON);
        assert!((c.confidence_threshold - 75.0).abs() < f64::EPSILON);
        assert_eq!(c.max_open_positions, 3);
        assert_eq!(c.trigger_mode, TriggerMode::Range);
        assert!(c.symbols.contains("EURUSD"));
    }

    #[test]
    fn config_with_overrides() {
        let c = SimulationConfig {
            max_open_positions: 1,
            limits: RiskLimits {
                max_positions: 2,
                ..RiskLimits::default()
            },
            ..SimulationConfig::default()
        };
        assert_eq!(c.max_open_positions, 1);
        assert_eq!(c.limits.max_positions, 2);
    }
}
