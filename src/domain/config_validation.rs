//! Configuration validation and typed config construction.
//!
//! Every key is checked before a run starts; a malformed or out-of-range value
//! is reported as `ConfigInvalid` naming its section and key.

use chrono::NaiveDateTime;

use crate::domain::bar::parse_timestamp;
use crate::domain::config::{RiskLimits, SimulationConfig, SizingPolicy};
use crate::domain::error::FxRiskError;
use crate::domain::position::TriggerMode;
use crate::domain::symbol::{CurrencyPair, PipSpec, SymbolTable};
use crate::ports::config_port::ConfigPort;

/// Build the full run configuration, validating every section.
pub fn build_simulation_config(config: &dyn ConfigPort) -> Result<SimulationConfig, FxRiskError> {
    let defaults = SimulationConfig::default();

    let initial_balance = read_f64(config, "account", "initial_balance")?.ok_or_else(|| {
        FxRiskError::ConfigMissing {
            section: "account".to_string(),
            key: "initial_balance".to_string(),
        }
    })?;
    if initial_balance <= 0.0 {
        return Err(invalid("account", "initial_balance", "initial_balance must be positive"));
    }

    let confidence_threshold = read_f64(config, "simulation", "confidence_threshold")?
        .unwrap_or(defaults.confidence_threshold);
    if !(0.0..=100.0).contains(&confidence_threshold) {
        return Err(invalid(
            "simulation",
            "confidence_threshold",
            "confidence_threshold must be between 0 and 100",
        ));
    }

    let max_open_positions = read_count(config, "simulation", "max_open_positions")?
        .unwrap_or(defaults.max_open_positions);

    let trigger_mode = match config.get_string("simulation", "trigger_mode") {
        None => defaults.trigger_mode,
        Some(s) => parse_trigger_mode(&s).ok_or_else(|| {
            invalid("simulation", "trigger_mode", "trigger_mode must be 'range' or 'close'")
        })?,
    };

    let periods_per_year =
        read_f64(config, "simulation", "periods_per_year")?.unwrap_or(defaults.periods_per_year);
    if periods_per_year <= 0.0 {
        return Err(invalid(
            "simulation",
            "periods_per_year",
            "periods_per_year must be positive",
        ));
    }

    let start = read_timestamp(config, "simulation", "start")?;
    let end = read_timestamp(config, "simulation", "end")?;
    if let (Some(s), Some(e)) = (start, end) {
        if s >= e {
            return Err(invalid("simulation", "start", "start must be before end"));
        }
    }

    Ok(SimulationConfig {
        initial_balance,
        confidence_threshold,
        max_open_positions,
        trigger_mode,
        periods_per_year,
        start,
        end,
        limits: build_risk_limits(config)?,
        sizing: build_sizing_policy(config)?,
        symbols: build_symbol_table(config)?,
    })
}

pub fn build_risk_limits(config: &dyn ConfigPort) -> Result<RiskLimits, FxRiskError> {
    let defaults = RiskLimits::default();
    let fraction = |key: &str, default: f64| -> Result<f64, FxRiskError> {
        let value = read_f64(config, "risk", key)?.unwrap_or(default);
        if value <= 0.0 || value > 1.0 {
            return Err(invalid("risk", key, &format!("{key} must be in (0, 1]")));
        }
        Ok(value)
    };

    let limits = RiskLimits {
        max_risk_per_trade: fraction("max_risk_per_trade", defaults.max_risk_per_trade)?,
        max_daily_risk: fraction("max_daily_risk", defaults.max_daily_risk)?,
        max_weekly_risk: fraction("max_weekly_risk", defaults.max_weekly_risk)?,
        max_monthly_risk: fraction("max_monthly_risk", defaults.max_monthly_risk)?,
        max_drawdown: fraction("max_drawdown", defaults.max_drawdown)?,
        max_positions: read_count(config, "risk", "max_positions")?
            .unwrap_or(defaults.max_positions),
        max_exposure_per_currency: fraction(
            "max_exposure_per_currency",
            defaults.max_exposure_per_currency,
        )?,
        max_correlation: fraction("max_correlation", defaults.max_correlation)?,
        min_balance_fraction: read_f64(config, "risk", "min_balance_fraction")?
            .unwrap_or(defaults.min_balance_fraction),
    };

    if !(0.0..=1.0).contains(&limits.min_balance_fraction) {
        return Err(invalid(
            "risk",
            "min_balance_fraction",
            "min_balance_fraction must be between 0 and 1",
        ));
    }
    if limits.max_daily_risk > limits.max_weekly_risk
        || limits.max_weekly_risk > limits.max_monthly_risk
    {
        return Err(invalid(
            "risk",
            "max_daily_risk",
            "risk windows must satisfy daily <= weekly <= monthly",
        ));
    }
    Ok(limits)
}

pub fn build_sizing_policy(config: &dyn ConfigPort) -> Result<SizingPolicy, FxRiskError> {
    let defaults = SizingPolicy::default();
    let min_lot = read_f64(config, "sizing", "min_lot")?.unwrap_or(defaults.min_lot);
    let max_lot = read_f64(config, "sizing", "max_lot")?.unwrap_or(defaults.max_lot);
    if min_lot <= 0.0 {
        return Err(invalid("sizing", "min_lot", "min_lot must be positive"));
    }
    if max_lot < min_lot {
        return Err(invalid("sizing", "max_lot", "max_lot must not be below min_lot"));
    }
    Ok(SizingPolicy { min_lot, max_lot })
}

/// Default symbol table plus any `[symbols]` entries of the form
/// `SYMBOL = pip_size, pip_cost`.
pub fn build_symbol_table(config: &dyn ConfigPort) -> Result<SymbolTable, FxRiskError> {
    let mut table = SymbolTable::default();
    for key in config.keys("symbols") {
        let pair = CurrencyPair::parse(&key)
            .ok_or_else(|| invalid("symbols", &key, "not a six-letter currency pair"))?;
        let value = config.get_string("symbols", &key).unwrap_or_default();
        let spec = parse_pip_spec(&value).ok_or_else(|| {
            invalid("symbols", &key, "expected 'pip_size, pip_cost' with positive numbers")
        })?;
        table.register(&pair.symbol(), spec);
    }
    Ok(table)
}

pub fn parse_trigger_mode(value: &str) -> Option<TriggerMode> {
    match value.trim().to_lowercase().as_str() {
        "range" => Some(TriggerMode::Range),
        "close" => Some(TriggerMode::Close),
        _ => None,
    }
}

fn parse_pip_spec(value: &str) -> Option<PipSpec> {
    let mut parts = value.split(',').map(|p| p.trim().parse::<f64>());
    let pip_size = parts.next()?.ok()?;
    let pip_cost = parts.next()?.ok()?;
    if parts.next().is_some() || pip_size <= 0.0 || pip_cost <= 0.0 {
        return None;
    }
    Some(PipSpec { pip_size, pip_cost })
}

fn invalid(section: &str, key: &str, reason: &str) -> FxRiskError {
    FxRiskError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn read_f64(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, FxRiskError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(None);
    };
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(invalid(section, key, &format!("'{raw}' is not a number"))),
    }
}

fn read_count(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<usize>, FxRiskError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(v) if v >= 1 => Ok(Some(v)),
        _ => Err(invalid(section, key, &format!("{key} must be an integer of at least 1"))),
    }
}

fn read_timestamp(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDateTime>, FxRiskError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_timestamp(&s).map(Some).ok_or_else(|| {
            invalid(
                section,
                key,
                &format!("invalid {key} format, expected YYYY-MM-DD [HH:MM:SS]"),
            )
        }),
    }
}
