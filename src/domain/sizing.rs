//! Risk-based position sizing.
//!
//! The base size risks `max_risk_per_trade` of the balance between entry and
//! stop. Four independent factors then scale it down (or, for quiet markets,
//! up) before the result is clamped to the lot bounds:
//!
//! | factor      | input                                  | tiers                         |
//! |-------------|----------------------------------------|-------------------------------|
//! | volatility  | ATR / price, in percent                | >1.5: 0.7, >1.0: 0.85, <0.5: 1.2 |
//! | drawdown    | (peak - balance) / peak                | >10%: 0.5, >5%: 0.75          |
//! | correlation | open positions sharing a currency leg  | >=2: 0.5, 1: 0.75             |
//! | exposure    | larger leg exposure / per-currency cap | >100%: 0.3, >80%: 0.6         |
//!
//! Correlation is judged purely by shared three-letter currency codes, not by
//! any statistical measure of co-movement.

use serde::Serialize;
use tracing::debug;

use super::config::{RiskLimits, SizingPolicy};
use super::error::ValidationError;
use super::ledger::LedgerSnapshot;
use super::position::Side;
use super::symbol::{CurrencyPair, SymbolTable};

/// A proposed trade awaiting a size.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingRequest<'a> {
    pub symbol: &'a str,
    pub side: Side,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub balance: f64,
    /// ATR divided by price.
    pub volatility: Option<f64>,
}

/// Every intermediate value of a sizing decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeBreakdown {
    pub base_risk: f64,
    pub stop_distance_pips: f64,
    pub base_size: f64,
    pub volatility_factor: f64,
    pub drawdown_factor: f64,
    pub correlation_factor: f64,
    pub exposure_factor: f64,
    pub final_size: f64,
}

impl SizeBreakdown {
    pub fn combined_factor(&self) -> f64 {
        self.volatility_factor * self.drawdown_factor * self.correlation_factor * self.exposure_factor
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionSizer {
    limits: RiskLimits,
    policy: SizingPolicy,
    symbols: SymbolTable,
}

impl PositionSizer {
    pub fn new(limits: RiskLimits, policy: SizingPolicy, symbols: SymbolTable) -> Self {
        PositionSizer {
            limits,
            policy,
            symbols,
        }
    }

    /// Size for the request, or zero when it cannot be sized.
    pub fn calculate(&self, request: &SizingRequest<'_>, snapshot: &LedgerSnapshot) -> f64 {
        match self.breakdown(request, snapshot) {
            Ok(b) => b.final_size,
            Err(e) => {
                debug!(symbol = request.symbol, error = %e, "trade not sized");
                0.0
            }
        }
    }

    pub fn breakdown(
        &self,
        request: &SizingRequest<'_>,
        snapshot: &LedgerSnapshot,
    ) -> Result<SizeBreakdown, ValidationError> {
        let spec = self.symbols.lookup(request.symbol)?;
        let pair = CurrencyPair::parse(request.symbol).ok_or_else(|| {
            ValidationError::UnknownSymbol {
                symbol: request.symbol.to_string(),
            }
        })?;
        positive("balance", request.balance)?;
        positive("entry_price", request.entry_price)?;

        let base_risk = request.balance * self.limits.max_risk_per_trade;
        let stop_distance_pips = spec.to_pips((request.entry_price - request.stop_loss).abs());
        if stop_distance_pips == 0.0 || !stop_distance_pips.is_finite() {
            return Err(ValidationError::ZeroStopDistance {
                symbol: request.symbol.to_string(),
            });
        }
        // A long's stop sits below entry, a short's above.
        if request.side.sign() * (request.entry_price - request.stop_loss) <= 0.0 {
            return Err(ValidationError::StopOnWrongSide {
                symbol: request.symbol.to_string(),
            });
        }
        let base_size = base_risk / (stop_distance_pips * spec.pip_cost);

        let volatility_factor = request.volatility.map_or(1.0, volatility_factor);
        let drawdown_factor = drawdown_factor(snapshot.drawdown());
        let correlation_factor = correlation_factor(shared_leg_count(&pair, snapshot));
        let exposure_factor = exposure_factor(
            snapshot.exposure.max_leg(&pair),
            self.limits.max_exposure_per_currency * request.balance,
        );

        let adjusted = base_size * volatility_factor * drawdown_factor * correlation_factor * exposure_factor;
        let final_size = adjusted.clamp(self.policy.min_lot, self.policy.max_lot);

        let breakdown = SizeBreakdown {
            base_risk,
            stop_distance_pips,
            base_size,
            volatility_factor,
            drawdown_factor,
            correlation_factor,
            exposure_factor,
            final_size,
        };
        debug!(symbol = request.symbol, ?breakdown, "position sized");
        Ok(breakdown)
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonPositive { field, value })
    }
}

pub fn volatility_factor(normalized_atr: f64) -> f64 {
    let pct = normalized_atr * 100.0;
    if pct > 1.5 {
        0.7
    } else if pct > 1.0 {
        0.85
    } else if pct < 0.5 {
        1.2
    } else {
        1.0
    }
}

pub fn drawdown_factor(drawdown: f64) -> f64 {
    if drawdown > 0.10 {
        0.5
    } else if drawdown > 0.05 {
        0.75
    } else {
        1.0
    }
}

pub fn correlation_factor(shared: usize) -> f64 {
    match shared {
        0 => 1.0,
        1 => 0.75,
        _ => 0.5,
    }
}

/// `cap` is the per-currency exposure allowance in account currency.
pub fn exposure_factor(max_leg_exposure: f64, cap: f64) -> f64 {
    if cap <= 0.0 {
        return 0.3;
    }
    let ratio = max_leg_exposure / cap;
    if ratio > 1.0 {
        0.3
    } else if ratio > 0.8 {
        0.6
    } else {
        1.0
    }
}

fn shared_leg_count(pair: &CurrencyPair, snapshot: &LedgerSnapshot) -> usize {
    snapshot
        .open_positions
        .iter()
        .filter_map(|p| CurrencyPair::parse(&p.symbol))
        .filter(|open| open.shares_leg_with(pair))
        .count()
}
