//! Positions, exit triggers and trade records.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::bar::Bar;
use super::symbol::PipSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    EndOfPeriod,
    Manual,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExitReason::StopLoss => "stop loss",
            ExitReason::TakeProfit => "take profit",
            ExitReason::EndOfPeriod => "end of period",
            ExitReason::Manual => "manual",
        };
        f.write_str(text)
    }
}

/// How the exit phase decides a stop or target was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Bar high/low touching the level.
    #[default]
    Range,
    /// Bar close crossing the level.
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub entry_time: NaiveDateTime,
    pub risk_amount: f64,
    pub status: PositionStatus,
    pub exit_price: Option<f64>,
    pub exit_time: Option<NaiveDateTime>,
    pub realized_pnl: Option<f64>,
    pub exit_reason: Option<ExitReason>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Notional committed to each currency leg.
    pub fn notional(&self) -> f64 {
        self.size * self.entry_price
    }

    pub fn pnl_at(&self, price: f64, spec: &PipSpec) -> f64 {
        spec.value_of((price - self.entry_price) * self.side.sign(), self.size)
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        if self.stop_loss == 0.0 {
            return false;
        }
        match self.side {
            Side::Long => price <= self.stop_loss,
            Side::Short => price >= self.stop_loss,
        }
    }

    pub fn should_take_profit(&self, price: f64) -> bool {
        if self.take_profit == 0.0 {
            return false;
        }
        match self.side {
            Side::Long => price >= self.take_profit,
            Side::Short => price <= self.take_profit,
        }
    }

    /// Reason and fill level if this bar closes the position. The stop wins
    /// when a single bar touches both levels.
    pub fn exit_trigger(&self, bar: &Bar, mode: TriggerMode) -> Option<(ExitReason, f64)> {
        let (adverse, favorable) = match (mode, self.side) {
            (TriggerMode::Close, _) => (bar.close, bar.close),
            (TriggerMode::Range, Side::Long) => (bar.low, bar.high),
            (TriggerMode::Range, Side::Short) => (bar.high, bar.low),
        };
        if self.should_stop_loss(adverse) {
            Some((ExitReason::StopLoss, self.stop_loss))
        } else if self.should_take_profit(favorable) {
            Some((ExitReason::TakeProfit, self.take_profit))
        } else {
            None
        }
    }
}

/// Historical copy of a position: written at open, completed at close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: PositionId,
    pub symbol: String,
    pub side: Side,
    pub size: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub entry_time: NaiveDateTime,
    pub risk_amount: f64,
    pub status: PositionStatus,
    pub exit_price: Option<f64>,
    pub exit_time: Option<NaiveDateTime>,
    pub pnl: Option<f64>,
    pub exit_reason: Option<ExitReason>,
}

impl TradeRecord {
    pub fn is_closed(&self) -> bool {
        self.status == PositionStatus::Closed
    }

    /// Hours between entry and exit, if closed.
    pub fn duration_hours(&self) -> Option<f64> {
        self.exit_time
            .map(|exit| (exit - self.entry_time).num_seconds() as f64 / 3600.0)
    }

    pub(crate) fn merge_close(&mut self, position: &Position) {
        self.status = position.status;
        self.exit_price = position.exit_price;
        self.exit_time = position.exit_time;
        self.pnl = position.realized_pnl;
        self.exit_reason = position.exit_reason;
    }
}

impl From<&Position> for TradeRecord {
    fn from(p: &Position) -> Self {
        TradeRecord {
            id: p.id,
            symbol: p.symbol.clone(),
            side: p.side,
            size: p.size,
            entry_price: p.entry_price,
            stop_loss: p.stop_loss,
            take_profit: p.take_profit,
            entry_time: p.entry_time,
            risk_amount: p.risk_amount,
            status: p.status,
            exit_price: p.exit_price,
            exit_time: p.exit_time,
            pnl: p.realized_pnl,
            exit_reason: p.exit_reason,
        }
    }
}
