//! Trading signals produced by an external strategy.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::position::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    /// The position side this action opens, if any.
    pub fn side(self) -> Option<Side> {
        match self {
            Action::Buy => Some(Side::Long),
            Action::Sell => Some(Side::Short),
            Action::Hold => None,
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" | "LONG" => Ok(Action::Buy),
            "SELL" | "SHORT" => Ok(Action::Sell),
            "HOLD" | "" => Ok(Action::Hold),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub action: Action,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// 0 to 100.
    pub confidence: f64,
}

impl Signal {
    pub fn hold(price: f64) -> Self {
        Signal {
            action: Action::Hold,
            price,
            stop_loss: 0.0,
            take_profit: 0.0,
            confidence: 0.0,
        }
    }

    /// Directional and at least as confident as `threshold`.
    pub fn is_actionable(&self, threshold: f64) -> bool {
        self.action.side().is_some() && self.confidence >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy(confidence: f64) -> Signal {
        Signal {
            action: Action::Buy,
            price: 1.1000,
            stop_loss: 1.0950,
            take_profit: 1.1100,
            confidence,
        }
    }

    #[test]
    fn action_parses_case_insensitively() {
        assert_eq!("buy".parse::<Action>(), Ok(Action::Buy));
        assert_eq!(" SELL ".parse::<Action>(), Ok(Action::Sell));
        assert_eq!("hold".parse::<Action>(), Ok(Action::Hold));
        assert!("flip".parse::<Action>().is_err());
    }

    #[test]
    fn action_maps_to_side() {
        assert_eq!(Action::Buy.side(), Some(Side::Long));
        assert_eq!(Action::Sell.side(), Some(Side::Short));
        assert_eq!(Action::Hold.side(), None);
    }

    #[test]
    fn actionable_respects_threshold() {
        assert!(buy(75.0).is_actionable(75.0));
        assert!(!buy(74.9).is_actionable(75.0));
        assert!(!Signal::hold(1.1).is_actionable(0.0));
    }
}
