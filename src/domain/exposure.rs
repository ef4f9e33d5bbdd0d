//! Per-currency notional exposure.

use serde::Serialize;
use std::collections::BTreeMap;

use super::symbol::CurrencyPair;

const RESIDUE: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CurrencyExposure {
    by_currency: BTreeMap<String, f64>,
}

impl CurrencyExposure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, currency: &str) -> f64 {
        self.by_currency.get(currency).copied().unwrap_or(0.0)
    }

    /// Larger of the two legs' current exposure.
    pub fn max_leg(&self, pair: &CurrencyPair) -> f64 {
        self.get(&pair.base).max(self.get(&pair.quote))
    }

    pub fn add(&mut self, pair: &CurrencyPair, notional: f64) {
        for leg in [&pair.base, &pair.quote] {
            *self.by_currency.entry(leg.clone()).or_insert(0.0) += notional;
        }
    }

    /// Subtract from both legs, flooring at zero. Returns the currencies that
    /// had to be clamped.
    pub fn release(&mut self, pair: &CurrencyPair, notional: f64) -> Vec<String> {
        let mut clamped = Vec::new();
        for leg in [&pair.base, &pair.quote] {
            let entry = self.by_currency.entry(leg.clone()).or_insert(0.0);
            let remaining = *entry - notional;
            if remaining < -RESIDUE {
                clamped.push(leg.clone());
            }
            // float residue from adding and removing the same notional
            *entry = if remaining.abs() < RESIDUE {
                0.0
            } else {
                remaining.max(0.0)
            };
        }
        clamped
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.by_currency.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_non_negative(&self) -> bool {
        self.by_currency.values().all(|v| *v >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(s: &str) -> CurrencyPair {
        CurrencyPair::parse(s).unwrap()
    }

    #[test]
    fn add_increments_both_legs() {
        let mut exposure = CurrencyExposure::new();
        exposure.add(&pair("EURUSD"), 0.44);
        exposure.add(&pair("GBPUSD"), 0.5);
        assert!((exposure.get("EUR") - 0.44).abs() < 1e-12);
        assert!((exposure.get("GBP") - 0.5).abs() < 1e-12);
        assert!((exposure.get("USD") - 0.94).abs() < 1e-12);
        assert_eq!(exposure.get("JPY"), 0.0);
    }

    #[test]
    fn max_leg_picks_larger() {
        let mut exposure = CurrencyExposure::new();
        exposure.add(&pair("EURUSD"), 1.0);
        exposure.add(&pair("GBPUSD"), 2.0);
        assert!((exposure.max_leg(&pair("EURGBP")) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn release_floors_at_zero_and_reports() {
        let mut exposure = CurrencyExposure::new();
        exposure.add(&pair("EURUSD"), 1.0);
        let clamped = exposure.release(&pair("EURUSD"), 1.5);
        assert_eq!(clamped, vec!["EUR".to_string(), "USD".to_string()]);
        assert_eq!(exposure.get("EUR"), 0.0);
        assert!(exposure.is_non_negative());
    }

    #[test]
    fn release_exact_amount_is_not_clamped() {
        let mut exposure = CurrencyExposure::new();
        exposure.add(&pair("EURUSD"), 0.1 + 0.2);
        let clamped = exposure.release(&pair("EURUSD"), 0.3);
        assert!(clamped.is_empty());
        assert_eq!(exposure.get("USD"), 0.0);
    }
}
