//! Currency pairs and pip metadata.

use std::collections::BTreeMap;

use super::error::ValidationError;

/// A six-letter currency pair split into its base and quote legs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CurrencyPair {
    pub base: String,
    pub quote: String,
}

impl CurrencyPair {
    /// Parse a symbol such as `EURUSD`, `eur/usd` or `EURUSD=X`.
    pub fn parse(symbol: &str) -> Option<Self> {
        let normalized = normalize(symbol);
        if normalized.len() != 6 || !normalized.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        Some(CurrencyPair {
            base: normalized[..3].to_string(),
            quote: normalized[3..].to_string(),
        })
    }

    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// True when the two pairs share at least one currency leg.
    pub fn shares_leg_with(&self, other: &CurrencyPair) -> bool {
        self.base == other.base
            || self.base == other.quote
            || self.quote == other.base
            || self.quote == other.quote
    }
}

/// Uppercase, drop separators and the `=X` vendor suffix.
pub fn normalize(symbol: &str) -> String {
    let upper = symbol.trim().to_ascii_uppercase();
    let stripped = upper.strip_suffix("=X").unwrap_or(&upper);
    stripped.chars().filter(|c| *c != '/' && *c != '_').collect()
}

/// Pip size (price increment) and pip cost (account currency per pip per lot).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipSpec {
    pub pip_size: f64,
    pub pip_cost: f64,
}

impl PipSpec {
    /// Default pip metadata for a pair: 0.01 for JPY-quoted pairs, 0.0001 otherwise, $10 per pip.
    pub fn standard(pair: &CurrencyPair) -> Self {
        let pip_size = if pair.quote == "JPY" { 0.01 } else { 0.0001 };
        PipSpec {
            pip_size,
            pip_cost: 10.0,
        }
    }

    pub fn to_pips(&self, price_distance: f64) -> f64 {
        price_distance / self.pip_size
    }

    /// Money value of a price move for a given size.
    pub fn value_of(&self, price_distance: f64, size: f64) -> f64 {
        self.to_pips(price_distance) * size * self.pip_cost
    }
}

const DEFAULT_SYMBOLS: [&str; 10] = [
    "EURUSD", "GBPUSD", "USDJPY", "AUDUSD", "USDCAD", "USDCHF", "NZDUSD", "EURGBP", "EURJPY",
    "GBPJPY",
];

/// Pip metadata lookup, keyed by normalised symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolTable {
    specs: BTreeMap<String, PipSpec>,
}

impl SymbolTable {
    pub fn empty() -> Self {
        SymbolTable {
            specs: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, symbol: &str, spec: PipSpec) {
        self.specs.insert(normalize(symbol), spec);
    }

    pub fn get(&self, symbol: &str) -> Option<PipSpec> {
        self.specs.get(&normalize(symbol)).copied()
    }

    pub fn lookup(&self, symbol: &str) -> Result<PipSpec, ValidationError> {
        self.get(symbol).ok_or_else(|| ValidationError::UnknownSymbol {
            symbol: symbol.to_string(),
        })
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.specs.contains_key(&normalize(symbol))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        let mut table = SymbolTable::empty();
        for symbol in DEFAULT_SYMBOLS {
            if let Some(pair) = CurrencyPair::parse(symbol) {
                table.register(symbol, PipSpec::standard(&pair));
            }
        }
        table.register(
            "USDJPY",
            PipSpec {
                pip_size: 0.01,
                pip_cost: 9.09,
            },
        );
        table
    }
}
