//! Per-symbol dollar value of a one-unit price move on one lot

use crate::error::{CalcError, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// Rate used for symbols missing from the table
pub const DEFAULT_RATE: Decimal = dec!(10.0);

/// Standard table: FX crosses, gold, crypto majors
pub const STANDARD_RATES: &[(&str, Decimal)] = &[
    ("AUDCAD", dec!(74000)),
    ("AUDCHF", dec!(122000)),
    ("AUDJPY", dec!(700)),
    ("AUDNZD", dec!(65000)),
    ("AUDUSD", dec!(100000)),
    ("CADCHF", dec!(122000)),
    ("CADJPY", dec!(700)),
    ("CHFJPY", dec!(700)),
    ("EURAUD", dec!(66000)),
    ("EURCAD", dec!(74000)),
    ("EURCHF", dec!(122000)),
    ("EURGBP", dec!(134000)),
    ("EURJPY", dec!(700)),
    ("EURNZD", dec!(60000)),
    ("EURUSD", dec!(100000)),
    ("GBPAUD", dec!(66000)),
    ("GBPCHF", dec!(122000)),
    ("GBPJPY", dec!(700)),
    ("GBPUSD", dec!(100000)),
    ("GBPCAD", dec!(74000)),
    ("GBPNZD", dec!(61000)),
    ("NZDCAD", dec!(74000)),
    ("NZDCHF", dec!(122000)),
    ("NZDJPY", dec!(700)),
    ("NZDUSD", dec!(100000)),
    ("USDCAD", dec!(74000)),
    ("USDCHF", dec!(122000)),
    ("USDJPY", dec!(700)),
    ("XAUUSD", dec!(100)),
    ("ADAUSD", dec!(10000)),
    ("AVAXUSD", dec!(100)),
    ("BCHUSD", dec!(10)),
    ("BTCUSD", dec!(1)),
    ("DOGEUSD", dec!(100000)),
    ("ETHUSD", dec!(1)),
    ("LINKUSD", dec!(250)),
    ("LTCUSD", dec!(100)),
    ("SOLUSD", dec!(100)),
    ("XRPUSD", dec!(50000)),
];

/// Result of a rate lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLookup {
    Configured(Decimal),
    Fallback(Decimal),
}

impl RateLookup {
    pub fn value(&self) -> Decimal {
        match self {
            RateLookup::Configured(v) | RateLookup::Fallback(v) => *v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, RateLookup::Fallback(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTable {
    rates: HashMap<String, Decimal>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        let mut table = Self::new();
        for (symbol, rate) in STANDARD_RATES {
            table.insert(symbol, *rate);
        }
        table
    }

    /// Symbols are matched case-insensitively
    pub fn insert(&mut self, symbol: &str, rate: Decimal) {
        self.rates.insert(symbol.trim().to_ascii_uppercase(), rate);
    }

    pub fn extend<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: AsRef<str>,
    {
        for (symbol, rate) in entries {
            self.insert(symbol.as_ref(), rate);
        }
    }

    pub fn get(&self, symbol: &str) -> Option<Decimal> {
        self.rates.get(&symbol.trim().to_ascii_uppercase()).copied()
    }

    pub fn lookup(&self, symbol: &str) -> RateLookup {
        match self.get(symbol) {
            Some(rate) => RateLookup::Configured(rate),
            None => RateLookup::Fallback(DEFAULT_RATE),
        }
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.get(symbol).is_some()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Every rate must be strictly positive and the table non-empty
    pub fn validate(&self) -> Result<()> {
        if self.rates.is_empty() {
            return Err(CalcError::Config("rate table is empty".into()));
        }

        let mut bad: Vec<String> = self
            .rates
            .iter()
            .filter(|(_, rate)| **rate <= Decimal::ZERO)
            .map(|(symbol, rate)| format!("{}={}", symbol, rate))
            .collect();
        if !bad.is_empty() {
            bad.sort();
            return Err(CalcError::Config(format!(
                "non-positive rates: {}",
                bad.join(", ")
            )));
        }

        Ok(())
    }
}
