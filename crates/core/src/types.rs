//! Core type definitions

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Last traded price. Valid values are finite and strictly positive.
pub type Price = f64;

/// Returns true if `value` can be served as a price
pub fn is_valid_price(value: Price) -> bool {
    value.is_finite() && value > 0.0
}

/// Application-level instrument pair, e.g. `BTC/USD`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pair(String);

impl Pair {
    pub fn new(pair: impl Into<String>) -> Self {
        Self(pair.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Pair {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Pair {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for Pair {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Upstream exchange identifier for an instrument, e.g. `XBTUSD`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One resolved pair in a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LtpEntry {
    pub pair: Pair,
    pub amount: Price,
}

impl LtpEntry {
    pub fn new(pair: Pair, amount: Price) -> Self {
        Self { pair, amount }
    }
}

/// Top-level payload served by `/api/v1/ltp`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LtpResponse {
    pub ltp: Vec<LtpEntry>,
}

impl LtpResponse {
    pub fn new(ltp: Vec<LtpEntry>) -> Self {
        Self { ltp }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}
