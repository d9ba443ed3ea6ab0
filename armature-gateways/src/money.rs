//! Money amounts
//!
//! Amounts travel in the smallest currency unit. GlobalCollect takes them as
//! is, PayDollar wants major units (`12.34`), so the conversion lives here.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of decimal places a currency uses (ISO 4217 minor unit).
///
/// Only zero-decimal currencies need listing; everything else uses two.
pub fn minor_unit_exponent(currency: &str) -> u32 {
    match currency.to_uppercase().as_str() {
        "JPY" | "KRW" | "VND" | "CLP" | "ISK" | "PYG" | "UGX" => 0,
        _ => 2,
    }
}

/// Money amount in the smallest currency unit (cents, pence, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Create from smallest unit
    pub fn new(minor_units: i64) -> Self {
        Self(minor_units)
    }

    /// Create from a major-unit decimal (e.g., 29.99) for the given currency.
    ///
    /// Returns `None` when the amount does not fit in minor units.
    pub fn from_decimal(amount: Decimal, currency: &str) -> Option<Self> {
        let multiplier = Decimal::from(10i64.pow(minor_unit_exponent(currency)));
        amount.checked_mul(multiplier)?.round().to_i64().map(Self)
    }

    /// Amount in smallest unit
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Amount in major units for the given currency
    pub fn to_decimal(&self, currency: &str) -> Decimal {
        Decimal::new(self.0, minor_unit_exponent(currency))
    }

    /// Major-unit string with the currency's scale, e.g. `"12.34"` or `"100"`
    pub fn format_major(&self, currency: &str) -> String {
        self.to_decimal(currency).to_string()
    }

    /// Check if positive
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl From<i64> for Money {
    fn from(minor_units: i64) -> Self {
        Self(minor_units)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
