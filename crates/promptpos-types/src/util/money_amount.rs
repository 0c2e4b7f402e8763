//! Human-readable baht amount parsing.
//!
//! This module provides [`BahtAmount`], a non-negative decimal amount that renders
//! with exactly two fraction digits, the way the EMVCo transaction amount field
//! expects it.
//!
//! # Supported Formats
//!
//! - Plain numbers: `"100"`, `"0.5"`
//! - With currency symbols: `"฿10.50"`, `"THB 20"`
//! - With thousand separators: `"1,000"`, `"1,000,000.50"`
//!
//! # Example
//!
//! ```rust
//! use promptpos_types::util::money_amount::BahtAmount;
//!
//! let amount = BahtAmount::parse("฿1,250.5").unwrap();
//! assert_eq!(amount.to_string(), "1250.50");
//! ```

use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::LazyLock;

/// A non-negative amount of Thai baht, rounded to satang (two decimal places).
///
/// Rounding happens once, at construction, half away from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BahtAmount(Decimal);

/// Errors that can occur when parsing a baht amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyAmountParseError {
    /// The input string could not be parsed as a number.
    #[error("Invalid number format")]
    InvalidFormat,
    /// The value does not fit the payload amount field.
    #[error("Amount must be between {} and {}", constants::MIN_STR, constants::MAX_STR)]
    OutOfRange,
    /// Negative values are not allowed.
    #[error("Negative value is not allowed")]
    Negative,
}

mod constants {
    use super::*;

    pub const MIN_STR: &str = "0.00";
    /// Thirteen characters, the widest value the amount field carries.
    pub const MAX_STR: &str = "9999999999.99";

    pub static MAX: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));
}

static NOT_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d\.\-]+").expect("valid regex"));

impl BahtAmount {
    pub const ZERO: BahtAmount = BahtAmount(Decimal::ZERO);

    /// Parses a human-readable amount.
    ///
    /// Currency symbols, thousand separators, and whitespace are stripped
    /// before parsing.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The string cannot be parsed as a number
    /// - The value is negative
    /// - The value does not fit in thirteen characters once rendered
    pub fn parse(input: &str) -> Result<Self, MoneyAmountParseError> {
        let cleaned = NOT_NUMERIC.replace_all(input, "");
        let parsed =
            Decimal::from_str(&cleaned).map_err(|_| MoneyAmountParseError::InvalidFormat)?;
        Self::try_from(parsed)
    }

    /// The rounded decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Whole satang, e.g. `12.34` is `1234`.
    pub fn satang(&self) -> u128 {
        (self.0 * Decimal::ONE_HUNDRED).trunc().mantissa().unsigned_abs()
    }
}

impl TryFrom<Decimal> for BahtAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(MoneyAmountParseError::Negative);
        }
        let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        if rounded > *constants::MAX {
            return Err(MoneyAmountParseError::OutOfRange);
        }
        Ok(BahtAmount(rounded.abs()))
    }
}

impl FromStr for BahtAmount {
    type Err = MoneyAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BahtAmount::parse(s)
    }
}

impl TryFrom<&str> for BahtAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        BahtAmount::from_str(value)
    }
}

impl From<u32> for BahtAmount {
    fn from(value: u32) -> Self {
        BahtAmount(Decimal::from(value))
    }
}

impl TryFrom<f64> for BahtAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        let decimal = Decimal::from_f64(value).ok_or(MoneyAmountParseError::OutOfRange)?;
        Self::try_from(decimal)
    }
}

/// Always two fraction digits: `100` renders as `100.00`.
impl Display for BahtAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = self.0;
        value.rescale(2);
        write!(f, "{value}")
    }
}
