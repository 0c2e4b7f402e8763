//! PromptPay payee identifiers.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use super::PromptPayError;

/// Country calling code prefix replacing the leading `0` of a Thai mobile number.
const MOBILE_COUNTRY_PREFIX: &str = "0066";

/// Which kind of PromptPay proxy a target resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// A 10-digit Thai mobile number starting with `0`.
    Mobile,
    /// A 13-digit citizen or tax identification number.
    TaxId,
}

impl TargetKind {
    /// Sub-tag of the merchant account information template carrying the proxy value.
    ///
    /// A tax ID goes under `02` as EMVCo assigns it. Some older generators put
    /// every 13-character proxy, tax IDs included, under `01`; payloads from
    /// this crate differ from theirs for tax ID targets.
    pub fn sub_tag(&self) -> &'static str {
        match self {
            TargetKind::Mobile => "01",
            TargetKind::TaxId => "02",
        }
    }
}

/// A validated PromptPay payee.
///
/// Construction strips everything that is not an ASCII digit, so
/// `"081-234-5678"` and `"0812345678"` are the same target.
///
/// # Example
///
/// ```
/// use promptpos_types::promptpay::{PromptPayTarget, TargetKind};
///
/// let target: PromptPayTarget = "081-234-5678".parse().unwrap();
/// assert_eq!(target.kind(), TargetKind::Mobile);
/// assert_eq!(target.proxy_value(), "0066812345678");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPayTarget {
    kind: TargetKind,
    proxy: String,
}

impl PromptPayTarget {
    pub fn parse(input: &str) -> Result<Self, PromptPayError> {
        let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
        match digits.len() {
            10 if digits.starts_with('0') => Ok(Self {
                kind: TargetKind::Mobile,
                proxy: format!("{MOBILE_COUNTRY_PREFIX}{}", &digits[1..]),
            }),
            13 => Ok(Self {
                kind: TargetKind::TaxId,
                proxy: digits,
            }),
            _ => Err(PromptPayError::InvalidTarget { digits }),
        }
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// The 13-character value placed in the payload.
    pub fn proxy_value(&self) -> &str {
        &self.proxy
    }
}

impl FromStr for PromptPayTarget {
    type Err = PromptPayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PromptPayTarget::parse(s)
    }
}

impl TryFrom<&str> for PromptPayTarget {
    type Error = PromptPayError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        PromptPayTarget::parse(value)
    }
}

impl Display for PromptPayTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.proxy)
    }
}
