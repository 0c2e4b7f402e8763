//! PromptPay QR payloads in the EMVCo merchant-presented format.
//!
//! A payload is a flat sequence of tag-length-value fields in a fixed order,
//! terminated by a CRC16 checksum field:
//!
//! | Tag | Field | Value |
//! |-----|-------|-------|
//! | `00` | Payload format indicator | `01` |
//! | `01` | Point of initiation method | `11` (static) |
//! | `29` | Merchant account information | PromptPay AID + payee proxy |
//! | `53` | Transaction currency | `764` (THB) |
//! | `54` | Transaction amount | two-decimal amount, omitted for open amounts |
//! | `58` | Country code | `TH` |
//! | `63` | CRC | four uppercase hex digits |
//!
//! # Example
//!
//! ```
//! use promptpos_types::promptpay;
//! use promptpos_types::util::BahtAmount;
//!
//! let payload = promptpay::encode("0812345678", BahtAmount::from(100)).unwrap();
//! assert_eq!(
//!     payload,
//!     "00020101021129370016A0000006770101110113006681234567853037645406100.005802TH63045169"
//! );
//! assert!(promptpay::verify(&payload).is_ok());
//! ```

mod crc;
mod target;
mod tlv;

pub use crc::*;
pub use target::*;
pub use tlv::{MAX_VALUE_LEN, Tlv, TlvReader};

use crate::util::{BahtAmount, MoneyAmountParseError};

/// Application identifier registered for PromptPay credit transfers.
pub const PROMPTPAY_AID: &str = "A000000677010111";

mod tags {
    pub const PAYLOAD_FORMAT: &str = "00";
    pub const POINT_OF_INITIATION: &str = "01";
    pub const MERCHANT_ACCOUNT: &str = "29";
    pub const MERCHANT_ACCOUNT_GUID: &str = "00";
    pub const CURRENCY: &str = "53";
    pub const AMOUNT: &str = "54";
    pub const COUNTRY: &str = "58";
    pub const CRC: &str = "63";
}

const PAYLOAD_FORMAT_V1: &str = "01";
const STATIC_QR: &str = "11";
const CURRENCY_THB: &str = "764";
const COUNTRY_TH: &str = "TH";
/// `63` tag plus its fixed `04` length; the checksum covers this marker.
const CRC_MARKER: &str = "6304";

/// Errors produced while building or checking a PromptPay payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptPayError {
    /// After stripping non-digits the target is neither a mobile number nor a tax ID.
    #[error("PromptPay target must be a 10-digit mobile number or a 13-digit tax ID, got {} digits", digits.len())]
    InvalidTarget { digits: String },
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] MoneyAmountParseError),
    #[error("Malformed payload at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: &'static str },
    #[error("Checksum mismatch: payload carries {actual}, computed {expected}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// Builder for a single PromptPay payload.
///
/// ```
/// use promptpos_types::promptpay::{PromptPay, PromptPayTarget};
///
/// let target = PromptPayTarget::parse("0812345678").unwrap();
/// let open_amount = PromptPay::new(target).encode();
/// assert!(open_amount.ends_with("5802TH6304823E"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPay {
    target: PromptPayTarget,
    amount: Option<BahtAmount>,
}

impl PromptPay {
    pub fn new(target: PromptPayTarget) -> Self {
        Self {
            target,
            amount: None,
        }
    }

    pub fn with_amount(mut self, amount: BahtAmount) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn target(&self) -> &PromptPayTarget {
        &self.target
    }

    pub fn amount(&self) -> Option<BahtAmount> {
        self.amount
    }

    /// Renders the payload, checksum included.
    pub fn encode(&self) -> String {
        let mut merchant_account = String::new();
        tlv::push_field(
            &mut merchant_account,
            tags::MERCHANT_ACCOUNT_GUID,
            PROMPTPAY_AID,
        );
        tlv::push_field(
            &mut merchant_account,
            self.target.kind().sub_tag(),
            self.target.proxy_value(),
        );

        let mut payload = String::with_capacity(96);
        tlv::push_field(&mut payload, tags::PAYLOAD_FORMAT, PAYLOAD_FORMAT_V1);
        tlv::push_field(&mut payload, tags::POINT_OF_INITIATION, STATIC_QR);
        tlv::push_field(&mut payload, tags::MERCHANT_ACCOUNT, &merchant_account);
        tlv::push_field(&mut payload, tags::CURRENCY, CURRENCY_THB);
        if let Some(amount) = self.amount {
            tlv::push_field(&mut payload, tags::AMOUNT, &amount.to_string());
        }
        tlv::push_field(&mut payload, tags::COUNTRY, COUNTRY_TH);
        payload.push_str(CRC_MARKER);
        let checksum = checksum_hex(payload.as_bytes());
        payload.push_str(&checksum);

        #[cfg(feature = "telemetry")]
        tracing::trace!(kind = ?self.target.kind(), %checksum, "Encoded PromptPay payload");

        payload
    }
}

/// Encodes a payload for `target` requesting `amount`.
///
/// `target` may contain separators; only digits are significant.
pub fn encode(target: &str, amount: BahtAmount) -> Result<String, PromptPayError> {
    let target = PromptPayTarget::parse(target)?;
    Ok(PromptPay::new(target).with_amount(amount).encode())
}

/// Checks the trailing checksum and the TLV structure of `payload`.
///
/// The CRC field must be the last field.
pub fn verify(payload: &str) -> Result<(), PromptPayError> {
    let crc_field_len = CRC_MARKER.len() + 4;
    if !payload.is_ascii() || payload.len() < crc_field_len {
        return Err(PromptPayError::Malformed {
            offset: 0,
            reason: "payload too short",
        });
    }
    let (body, actual) = payload.split_at(payload.len() - 4);
    if !body.ends_with(CRC_MARKER) {
        return Err(PromptPayError::Malformed {
            offset: body.len() - CRC_MARKER.len(),
            reason: "missing CRC field",
        });
    }
    let expected = checksum_hex(body.as_bytes());
    if expected != actual {
        return Err(PromptPayError::ChecksumMismatch {
            expected,
            actual: actual.to_string(),
        });
    }
    let mut last_tag = None;
    for field in TlvReader::new(payload) {
        last_tag = Some(field?.tag);
    }
    if last_tag != Some(tags::CRC) {
        return Err(PromptPayError::Malformed {
            offset: body.len() - CRC_MARKER.len(),
            reason: "CRC field is not the last field",
        });
    }
    Ok(())
}
