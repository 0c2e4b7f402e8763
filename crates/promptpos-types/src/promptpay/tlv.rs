//! EMVCo tag-length-value fields.
//!
//! Every field is a two-digit tag, a two-digit zero-padded decimal length and
//! the value itself. Lengths count bytes; PromptPay values are ASCII so bytes
//! and characters coincide.

use super::PromptPayError;

/// Largest value a two-digit length prefix can declare.
pub const MAX_VALUE_LEN: usize = 99;

/// A single field read from a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tag: &'a str,
    pub value: &'a str,
}

impl Tlv<'_> {
    /// Reads the nested fields of a template value, such as merchant account information.
    pub fn nested(&self) -> TlvReader<'_> {
        TlvReader::new(self.value)
    }
}

/// Appends `tag`, the zero-padded length of `value`, and `value` to `buf`.
///
/// Values longer than [`MAX_VALUE_LEN`] cannot be represented; callers bound
/// their inputs before getting here.
pub(crate) fn push_field(buf: &mut String, tag: &str, value: &str) {
    debug_assert_eq!(tag.len(), 2);
    debug_assert!(value.len() <= MAX_VALUE_LEN);
    buf.push_str(tag);
    buf.push_str(&format!("{:02}", value.len()));
    buf.push_str(value);
}

/// Iterator over the top-level fields of a TLV string.
///
/// Stops after the first error.
#[derive(Debug, Clone)]
pub struct TlvReader<'a> {
    input: &'a str,
    offset: usize,
    failed: bool,
}

impl<'a> TlvReader<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            offset: 0,
            failed: false,
        }
    }

    fn fail(&mut self, reason: &'static str) -> Option<Result<Tlv<'a>, PromptPayError>> {
        self.failed = true;
        Some(Err(PromptPayError::Malformed {
            offset: self.offset,
            reason,
        }))
    }
}

impl<'a> Iterator for TlvReader<'a> {
    type Item = Result<Tlv<'a>, PromptPayError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.input.len() {
            return None;
        }
        let rest = &self.input[self.offset..];
        if !rest.is_ascii() {
            return self.fail("non-ascii content");
        }
        if rest.len() < 4 {
            return self.fail("truncated field header");
        }
        let tag = &rest[..2];
        if !tag.bytes().all(|b| b.is_ascii_digit()) {
            return self.fail("tag is not numeric");
        }
        let len = match rest[2..4].parse::<usize>() {
            Ok(len) if rest[2..4].bytes().all(|b| b.is_ascii_digit()) => len,
            _ => return self.fail("length is not numeric"),
        };
        if rest.len() < 4 + len {
            return self.fail("declared length exceeds remaining input");
        }
        let value = &rest[4..4 + len];
        self.offset += 4 + len;
        Some(Ok(Tlv { tag, value }))
    }
}
