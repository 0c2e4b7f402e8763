//! CRC-16/CCITT-FALSE as required by the EMV QR code specification.
//!
//! Polynomial `0x1021`, initial value `0xFFFF`, no input/output reflection,
//! no final XOR. The checksum covers the payload up to and including the
//! `6304` marker of the CRC field.

const POLYNOMIAL: u16 = 0x1021;
const INITIAL: u16 = 0xFFFF;

/// Computes the CRC-16/CCITT-FALSE checksum of `bytes`.
///
/// # Example
///
/// ```
/// use promptpos_types::promptpay::crc16_ccitt;
///
/// assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
/// ```
pub fn crc16_ccitt(bytes: &[u8]) -> u16 {
    bytes.iter().fold(INITIAL, |crc, byte| {
        let mut crc = crc ^ ((*byte as u16) << 8);
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
        }
        crc
    })
}

/// Renders a checksum the way it is appended to a payload: four uppercase hex digits.
pub fn checksum_hex(bytes: &[u8]) -> String {
    format!("{:04X}", crc16_ccitt(bytes))
}
