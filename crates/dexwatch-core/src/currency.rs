//! Ledger-native unit and currency conversions.
//!
//! The ledger encodes non-XRP currencies either as a literal 3-letter code
//! or as a 160-bit hex string (ASCII padded with NUL bytes), amounts of the
//! settlement currency as integer "drops" (10^-6 XRP), and timestamps as
//! seconds since the ledger epoch (2000-01-01T00:00:00Z).
//!
//! These functions never panic: an undecodable currency code falls back to
//! the input unchanged.

use crate::error::{CoreError, Result};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

/// The ledger's settlement currency code.
pub const XRP: &str = "XRP";

/// Seconds between the Unix epoch and the ledger epoch (2000-01-01T00:00:00Z).
const LEDGER_EPOCH_OFFSET: i64 = 946_684_800;

/// Number of decimal places in one XRP (1 XRP = 10^6 drops).
const DROPS_SCALE: u32 = 6;

/// Decode a ledger currency code to its human-readable form.
///
/// A 3-character code passes through unchanged. A hex-encoded code is
/// decoded to ASCII, trailing NUL padding stripped, and accepted only if
/// the result is 3 to 20 alphanumeric characters. Anything else returns
/// the input unchanged.
pub fn normalize_currency(code: &str) -> String {
    if code.is_empty() || code == XRP {
        return XRP.to_string();
    }
    if code.len() == 3 {
        return code.to_string();
    }

    let Ok(bytes) = hex::decode(code) else {
        return code.to_string();
    };

    let trimmed: &[u8] = match bytes.iter().rposition(|&b| b != 0) {
        Some(last) => &bytes[..=last],
        None => &[],
    };

    if (3..=20).contains(&trimmed.len()) && trimmed.iter().all(|b| b.is_ascii_alphanumeric()) {
        // Safe: all bytes just checked to be ASCII alphanumeric.
        String::from_utf8(trimmed.to_vec()).unwrap_or_else(|_| code.to_string())
    } else {
        code.to_string()
    }
}

/// Encode a human-readable currency code into the ledger's wire form.
///
/// XRP stays literal; every other code becomes upper-case hex zero-padded
/// to 40 characters (20 bytes), the form the subscription API expects.
pub fn currency_to_ledger_hex(code: &str) -> String {
    if code == XRP {
        return XRP.to_string();
    }
    let mut encoded = hex::encode_upper(code.as_bytes());
    while encoded.len() < 40 {
        encoded.push('0');
    }
    encoded
}

/// Convert an integer drops string to a decimal XRP amount.
///
/// Exact fixed-point conversion: the integer is scaled by 10^-6 without
/// ever passing through floating point.
pub fn drops_to_xrp(raw: &str) -> Result<Decimal> {
    let drops: i64 = raw
        .trim()
        .parse()
        .map_err(|_| CoreError::InvalidDrops(raw.to_string()))?;
    Ok(Decimal::new(drops, DROPS_SCALE))
}

/// Convert a ledger-epoch timestamp to UTC.
///
/// Returns `None` when the field is absent or zero (the ledger uses zero
/// for "no expiration").
pub fn ledger_epoch_to_utc(secs: Option<i64>) -> Option<DateTime<Utc>> {
    let secs = secs.filter(|&s| s != 0)?;
    Utc.timestamp_opt(secs + LEDGER_EPOCH_OFFSET, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_three_letter_code_passthrough() {
        assert_eq!(normalize_currency("USD"), "USD");
        assert_eq!(normalize_currency("XRP"), "XRP");
    }

    #[test]
    fn test_hex_round_trip() {
        let hex = currency_to_ledger_hex("USD");
        assert_eq!(hex.len(), 40);
        assert!(hex.starts_with("555344"));
        assert_eq!(normalize_currency(&hex), "USD");
    }

    #[test]
    fn test_long_code_decodes() {
        let hex = currency_to_ledger_hex("SOLO123");
        assert_eq!(normalize_currency(&hex), "SOLO123");
    }

    #[test]
    fn test_invalid_hex_falls_back_to_input() {
        // Not hex at all
        assert_eq!(normalize_currency("ZZZZNOTHEX"), "ZZZZNOTHEX");
        // Valid hex, but decodes to non-alphanumeric bytes
        let weird = "0102030405060708090A0B0C0D0E0F1011121314";
        assert_eq!(normalize_currency(weird), weird);
    }

    #[test]
    fn test_decoded_too_short_falls_back() {
        // "AB" padded: decodes to 2 chars, below the 3-char floor
        let hex = format!("{:0<40}", hex::encode_upper("AB"));
        assert_eq!(normalize_currency(&hex), hex);
    }

    #[test]
    fn test_empty_code_is_xrp() {
        assert_eq!(normalize_currency(""), "XRP");
    }

    #[test]
    fn test_drops_conversion_exact() {
        assert_eq!(drops_to_xrp("1000000").unwrap(), dec!(1));
        assert_eq!(drops_to_xrp("1").unwrap(), dec!(0.000001));
        assert_eq!(drops_to_xrp("1234567").unwrap(), dec!(1.234567));
        assert_eq!(drops_to_xrp("0").unwrap(), dec!(0));
    }

    #[test]
    fn test_drops_rejects_garbage() {
        assert!(drops_to_xrp("not-a-number").is_err());
        assert!(drops_to_xrp("12.5").is_err());
    }

    #[test]
    fn test_ledger_epoch() {
        // 2000-01-01T00:00:00Z + 86400s = 2000-01-02
        let ts = ledger_epoch_to_utc(Some(86_400)).unwrap();
        assert_eq!(ts.to_rfc3339(), "2000-01-02T00:00:00+00:00");
        assert!(ledger_epoch_to_utc(None).is_none());
        assert!(ledger_epoch_to_utc(Some(0)).is_none());
    }
}
