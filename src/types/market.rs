//! Market data types and request parameter validation.
//!
//! Crex24 symbols are `BASE-QUOTE` pairs such as `ETH-BTC`. Depth requests
//! accept a `limit` of 5, 10 or 20 levels and a `merge` depth that groups
//! prices on one of their 8 decimals.

use serde::Deserialize;

use super::{DepthEntry, Price};
use crate::error::Error;

/// Depth limits accepted by the depth endpoints
pub const VALID_LIMITS: [u32; 3] = [5, 10, 20];

/// Maximum merge depth (prices carry 8 decimals)
pub const MAX_MERGE_DEPTH: u8 = 8;

/// Envelope wrapping every REST response
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Zero on success
    #[serde(default)]
    pub code: i64,
    /// Error message, if any
    #[serde(default)]
    pub message: Option<String>,
    /// Response payload
    pub data: Option<T>,
}

/// Order book returned by the REST depth endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RestOrderBook {
    /// Price of the last transaction
    #[serde(default)]
    pub last: Option<Price>,
    /// Ask levels, best first
    #[serde(default)]
    pub asks: Vec<DepthEntry>,
    /// Bid levels, best first
    #[serde(default)]
    pub bids: Vec<DepthEntry>,
}

/// Check that a symbol looks like `BASE-QUOTE`
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] for empty symbols, a missing
/// separator or non-alphanumeric asset codes.
pub fn validate_symbol(symbol: &str) -> Result<(), Error> {
    let valid = match symbol.split_once('-') {
        Some((base, quote)) => {
            !base.is_empty()
                && !quote.is_empty()
                && base.chars().all(|c| c.is_ascii_alphanumeric())
                && quote.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "symbol '{}' is not a Crex24 BASE-QUOTE pair",
            symbol
        )))
    }
}

/// Check a depth limit against [`VALID_LIMITS`]
pub fn validate_limit(limit: u32) -> Result<(), Error> {
    if VALID_LIMITS.contains(&limit) {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "limit {} must be one of {:?}",
            limit, VALID_LIMITS
        )))
    }
}

/// Check a merge depth is within `0..=8`
pub fn validate_merge_depth(merge_depth: u8) -> Result<(), Error> {
    if merge_depth <= MAX_MERGE_DEPTH {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "merge depth {} must be between 0 and {}",
            merge_depth, MAX_MERGE_DEPTH
        )))
    }
}

/// Wire form of a merge depth.
///
/// Depth `d` merges the last `d` decimals, so `0` becomes `"0.00000001"`,
/// `7` becomes `"0.1"` and `8` (merge everything) becomes `"0"`.
pub fn merge_depth_string(merge_depth: u8) -> String {
    if merge_depth >= MAX_MERGE_DEPTH {
        return "0".to_string();
    }
    format!("0.{}1", "0".repeat(usize::from(7 - merge_depth)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_symbol() {
        assert!(validate_symbol("ETH-BTC").is_ok());
        assert!(validate_symbol("USDT-1INCH").is_ok());
        assert!(validate_symbol("").is_err());
        assert!(validate_symbol("ETHBTC").is_err());
        assert!(validate_symbol("ETH-").is_err());
        assert!(validate_symbol("ETH-B/TC").is_err());
    }

    #[test]
    fn test_validate_limit_and_merge() {
        assert!(validate_limit(20).is_ok());
        assert!(validate_limit(15).is_err());
        assert!(validate_merge_depth(8).is_ok());
        assert!(validate_merge_depth(9).is_err());
    }

    #[test]
    fn test_merge_depth_string() {
        assert_eq!(merge_depth_string(0), "0.00000001");
        assert_eq!(merge_depth_string(6), "0.01");
        assert_eq!(merge_depth_string(7), "0.1");
        assert_eq!(merge_depth_string(8), "0");
    }

    #[test]
    fn test_rest_order_book_envelope() {
        let json = r#"{"code": 0, "message": null, "data": {
            "last": "101.5",
            "asks": [["102", "1"]],
            "bids": [["101", "2"], ["100", "3"]]
        }}"#;
        let envelope: ApiEnvelope<RestOrderBook> = serde_json::from_str(json).unwrap();
        let book = envelope.data.unwrap();
        assert_eq!(envelope.code, 0);
        assert_eq!(book.last, Some(dec!(101.5)));
        assert_eq!(book.bids[1], DepthEntry::new(dec!(100), dec!(3)));
    }
}
