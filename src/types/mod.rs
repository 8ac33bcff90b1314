//! API types for Crex24 requests and responses.
//!
//! This module contains Rust types that correspond to the Crex24 API's
//! JSON request and response bodies, plus the small value types shared by
//! the order book engine.
//!
//! - [`market`] - REST order book payloads and request parameter validation
//! - [`messages`] - WebSocket message types

pub mod market;
pub mod messages;

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use market::RestOrderBook;
pub use messages::{SocketOrderBook, SocketRequest};

/// Price of a depth level
///
/// Crex24 quotes prices with up to 8 decimals. `Decimal` keeps them exact,
/// which matters because prices are used as map keys.
pub type Price = Decimal;

/// Quantity resting at a depth level
pub type Quantity = Decimal;

/// Ordering token attached to every depth update
///
/// Either an exchange sequence number or a timestamp; see
/// [`MarkerPolicy`](crate::config::MarkerPolicy) for how successors are judged.
pub type Marker = u64;

/// Timestamp in milliseconds since Unix epoch
pub type TimestampMs = u64;

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    /// Buy orders, best = highest price
    Bid,
    /// Sell orders, best = lowest price
    Ask,
}

impl BookSide {
    /// Get the opposite side
    pub fn opposite(self) -> Self {
        match self {
            BookSide::Bid => BookSide::Ask,
            BookSide::Ask => BookSide::Bid,
        }
    }
}

impl fmt::Display for BookSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookSide::Bid => f.write_str("bid"),
            BookSide::Ask => f.write_str("ask"),
        }
    }
}

/// A single `(price, quantity)` depth level.
///
/// A quantity of zero means "remove this price level". On the wire Crex24
/// sends levels as two-element arrays (`["0.0125", "3.5"]`), which is also
/// the serialized form used here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(Price, Quantity)", into = "(Price, Quantity)")]
pub struct DepthEntry {
    /// Price of the level
    pub price: Price,
    /// Quantity at the level (zero = remove)
    pub quantity: Quantity,
}

impl DepthEntry {
    /// Create a new depth entry
    #[must_use]
    pub const fn new(price: Price, quantity: Quantity) -> Self {
        Self { price, quantity }
    }

    /// Whether this entry removes its price level
    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.quantity.is_zero()
    }
}

impl From<(Price, Quantity)> for DepthEntry {
    fn from((price, quantity): (Price, Quantity)) -> Self {
        Self { price, quantity }
    }
}

impl From<DepthEntry> for (Price, Quantity) {
    fn from(entry: DepthEntry) -> Self {
        (entry.price, entry.quantity)
    }
}

impl fmt::Display for DepthEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.quantity, self.price)
    }
}
