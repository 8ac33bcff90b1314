//! Core order book store.
//!
//! The [`OrderBook`] holds both sides of the book, the marker of the last
//! applied update and the sync status. It exposes read accessors only; every
//! mutation goes through the [`reconcile`](super::reconcile) functions so the
//! ordering rules cannot be bypassed.

use std::fmt;

use rust_decimal::Decimal;

use super::levels::{PriceLevelMap, TopLevels};
use crate::types::{BookSide, DepthEntry, Marker, Price, Quantity};

/// Sync status of an order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncStatus {
    /// No subscription active
    #[default]
    Disconnected,
    /// Subscription request in flight
    Connecting,
    /// Waiting for a full snapshot
    Syncing,
    /// Snapshot applied, deltas are being applied in order
    Synced,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStatus::Disconnected => "disconnected",
            SyncStatus::Connecting => "connecting",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
        };
        f.write_str(name)
    }
}

/// Order book for a single Crex24 symbol.
///
/// # Design Decisions
///
/// 1. **Decimal prices**: Prices are exact `Decimal`s so they can be used as
///    map keys without floating-point surprises.
///
/// 2. **BTreeMap per side**: Sorted price levels with O(log n) updates and
///    direct access to the best level.
///
/// 3. **Marker tracking**: `last_update_marker` is compared against every
///    incoming delta to detect gaps and trigger re-synchronization.
///
/// # Thread Safety
///
/// This struct is `Send + Sync` but not internally synchronized. The
/// [`SymbolOrderBook`](super::SymbolOrderBook) wraps it in a
/// `parking_lot::RwLock`.
#[derive(Debug, Clone)]
pub struct OrderBook {
    /// Symbol, e.g. `ETH-BTC`
    symbol: String,

    /// Bid levels, best = highest
    pub(super) bids: PriceLevelMap,

    /// Ask levels, best = lowest
    pub(super) asks: PriceLevelMap,

    /// Marker of the last applied update
    pub(super) last_update_marker: Option<Marker>,

    /// Last trade price reported with the latest snapshot
    pub(super) last_trade_price: Option<Price>,

    /// Sync status
    pub(super) status: SyncStatus,
}

impl OrderBook {
    /// Create a new empty, disconnected order book
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: PriceLevelMap::new(BookSide::Bid),
            asks: PriceLevelMap::new(BookSide::Ask),
            last_update_marker: None,
            last_trade_price: None,
            status: SyncStatus::Disconnected,
        }
    }

    /// Get the symbol
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Get the sync status
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Get the marker of the last applied update
    #[must_use]
    pub fn last_update_marker(&self) -> Option<Marker> {
        self.last_update_marker
    }

    /// Get the last trade price sent with the latest snapshot
    #[must_use]
    pub fn last_trade_price(&self) -> Option<Price> {
        self.last_trade_price
    }

    /// Get the best bid (highest price)
    #[must_use]
    pub fn best_bid(&self) -> Option<DepthEntry> {
        self.bids.best()
    }

    /// Get the best ask (lowest price)
    #[must_use]
    pub fn best_ask(&self) -> Option<DepthEntry> {
        self.asks.best()
    }

    /// Get the mid price
    ///
    /// Returns the average of best bid and best ask, or `None` if either is
    /// missing or the sum overflows.
    #[must_use]
    pub fn mid_price(&self) -> Option<Price> {
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        bid.price.checked_add(ask.price)?.checked_div(Decimal::TWO)
    }

    /// Get the spread (best ask - best bid)
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        let (bid, ask) = (self.best_bid()?, self.best_ask()?);
        ask.price.checked_sub(bid.price)
    }

    /// Check if the book is crossed (best bid >= best ask)
    ///
    /// This shouldn't happen in a healthy market but is useful for validation.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    /// Get one side of the book
    #[must_use]
    pub fn side(&self, side: BookSide) -> &PriceLevelMap {
        match side {
            BookSide::Bid => &self.bids,
            BookSide::Ask => &self.asks,
        }
    }

    /// Get the bid side
    #[must_use]
    pub fn bids(&self) -> &PriceLevelMap {
        &self.bids
    }

    /// Get the ask side
    #[must_use]
    pub fn asks(&self) -> &PriceLevelMap {
        &self.asks
    }

    /// Lazily iterate the `n` best levels of a side
    pub fn top_levels(&self, side: BookSide, n: usize) -> TopLevels<'_> {
        self.side(side).top_n(n)
    }

    /// Get total bid quantity
    #[must_use]
    pub fn total_bid_quantity(&self) -> Quantity {
        self.bids.total_quantity()
    }

    /// Get total ask quantity
    #[must_use]
    pub fn total_ask_quantity(&self) -> Quantity {
        self.asks.total_quantity()
    }

    /// Check if the order book is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Get the number of price levels `(bids, asks)`
    #[must_use]
    pub fn num_levels(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    /// Drop all levels and the marker; the status is left to the caller
    pub(super) fn reset(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.last_update_marker = None;
        self.last_trade_price = None;
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new("")
    }
}
