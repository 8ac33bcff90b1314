//! One side of an order book.
//!
//! [`PriceLevelMap`] keeps `price -> quantity` in a `BTreeMap`, giving:
//!
//! - O(log n) insertion, deletion, and lookup
//! - cheap access to the best level (via `first_key_value` / `last_key_value`)
//! - ordered iteration for top-of-book queries
//!
//! Bids and asks share the same storage order (ascending price); the side
//! decides which end is "best".

use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::types::{BookSide, DepthEntry, Price, Quantity};

/// Price levels for a single side of the book.
///
/// Invariant: no stored level has a zero quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevelMap {
    side: BookSide,
    levels: BTreeMap<Price, Quantity>,
}

impl PriceLevelMap {
    /// Create an empty side
    #[must_use]
    pub fn new(side: BookSide) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Which side this map holds
    #[must_use]
    pub fn side(&self) -> BookSide {
        self.side
    }

    /// Apply one level change.
    ///
    /// A zero quantity removes the price (no-op if absent); anything else
    /// inserts or overwrites it.
    pub fn apply(&mut self, entry: DepthEntry) {
        if entry.quantity.is_zero() {
            self.levels.remove(&entry.price);
        } else {
            self.levels.insert(entry.price, entry.quantity);
        }
    }

    /// Replace the whole side with `entries`, dropping zero quantities
    pub fn replace<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = DepthEntry>,
    {
        self.levels.clear();
        for entry in entries {
            self.apply(entry);
        }
    }

    /// The best level: highest bid or lowest ask
    #[must_use]
    pub fn best(&self) -> Option<DepthEntry> {
        let level = match self.side {
            BookSide::Bid => self.levels.last_key_value(),
            BookSide::Ask => self.levels.first_key_value(),
        };
        level.map(|(&price, &quantity)| DepthEntry::new(price, quantity))
    }

    /// Lazily iterate the `n` best levels, best first.
    ///
    /// The iterator is `Clone`, so it can be restarted without touching the
    /// map again. Asking for more levels than exist yields all of them.
    pub fn top_n(&self, n: usize) -> TopLevels<'_> {
        TopLevels {
            inner: self.levels.iter(),
            side: self.side,
            remaining: n,
        }
    }

    /// Iterate every level, best first
    pub fn iter(&self) -> TopLevels<'_> {
        self.top_n(usize::MAX)
    }

    /// Quantity resting at `price`
    #[must_use]
    pub fn get(&self, price: &Price) -> Option<Quantity> {
        self.levels.get(price).copied()
    }

    /// Sum of all quantities on this side
    #[must_use]
    pub fn total_quantity(&self) -> Quantity {
        self.levels.values().copied().sum()
    }

    /// Number of price levels
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether the side is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Remove every level
    pub fn clear(&mut self) {
        self.levels.clear();
    }
}

/// Iterator over the best levels of one side, see [`PriceLevelMap::top_n`]
#[derive(Debug, Clone)]
pub struct TopLevels<'a> {
    inner: btree_map::Iter<'a, Price, Quantity>,
    side: BookSide,
    remaining: usize,
}

impl Iterator for TopLevels<'_> {
    type Item = DepthEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let level = match self.side {
            BookSide::Bid => self.inner.next_back(),
            BookSide::Ask => self.inner.next(),
        }?;
        self.remaining -= 1;
        Some(DepthEntry::new(*level.0, *level.1))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.inner.len().min(self.remaining);
        (len, Some(len))
    }
}

impl ExactSizeIterator for TopLevels<'_> {}
