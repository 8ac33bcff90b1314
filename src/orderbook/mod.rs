//! Streaming order book engine.
//!
//! This module keeps a local copy of a Crex24 order book in sync with the
//! exchange's depth stream:
//!
//! - [`PriceLevelMap`]: one side of the book, ordered by price
//! - [`OrderBook`]: both sides plus the last applied marker and sync status
//! - [`reconcile`]: the only code that mutates a book (snapshots and deltas)
//! - [`SymbolOrderBook`]: the sync state machine driving a book from a [`DepthFeed`]
//! - [`OrderBookManager`]: many books sharing one feed
//!
//! # Example
//!
//! ```rust
//! use crex24_rs::orderbook::{reconcile, OrderBook};
//! use crex24_rs::types::DepthEntry;
//! use rust_decimal_macros::dec;
//!
//! let mut book = OrderBook::new("ETH-BTC");
//!
//! // Apply a snapshot
//! reconcile::apply_full(
//!     &mut book,
//!     &[DepthEntry::new(dec!(0.051), dec!(12))],
//!     &[DepthEntry::new(dec!(0.052), dec!(4))],
//!     1,
//! )
//! .unwrap();
//!
//! if let Some(bid) = book.best_bid() {
//!     println!("Best bid: {}", bid);
//! }
//! ```

pub mod book;
pub mod feed;
pub mod levels;
pub mod manager;
pub mod reconcile;
pub mod sync;

pub use book::{OrderBook, SyncStatus};
pub use feed::{DepthFeed, DepthUpdate, FeedEvent, SubscriptionHandle};
pub use levels::{PriceLevelMap, TopLevels};
pub use manager::OrderBookManager;
pub use sync::{BookEvent, SymbolOrderBook};
