//! # crex24-rs
//!
//! A Rust client for the [Crex24](https://crex24.com) exchange market data API,
//! built around a self-synchronizing streamed order book.
//!
//! ## Features
//!
//! - **Streaming Order Book** - Snapshot plus deltas, gap detection and automatic resync
//! - **Consistent Reads** - Any number of readers, never a half-applied update
//! - **Reconnects** - Resubscription with exponential backoff after a disconnect
//! - **REST Client** - Order book queries against the public API
//! - **Async/Await** - Built on Tokio
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crex24_rs::config::OrderBookConfig;
//! use crex24_rs::types::BookSide;
//! use crex24_rs::{Config, Crex24Client};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), crex24_rs::Error> {
//!     let client = Crex24Client::new(Config::new())?;
//!
//!     let book = client.symbol_order_book("ETH-BTC", OrderBookConfig::new().with_levels(10))?;
//!     book.start().await?;
//!
//!     println!("spread: {:?}", book.spread());
//!     for level in book.top_levels(BookSide::Bid, 5) {
//!         println!("bid {level}");
//!     }
//!
//!     book.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Sync Model
//!
//! A [`SymbolOrderBook`](orderbook::SymbolOrderBook) moves through
//! `Disconnected -> Connecting -> Syncing -> Synced`. Deltas are applied only
//! while `Synced` and only if their marker directly follows the last applied
//! one; anything else clears the book and requests a fresh snapshot.
//!
//! ## Architecture
//!
//! This crate is organized into several modules:
//!
//! - [`client`] - REST and WebSocket clients for API communication
//! - [`types`] - Request/response types matching the Crex24 API
//! - [`orderbook`] - Order book store, reconciler and sync controller
//! - [`config`] - Endpoint and sync policy configuration
//! - [`error`] - Error types for the crate
//!
//! ## Performance
//!
//! - `Decimal` prices, exact and usable as `BTreeMap` keys
//! - `FxHashMap` for faster hashing of small keys
//! - `parking_lot` locks (faster than std)
//! - Updates applied under a single short write lock

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod orderbook;
pub mod types;

use std::sync::Arc;

// Re-export main types at crate root for convenience
pub use config::{Config, OrderBookConfig};
pub use error::Error;
pub use orderbook::{SymbolOrderBook, SyncStatus};

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// The main Crex24 API client
///
/// This struct provides access to the REST API and creates streamed order
/// books backed by the socket API.
///
/// # Example
///
/// ```rust,no_run
/// use crex24_rs::{Config, Crex24Client};
///
/// # async fn example() -> crex24_rs::Result<()> {
/// let client = Crex24Client::new(Config::new())?;
///
/// let book = client.rest().get_order_book("ETH-BTC", 0, Some(5)).await?;
/// println!("last price: {:?}", book.last);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Crex24Client {
    config: Config,
    rest_client: client::rest::RestClient,
}

impl Crex24Client {
    /// Create a new Crex24 client with the given configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be initialized.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let rest_client = client::rest::RestClient::new(&config)?;
        Ok(Self {
            config,
            rest_client,
        })
    }

    /// Get a reference to the REST client
    pub fn rest(&self) -> &client::rest::RestClient {
        &self.rest_client
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create a disconnected streamed order book for `symbol`, fed by its own
    /// socket connection
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol or the order book config is invalid.
    pub fn symbol_order_book(
        &self,
        symbol: &str,
        book_config: OrderBookConfig,
    ) -> Result<SymbolOrderBook> {
        let feed = client::websocket::Crex24DepthFeed::new(self.config.clone(), book_config.clone())?;
        SymbolOrderBook::new(symbol, Arc::new(feed), book_config)
    }
}
