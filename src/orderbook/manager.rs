//! Order book manager for tracking many symbols over one feed.
//!
//! This module provides [`OrderBookManager`], a thread-safe registry of
//! [`SymbolOrderBook`]s keyed by symbol. Every book shares the manager's
//! [`DepthFeed`] and [`OrderBookConfig`].
//!
//! # Design
//!
//! The registry is an `FxHashMap` behind a `parking_lot::RwLock`. Books are
//! handed out as `Arc<SymbolOrderBook>`, so the registry lock is never held
//! while a book is starting, stopping or being read.

use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::info;

use crate::config::OrderBookConfig;
use crate::error::Error;
use crate::types::{DepthEntry, Price};

use super::{DepthFeed, SymbolOrderBook, SyncStatus};

/// Manager for multiple streamed order books.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use crex24_rs::client::websocket::Crex24DepthFeed;
/// use crex24_rs::config::OrderBookConfig;
/// use crex24_rs::orderbook::OrderBookManager;
/// use crex24_rs::Config;
///
/// # async fn example() -> crex24_rs::Result<()> {
/// let book_config = OrderBookConfig::new().with_levels(10);
/// let feed = Arc::new(Crex24DepthFeed::new(Config::new(), book_config.clone())?);
/// let manager = OrderBookManager::new(feed, book_config);
///
/// manager.add_symbol("ETH-BTC")?;
/// manager.add_symbol("LTC-BTC")?;
///
/// for (symbol, result) in manager.start_all().await {
///     if let Err(e) = result {
///         eprintln!("{symbol}: {e}");
///     }
/// }
///
/// println!("ETH-BTC spread: {:?}", manager.spread("ETH-BTC"));
/// manager.stop_all().await;
/// # Ok(())
/// # }
/// ```
pub struct OrderBookManager {
    feed: Arc<dyn DepthFeed>,
    config: OrderBookConfig,
    /// Books by symbol
    books: RwLock<FxHashMap<String, Arc<SymbolOrderBook>>>,
}

impl std::fmt::Debug for OrderBookManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBookManager")
            .field("symbols", &self.symbols())
            .field("config", &self.config)
            .finish()
    }
}

impl OrderBookManager {
    /// Create an empty manager
    pub fn new(feed: Arc<dyn DepthFeed>, config: OrderBookConfig) -> Self {
        Self {
            feed,
            config,
            books: RwLock::new(FxHashMap::default()),
        }
    }

    /// Track a symbol. The book starts `Disconnected`; call
    /// [`SymbolOrderBook::start`] or [`start_all`](Self::start_all).
    ///
    /// Adding a symbol twice returns the existing book.
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol is invalid.
    pub fn add_symbol(&self, symbol: impl Into<String>) -> Result<Arc<SymbolOrderBook>, Error> {
        let symbol = symbol.into();
        let mut books = self.books.write();
        if let Some(book) = books.get(&symbol) {
            return Ok(Arc::clone(book));
        }

        let book = Arc::new(SymbolOrderBook::new(
            symbol.clone(),
            Arc::clone(&self.feed),
            self.config.clone(),
        )?);
        books.insert(symbol, Arc::clone(&book));
        Ok(book)
    }

    /// Stop and forget a symbol. Returns `false` if it was not tracked.
    pub async fn remove_symbol(&self, symbol: &str) -> bool {
        let removed = self.books.write().remove(symbol);
        match removed {
            Some(book) => {
                book.stop().await;
                info!(symbol, "order book removed");
                true
            }
            None => false,
        }
    }

    /// Get the book for a symbol
    pub fn get(&self, symbol: &str) -> Option<Arc<SymbolOrderBook>> {
        self.books.read().get(symbol).cloned()
    }

    fn books(&self) -> Vec<Arc<SymbolOrderBook>> {
        self.books.read().values().cloned().collect()
    }

    /// Start every tracked book concurrently, returning each symbol's result
    pub async fn start_all(&self) -> Vec<(String, Result<(), Error>)> {
        let books = self.books();
        let results = join_all(books.iter().map(|book| book.start())).await;
        books
            .iter()
            .map(|book| book.symbol().to_string())
            .zip(results)
            .collect()
    }

    /// Stop every tracked book
    pub async fn stop_all(&self) {
        let books = self.books();
        join_all(books.iter().map(|book| book.stop())).await;
    }

    /// Get the sync status of every book
    pub fn statuses(&self) -> Vec<(String, SyncStatus)> {
        self.books
            .read()
            .iter()
            .map(|(symbol, book)| (symbol.clone(), book.status()))
            .collect()
    }

    /// Get the status of one book
    pub fn status(&self, symbol: &str) -> Option<SyncStatus> {
        self.books.read().get(symbol).map(|book| book.status())
    }

    /// Get all symbols whose book is not synced
    pub fn symbols_needing_resync(&self) -> Vec<String> {
        self.books
            .read()
            .iter()
            .filter(|(_, book)| !book.is_synced())
            .map(|(symbol, _)| symbol.clone())
            .collect()
    }

    /// Get best bid for a symbol
    pub fn best_bid(&self, symbol: &str) -> Option<DepthEntry> {
        self.books.read().get(symbol).and_then(|book| book.best_bid())
    }

    /// Get best ask for a symbol
    pub fn best_ask(&self, symbol: &str) -> Option<DepthEntry> {
        self.books.read().get(symbol).and_then(|book| book.best_ask())
    }

    /// Get spread for a symbol
    pub fn spread(&self, symbol: &str) -> Option<Price> {
        self.books.read().get(symbol).and_then(|book| book.spread())
    }

    /// Get number of tracked symbols
    pub fn len(&self) -> usize {
        self.books.read().len()
    }

    /// Check if manager has no symbols
    pub fn is_empty(&self) -> bool {
        self.books.read().is_empty()
    }

    /// Get all tracked symbols
    pub fn symbols(&self) -> Vec<String> {
        self.books.read().keys().cloned().collect()
    }
}
