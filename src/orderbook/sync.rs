//! Per-symbol sync controller.
//!
//! [`SymbolOrderBook`] drives one [`OrderBook`] from a [`DepthFeed`]:
//!
//! ```text
//! Disconnected -> Connecting -> Syncing -> Synced
//!                                  ^          |
//!                                  +-- gap ---+
//! ```
//!
//! Feed events are drained by a single task in arrival order. Every update
//! is applied under one write guard, so readers always see either the state
//! before an update or the state after it. A marker gap or a malformed
//! update clears the book, moves it back to `Syncing` and asks the feed for
//! a fresh snapshot. A transport disconnect clears the book and, when a
//! [`ReconnectConfig`](crate::config::ReconnectConfig) is set, resubscribes
//! with exponential backoff.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use crex24_rs::client::websocket::Crex24DepthFeed;
//! use crex24_rs::config::OrderBookConfig;
//! use crex24_rs::orderbook::SymbolOrderBook;
//! use crex24_rs::types::BookSide;
//! use crex24_rs::Config;
//!
//! # async fn example() -> crex24_rs::Result<()> {
//! let feed = Arc::new(Crex24DepthFeed::new(Config::new(), OrderBookConfig::new())?);
//! let book = SymbolOrderBook::new("ETH-BTC", feed, OrderBookConfig::new())?;
//!
//! book.start().await?;
//! println!("best bid: {:?}", book.best_bid());
//! for level in book.top_levels(BookSide::Ask, 5) {
//!     println!("{level}");
//! }
//! book.stop().await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::OrderBookConfig;
use crate::error::Error;
use crate::types::market::validate_symbol;
use crate::types::{BookSide, DepthEntry, Marker, Price};

use super::book::{OrderBook, SyncStatus};
use super::feed::{DepthFeed, DepthUpdate, FeedEvent, SubscriptionHandle};
use super::reconcile;

/// Notification published by a [`SymbolOrderBook`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookEvent {
    /// The sync status changed
    StatusChanged {
        /// Previous status
        from: SyncStatus,
        /// New status
        to: SyncStatus,
    },
    /// A fresh snapshot ended a resync
    Resynced {
        /// Marker of the snapshot
        marker: Marker,
    },
    /// No snapshot arrived within the sync timeout while resyncing; another
    /// snapshot has been requested
    SyncTimedOut {
        /// The timeout that elapsed
        timeout: Duration,
    },
    /// A resubscription attempt is about to be made
    Reconnecting {
        /// Attempt number, starting at 1
        attempt: u32,
        /// Backoff delay before the attempt
        delay: Duration,
    },
    /// All resubscription attempts failed; the book stays disconnected
    ReconnectFailed {
        /// Number of attempts made
        attempts: u32,
    },
}

/// How an update was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// A snapshot was applied; the book is synced at this marker
    Snapshot(Marker),
    /// A delta was applied
    Applied,
    /// A delta arrived before a snapshot and was ignored
    Discarded,
    /// The update was rejected; the book was cleared and needs a snapshot
    ResyncNeeded,
}

/// State shared between the handle and the event task
struct Shared {
    symbol: String,
    config: OrderBookConfig,
    feed: Arc<dyn DepthFeed>,
    book: RwLock<OrderBook>,
    status: watch::Sender<SyncStatus>,
    /// Bumped on every `stop()` so pending waits resolve with `Cancelled`
    stops: watch::Sender<u64>,
    events: broadcast::Sender<BookEvent>,
    subscription: Mutex<Option<SubscriptionHandle>>,
}

impl Shared {
    fn new(symbol: String, feed: Arc<dyn DepthFeed>, config: OrderBookConfig) -> Self {
        let (status, _) = watch::channel(SyncStatus::Disconnected);
        let (stops, _) = watch::channel(0);
        let (events, _) = broadcast::channel(config.event_capacity());
        Self {
            book: RwLock::new(OrderBook::new(symbol.clone())),
            symbol,
            config,
            feed,
            status,
            stops,
            events,
            subscription: Mutex::new(None),
        }
    }

    /// Move the book to `to`, publishing the change. Must be called with
    /// the write guard held so status and contents change together.
    fn transition(&self, book: &mut OrderBook, to: SyncStatus) {
        let from = book.status;
        if from == to {
            return;
        }
        book.status = to;
        self.status.send_replace(to);
        debug!(symbol = %self.symbol, %from, %to, "order book status changed");
        self.publish(BookEvent::StatusChanged { from, to });
    }

    fn set_status(&self, to: SyncStatus) {
        let mut book = self.book.write();
        self.transition(&mut book, to);
    }

    /// Clear the book and set `to` in one step
    fn reset(&self, to: SyncStatus) {
        let mut book = self.book.write();
        book.reset();
        self.transition(&mut book, to);
    }

    fn publish(&self, event: BookEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Classify and apply one update. Never blocks on the feed.
    fn handle_update(&self, update: &DepthUpdate) -> Outcome {
        let mut book = self.book.write();

        if !update.is_full && book.status != SyncStatus::Synced {
            debug!(
                symbol = %self.symbol,
                marker = update.marker,
                status = %book.status,
                "discarding delta received before snapshot"
            );
            return Outcome::Discarded;
        }

        match reconcile::apply_update(&mut book, update, self.config.marker_policy()) {
            Ok(()) if update.is_full => {
                self.transition(&mut book, SyncStatus::Synced);
                Outcome::Snapshot(update.marker)
            }
            Ok(()) => Outcome::Applied,
            Err(err) => {
                warn!(
                    symbol = %self.symbol,
                    marker = update.marker,
                    error = %err,
                    "dropping update and resynchronizing"
                );
                book.reset();
                self.transition(&mut book, SyncStatus::Syncing);
                Outcome::ResyncNeeded
            }
        }
    }

    async fn request_resync(&self) {
        let handle = self.subscription.lock().clone();
        let Some(handle) = handle else {
            debug!(symbol = %self.symbol, "no subscription to resync");
            return;
        };

        info!(symbol = %self.symbol, "requesting order book snapshot");
        if let Err(err) = self.feed.request_resync(&handle).await {
            warn!(symbol = %self.symbol, error = %err, "resync request failed");
        }
    }

    async fn on_resync_timeout(&self) {
        let timeout = self.config.sync_timeout();
        warn!(symbol = %self.symbol, ?timeout, "no snapshot received while resyncing");
        self.publish(BookEvent::SyncTimedOut { timeout });
        self.request_resync().await;
    }

    /// Resubscribe after a disconnect. Returns `false` when reconnecting is
    /// disabled or every attempt failed.
    async fn resubscribe(&self, sink: &UnboundedSender<FeedEvent>) -> bool {
        let Some(policy) = self.config.reconnect().cloned() else {
            info!(symbol = %self.symbol, "reconnect disabled, order book stays disconnected");
            return false;
        };

        let mut attempts = 0;
        loop {
            if !policy.allows_attempt(attempts) {
                error!(symbol = %self.symbol, attempts, "giving up on reconnecting order book");
                self.publish(BookEvent::ReconnectFailed { attempts });
                return false;
            }

            let delay = policy.delay_for_attempt(attempts);
            attempts += 1;
            info!(symbol = %self.symbol, attempt = attempts, ?delay, "reconnecting order book");
            self.publish(BookEvent::Reconnecting {
                attempt: attempts,
                delay,
            });
            tokio::time::sleep(delay).await;

            self.set_status(SyncStatus::Connecting);
            match self.feed.subscribe(&self.symbol, sink.clone()).await {
                Ok(handle) => {
                    *self.subscription.lock() = Some(handle);
                    self.set_status(SyncStatus::Syncing);
                    return true;
                }
                Err(err) => {
                    warn!(symbol = %self.symbol, attempt = attempts, error = %err, "resubscribe failed");
                    self.set_status(SyncStatus::Disconnected);
                }
            }
        }
    }

    /// Drain feed events in arrival order until the feed goes away or
    /// reconnecting gives up.
    async fn run(
        self: Arc<Self>,
        mut events: UnboundedReceiver<FeedEvent>,
        sink: UnboundedSender<FeedEvent>,
    ) {
        let sync_timeout = self.config.sync_timeout();
        let mut resync_deadline: Option<Instant> = None;

        loop {
            let deadline = resync_deadline;
            let timer = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => future::pending().await,
                }
            };

            let event = tokio::select! {
                biased;
                event = events.recv() => event,
                () = timer => {
                    self.on_resync_timeout().await;
                    resync_deadline = Some(Instant::now() + sync_timeout);
                    continue;
                }
            };

            match event {
                Some(FeedEvent::Update(update)) => match self.handle_update(&update) {
                    Outcome::Snapshot(marker) => {
                        if resync_deadline.take().is_some() {
                            info!(symbol = %self.symbol, marker, "order book resynchronized");
                            self.publish(BookEvent::Resynced { marker });
                        }
                    }
                    Outcome::ResyncNeeded => {
                        resync_deadline = Some(Instant::now() + sync_timeout);
                        self.request_resync().await;
                    }
                    Outcome::Applied | Outcome::Discarded => {}
                },
                Some(FeedEvent::Disconnected) => {
                    warn!(symbol = %self.symbol, "depth feed disconnected");
                    self.subscription.lock().take();
                    self.reset(SyncStatus::Disconnected);

                    if !self.resubscribe(&sink).await {
                        return;
                    }
                    resync_deadline = Some(Instant::now() + sync_timeout);
                }
                None => {
                    debug!(symbol = %self.symbol, "depth feed closed");
                    return;
                }
            }
        }
    }
}

/// Wait for `Synced`, failing with `Cancelled` on stop and `SyncTimeout`
/// when `timeout` elapses.
async fn wait_until_synced(
    status: &mut watch::Receiver<SyncStatus>,
    stops: &mut watch::Receiver<u64>,
    timeout: Duration,
) -> Result<(), Error> {
    let wait = async {
        loop {
            let current = *status.borrow_and_update();
            if current == SyncStatus::Synced {
                return Ok(());
            }
            tokio::select! {
                changed = status.changed() => {
                    if changed.is_err() {
                        return Err(Error::Cancelled);
                    }
                }
                _ = stops.changed() => return Err(Error::Cancelled),
            }
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| Error::SyncTimeout(timeout))?
}

/// A streamed, self-synchronizing order book for one symbol.
///
/// Readers (`best_bid`, `top_levels`, `snapshot`, ...) may be called from any
/// number of tasks at any time; each returns a consistent copy.
pub struct SymbolOrderBook {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for SymbolOrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolOrderBook")
            .field("symbol", &self.shared.symbol)
            .field("status", &self.status())
            .field("last_update_marker", &self.last_update_marker())
            .field("running", &self.is_running())
            .finish()
    }
}

impl SymbolOrderBook {
    /// Create a disconnected order book for `symbol`
    ///
    /// # Errors
    ///
    /// Returns an error if the symbol or the config is invalid.
    pub fn new(
        symbol: impl Into<String>,
        feed: Arc<dyn DepthFeed>,
        config: OrderBookConfig,
    ) -> Result<Self, Error> {
        let symbol = symbol.into();
        validate_symbol(&symbol)?;
        config.validate()?;

        Ok(Self {
            shared: Arc::new(Shared::new(symbol, feed, config)),
            task: Mutex::new(None),
        })
    }

    /// Subscribe and wait until the first snapshot has been applied.
    ///
    /// Calling `start` on a book that is already running, including one
    /// waiting to reconnect, just waits for it to be synced.
    ///
    /// # Errors
    ///
    /// - [`Error::SubscriptionFailed`] if the feed rejects the subscription
    /// - [`Error::SyncTimeout`] if no snapshot arrives within the sync
    ///   timeout; the subscription is torn down
    /// - [`Error::Cancelled`] if [`stop`](Self::stop) is called meanwhile
    pub async fn start(&self) -> Result<(), Error> {
        let shared = &self.shared;
        let timeout = shared.config.sync_timeout();
        let mut status = shared.status.subscribe();
        let mut stops = shared.stops.subscribe();

        // A live task owns the subscription even while it is Disconnected
        // between reconnect attempts
        let already_running = {
            let mut book = shared.book.write();
            if book.status == SyncStatus::Disconnected && !self.is_running() {
                shared.transition(&mut book, SyncStatus::Connecting);
                false
            } else {
                true
            }
        };
        if already_running {
            return wait_until_synced(&mut status, &mut stops, timeout).await;
        }

        info!(symbol = %shared.symbol, "subscribing to order book");
        let (sink, events) = mpsc::unbounded_channel();
        let handle = match shared.feed.subscribe(&shared.symbol, sink.clone()).await {
            Ok(handle) => handle,
            Err(err) => {
                error!(symbol = %shared.symbol, error = %err, "order book subscription failed");
                shared.set_status(SyncStatus::Disconnected);
                return Err(match err {
                    Error::SubscriptionFailed(_) => err,
                    other => Error::SubscriptionFailed(other.to_string()),
                });
            }
        };

        if matches!(stops.has_changed(), Ok(true)) {
            debug!(symbol = %shared.symbol, "stopped while subscribing");
            if let Err(err) = shared.feed.unsubscribe(&handle).await {
                warn!(symbol = %shared.symbol, error = %err, "unsubscribe failed");
            }
            return Err(Error::Cancelled);
        }

        *shared.subscription.lock() = Some(handle);
        shared.set_status(SyncStatus::Syncing);
        let task = tokio::spawn(Arc::clone(shared).run(events, sink));
        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }

        match wait_until_synced(&mut status, &mut stops, timeout).await {
            Err(Error::SyncTimeout(timeout)) => {
                error!(symbol = %shared.symbol, ?timeout, "no order book snapshot received");
                self.teardown().await;
                Err(Error::SyncTimeout(timeout))
            }
            result => result,
        }
    }

    /// Wait until the book is synced, e.g. after a resync or reconnect.
    ///
    /// # Errors
    ///
    /// [`Error::SyncTimeout`] after `timeout`, [`Error::Cancelled`] if the
    /// book is stopped meanwhile.
    pub async fn wait_synced(&self, timeout: Duration) -> Result<(), Error> {
        let mut status = self.shared.status.subscribe();
        let mut stops = self.shared.stops.subscribe();
        wait_until_synced(&mut status, &mut stops, timeout).await
    }

    /// Unsubscribe, clear the book and go `Disconnected`.
    ///
    /// Pending `start`/`wait_synced` calls resolve with [`Error::Cancelled`].
    /// Calling `stop` more than once is harmless.
    pub async fn stop(&self) {
        self.shared.stops.send_modify(|stops| *stops += 1);
        self.teardown().await;
    }

    async fn teardown(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.abort();
            // Cancelled join error expected
            let _ = task.await;
        }

        let handle = self.shared.subscription.lock().take();
        if let Some(handle) = handle {
            debug!(symbol = %self.shared.symbol, id = handle.id, "unsubscribing order book");
            if let Err(err) = self.shared.feed.unsubscribe(&handle).await {
                warn!(symbol = %self.shared.symbol, error = %err, "unsubscribe failed");
            }
        }

        self.shared.reset(SyncStatus::Disconnected);
    }

    /// Subscribe to status and resync notifications
    pub fn events(&self) -> broadcast::Receiver<BookEvent> {
        self.shared.events.subscribe()
    }

    /// Watch the sync status
    pub fn status_receiver(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status.subscribe()
    }

    /// Get the symbol
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.shared.symbol
    }

    /// Get the sync policy
    #[must_use]
    pub fn config(&self) -> &OrderBookConfig {
        &self.shared.config
    }

    /// Whether the event task is alive
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Get the sync status
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.shared.book.read().status()
    }

    /// Whether the book is synced
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.status() == SyncStatus::Synced
    }

    /// Get the marker of the last applied update
    #[must_use]
    pub fn last_update_marker(&self) -> Option<Marker> {
        self.shared.book.read().last_update_marker()
    }

    /// Get the best bid
    #[must_use]
    pub fn best_bid(&self) -> Option<DepthEntry> {
        self.shared.book.read().best_bid()
    }

    /// Get the best ask
    #[must_use]
    pub fn best_ask(&self) -> Option<DepthEntry> {
        self.shared.book.read().best_ask()
    }

    /// Get the spread
    #[must_use]
    pub fn spread(&self) -> Option<Price> {
        self.shared.book.read().spread()
    }

    /// Get the mid price
    #[must_use]
    pub fn mid_price(&self) -> Option<Price> {
        self.shared.book.read().mid_price()
    }

    /// Copy of the `n` best levels of a side, best first.
    ///
    /// Asking for more levels than exist returns all of them.
    #[must_use]
    pub fn top_levels(&self, side: BookSide, n: usize) -> Vec<DepthEntry> {
        self.shared.book.read().top_levels(side, n).collect()
    }

    /// Consistent copy of the whole book
    #[must_use]
    pub fn snapshot(&self) -> OrderBook {
        self.shared.book.read().clone()
    }
}

impl Drop for SymbolOrderBook {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }

        let Some(handle) = self.shared.subscription.lock().take() else {
            return;
        };
        // Without a runtime the feed notices the closed sink on its own
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let feed = Arc::clone(&self.shared.feed);
        let symbol = self.shared.symbol.clone();
        runtime.spawn(async move {
            debug!(symbol = %symbol, id = handle.id, "unsubscribing dropped order book");
            if let Err(err) = feed.unsubscribe(&handle).await {
                warn!(symbol = %symbol, error = %err, "unsubscribe failed");
            }
        });
    }
}
