//! Tests for the order book sync controller.
//!
//! These drive a [`SymbolOrderBook`] through a scripted in-memory feed, so
//! they need no network. Time is paused where timeouts are involved.
//!
//! # Running
//!
//! ```bash
//! cargo test --test sync_controller
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crex24_rs::config::{OrderBookConfig, ReconnectConfig};
use crex24_rs::orderbook::{
    BookEvent, DepthFeed, DepthUpdate, FeedEvent, SubscriptionHandle, SymbolOrderBook, SyncStatus,
};
use crex24_rs::types::{BookSide, DepthEntry, Price, Quantity};
use crex24_rs::Error;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedSender;
use tokio_test::{assert_err, assert_ok};

/// Feed whose behaviour is scripted by the test
#[derive(Default)]
struct ScriptedFeed {
    /// Sink of the latest subscription
    sink: Mutex<Option<UnboundedSender<FeedEvent>>>,
    /// Events sent on every successful subscribe
    on_subscribe: Mutex<Vec<FeedEvent>>,
    /// Reject subscriptions while set
    reject: AtomicBool,
    next_id: AtomicU64,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
    resyncs: AtomicUsize,
}

impl ScriptedFeed {
    fn silent() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with_events(events: Vec<FeedEvent>) -> Arc<Self> {
        let feed = Self::default();
        *feed.on_subscribe.lock() = events;
        Arc::new(feed)
    }

    fn with_snapshot(update: DepthUpdate) -> Arc<Self> {
        Self::with_events(vec![FeedEvent::Update(update)])
    }

    fn push(&self, event: FeedEvent) {
        self.sink
            .lock()
            .as_ref()
            .expect("feed not subscribed")
            .send(event)
            .expect("order book dropped its receiver");
    }

    /// Send an event if some order book still listens
    fn try_push(&self, event: FeedEvent) -> bool {
        self.sink
            .lock()
            .as_ref()
            .is_some_and(|sink| sink.send(event).is_ok())
    }

    fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    fn resyncs(&self) -> usize {
        self.resyncs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DepthFeed for ScriptedFeed {
    async fn subscribe(
        &self,
        symbol: &str,
        sink: UnboundedSender<FeedEvent>,
    ) -> Result<SubscriptionHandle, Error> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Err(Error::SubscriptionFailed(format!("{symbol} rejected")));
        }

        for event in self.on_subscribe.lock().iter() {
            let _ = sink.send(event.clone());
        }
        *self.sink.lock() = Some(sink);

        Ok(SubscriptionHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            symbol: symbol.to_string(),
        })
    }

    async fn unsubscribe(&self, _handle: &SubscriptionHandle) -> Result<(), Error> {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn request_resync(&self, _handle: &SubscriptionHandle) -> Result<(), Error> {
        self.resyncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn entry(price: Price, quantity: Quantity) -> DepthEntry {
    DepthEntry::new(price, quantity)
}

/// bids {100: 5}, asks {101: 3}
fn snapshot(marker: u64) -> DepthUpdate {
    DepthUpdate::full(
        marker,
        vec![entry(dec!(100), dec!(5))],
        vec![entry(dec!(101), dec!(3))],
    )
}

fn config() -> OrderBookConfig {
    OrderBookConfig::new()
        .with_sync_timeout(Duration::from_secs(10))
        .with_reconnect(None)
}

fn book(feed: &Arc<ScriptedFeed>, config: OrderBookConfig) -> SymbolOrderBook {
    SymbolOrderBook::new("TEST-USD", feed.clone(), config).unwrap()
}

/// Let the event task drain everything queued so far
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Receive events until one matches
async fn wait_for_event<F>(events: &mut broadcast::Receiver<BookEvent>, mut matches: F) -> BookEvent
where
    F: FnMut(&BookEvent) -> bool,
{
    loop {
        let event = events.recv().await.expect("event channel closed");
        if matches(&event) {
            return event;
        }
    }
}

// Scenario A
#[tokio::test(start_paused = true)]
async fn test_start_applies_snapshot() {
    let feed = ScriptedFeed::with_snapshot(snapshot(1));
    let book = book(&feed, config());

    book.start().await.unwrap();

    assert_eq!(book.status(), SyncStatus::Synced);
    assert_eq!(book.best_bid(), Some(entry(dec!(100), dec!(5))));
    assert_eq!(book.best_ask(), Some(entry(dec!(101), dec!(3))));
    assert_eq!(book.last_update_marker(), Some(1));
    assert_eq!(book.spread(), Some(dec!(1)));
    assert_eq!(book.mid_price(), Some(dec!(100.5)));
    assert!(book.is_running());

    book.stop().await;
}

// Scenario B
#[tokio::test(start_paused = true)]
async fn test_delta_removes_level() {
    let feed = ScriptedFeed::with_snapshot(snapshot(1));
    let book = book(&feed, config());
    book.start().await.unwrap();

    feed.push(FeedEvent::Update(DepthUpdate::incremental(
        2,
        vec![entry(dec!(100), dec!(0))],
        vec![],
    )));
    settle().await;

    assert_eq!(book.status(), SyncStatus::Synced);
    assert_eq!(book.best_bid(), None);
    assert_eq!(book.best_ask(), Some(entry(dec!(101), dec!(3))));
    assert_eq!(book.last_update_marker(), Some(2));

    book.stop().await;
}

// Scenario C
#[tokio::test(start_paused = true)]
async fn test_gap_forces_resync() {
    let feed = ScriptedFeed::with_snapshot(snapshot(1));
    let book = book(&feed, config());
    book.start().await.unwrap();
    let mut events = book.events();

    feed.push(FeedEvent::Update(DepthUpdate::incremental(
        5,
        vec![entry(dec!(99), dec!(1))],
        vec![],
    )));
    settle().await;

    assert_eq!(book.status(), SyncStatus::Syncing);
    assert!(book.snapshot().is_empty());
    assert_eq!(book.last_update_marker(), None);
    assert_eq!(feed.resyncs(), 1);

    feed.push(FeedEvent::Update(DepthUpdate::full(
        6,
        vec![entry(dec!(98), dec!(2))],
        vec![entry(dec!(102), dec!(1))],
    )));
    book.wait_synced(Duration::from_secs(1)).await.unwrap();

    let resynced = wait_for_event(&mut events, |e| matches!(e, BookEvent::Resynced { .. })).await;
    assert_eq!(resynced, BookEvent::Resynced { marker: 6 });
    assert_eq!(book.best_bid(), Some(entry(dec!(98), dec!(2))));
    assert_eq!(book.last_update_marker(), Some(6));

    book.stop().await;
}

// Scenario D
#[tokio::test(start_paused = true)]
async fn test_start_times_out_without_snapshot() {
    let feed = ScriptedFeed::silent();
    let book = book(&feed, config());

    let result = book.start().await;

    assert!(matches!(result, Err(Error::SyncTimeout(t)) if t == Duration::from_secs(10)));
    assert_eq!(book.status(), SyncStatus::Disconnected);
    assert_eq!(feed.unsubscribes(), 1);
    assert!(!book.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_subscription_failure() {
    let feed = ScriptedFeed::silent();
    feed.reject.store(true, Ordering::SeqCst);
    let book = book(&feed, config());

    let err = assert_err!(book.start().await);

    assert!(matches!(err, Error::SubscriptionFailed(_)));
    assert_eq!(book.status(), SyncStatus::Disconnected);
    assert!(!book.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_deltas_before_snapshot_are_discarded() {
    let feed = ScriptedFeed::with_events(vec![
        FeedEvent::Update(DepthUpdate::incremental(
            7,
            vec![entry(dec!(50), dec!(1))],
            vec![],
        )),
        FeedEvent::Update(snapshot(1)),
    ]);
    let book = book(&feed, config());

    book.start().await.unwrap();

    assert_eq!(book.last_update_marker(), Some(1));
    assert_eq!(book.top_levels(BookSide::Bid, 10), vec![entry(dec!(100), dec!(5))]);
    assert_eq!(feed.resyncs(), 0);

    book.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_malformed_delta_forces_resync() {
    let feed = ScriptedFeed::with_snapshot(snapshot(1));
    let book = book(&feed, config());
    book.start().await.unwrap();

    feed.push(FeedEvent::Update(DepthUpdate::incremental(
        2,
        vec![entry(dec!(99), dec!(4))],
        vec![entry(dec!(101), dec!(-3))],
    )));
    settle().await;

    assert_eq!(book.status(), SyncStatus::Syncing);
    assert!(book.best_bid().is_none());
    assert_eq!(feed.resyncs(), 1);

    book.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_resync_timeout_requests_again() {
    let feed = ScriptedFeed::with_snapshot(snapshot(1));
    let book = book(&feed, config());
    book.start().await.unwrap();
    let mut events = book.events();

    feed.push(FeedEvent::Update(DepthUpdate::incremental(3, vec![], vec![])));

    let timed_out =
        wait_for_event(&mut events, |e| matches!(e, BookEvent::SyncTimedOut { .. })).await;
    assert_eq!(
        timed_out,
        BookEvent::SyncTimedOut {
            timeout: Duration::from_secs(10)
        }
    );
    assert_eq!(feed.resyncs(), 2);
    // Still trying, not given up
    assert_eq!(book.status(), SyncStatus::Syncing);
    assert!(book.is_running());

    book.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_start() {
    let feed = ScriptedFeed::silent();
    let book = Arc::new(book(&feed, config()));

    let starting = {
        let book = Arc::clone(&book);
        tokio::spawn(async move { book.start().await })
    };
    settle().await;
    assert_eq!(book.status(), SyncStatus::Syncing);

    book.stop().await;

    let result = starting.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(book.status(), SyncStatus::Disconnected);
    assert_eq!(feed.unsubscribes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let feed = ScriptedFeed::with_snapshot(snapshot(1));
    let book = book(&feed, config());
    book.start().await.unwrap();

    book.stop().await;
    book.stop().await;

    assert_eq!(book.status(), SyncStatus::Disconnected);
    assert!(book.snapshot().is_empty());
    assert_eq!(book.last_update_marker(), None);
    assert_eq!(feed.unsubscribes(), 1);
    assert!(!book.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_start_after_stop_resubscribes() {
    let feed = ScriptedFeed::with_snapshot(snapshot(1));
    let book = book(&feed, config());

    assert_ok!(book.start().await);
    book.stop().await;
    assert_ok!(book.start().await);

    assert_eq!(feed.subscribes(), 2);
    assert_eq!(book.status(), SyncStatus::Synced);

    // Already running: start just waits for sync
    assert_ok!(book.start().await);
    assert_eq!(feed.subscribes(), 2);

    book.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_clears_store() {
    let feed = ScriptedFeed::with_snapshot(snapshot(1));
    let book = book(&feed, config());
    book.start().await.unwrap();

    feed.push(FeedEvent::Disconnected);
    settle().await;

    assert_eq!(book.status(), SyncStatus::Disconnected);
    assert!(book.snapshot().is_empty());
    assert_eq!(book.best_ask(), None);
    // Reconnect disabled
    assert!(!book.is_running());
    assert_eq!(feed.subscribes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_reconnects_with_backoff() {
    let feed = ScriptedFeed::with_snapshot(snapshot(1));
    let config = config().with_reconnect(Some(ReconnectConfig::new().initial_delay_ms(100)));
    let book = book(&feed, config);
    book.start().await.unwrap();
    let mut events = book.events();

    feed.push(FeedEvent::Disconnected);
    settle().await;
    assert_eq!(book.status(), SyncStatus::Disconnected);
    assert!(book.snapshot().is_empty());

    let reconnecting =
        wait_for_event(&mut events, |e| matches!(e, BookEvent::Reconnecting { .. })).await;
    assert_eq!(
        reconnecting,
        BookEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(100)
        }
    );

    book.wait_synced(Duration::from_secs(5)).await.unwrap();
    assert_eq!(feed.subscribes(), 2);
    assert_eq!(book.best_bid(), Some(entry(dec!(100), dec!(5))));

    book.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_start_during_reconnect_backoff_keeps_one_task() {
    let feed = ScriptedFeed::with_snapshot(snapshot(1));
    let config = config().with_reconnect(Some(ReconnectConfig::new().initial_delay_ms(1_000)));
    let book = book(&feed, config);
    assert_ok!(book.start().await);

    feed.push(FeedEvent::Disconnected);
    settle().await;
    assert_eq!(book.status(), SyncStatus::Disconnected);
    assert!(book.is_running());

    // The pending reconnect owns the subscription; start waits for it
    assert_ok!(book.start().await);
    assert_eq!(feed.subscribes(), 2);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(feed.subscribes(), 2);

    book.stop().await;
    assert!(!book.is_running());
    assert_eq!(book.status(), SyncStatus::Disconnected);

    // Nothing is left to apply updates after stop
    assert!(!feed.try_push(FeedEvent::Update(snapshot(9))));
    settle().await;
    assert_eq!(book.status(), SyncStatus::Disconnected);
    assert_eq!(book.last_update_marker(), None);
}

#[tokio::test(start_paused = true)]
async fn test_drop_unsubscribes() {
    let feed = ScriptedFeed::with_snapshot(snapshot(1));
    let book = book(&feed, config());
    assert_ok!(book.start().await);

    drop(book);
    settle().await;

    assert_eq!(feed.unsubscribes(), 1);
    assert!(!feed.try_push(FeedEvent::Update(snapshot(2))));
}

#[tokio::test(start_paused = true)]
async fn test_drop_after_stop_does_not_unsubscribe_twice() {
    let feed = ScriptedFeed::with_snapshot(snapshot(1));
    let book = book(&feed, config());
    assert_ok!(book.start().await);

    book.stop().await;
    drop(book);
    settle().await;

    assert_eq!(feed.unsubscribes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_gives_up_after_retries() {
    let feed = ScriptedFeed::with_snapshot(snapshot(1));
    let config = config().with_reconnect(Some(
        ReconnectConfig::new().max_retries(2).initial_delay_ms(50),
    ));
    let book = book(&feed, config);
    book.start().await.unwrap();
    let mut events = book.events();

    feed.reject.store(true, Ordering::SeqCst);
    feed.push(FeedEvent::Disconnected);

    let failed =
        wait_for_event(&mut events, |e| matches!(e, BookEvent::ReconnectFailed { .. })).await;
    assert_eq!(failed, BookEvent::ReconnectFailed { attempts: 2 });
    settle().await;

    assert_eq!(feed.subscribes(), 3);
    assert_eq!(book.status(), SyncStatus::Disconnected);
    assert!(!book.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_partial_updates() {
    // Every update moves the bid and the ask together, keeping one level per
    // side and a spread of exactly 1
    let feed = ScriptedFeed::with_snapshot(DepthUpdate::full(
        1,
        vec![entry(dec!(101), dec!(1))],
        vec![entry(dec!(102), dec!(1))],
    ));
    let book = Arc::new(book(&feed, config()));
    book.start().await.unwrap();

    const LAST: u64 = 500;
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let book = Arc::clone(&book);
            tokio::spawn(async move {
                loop {
                    let view = book.snapshot();
                    assert_eq!(view.num_levels(), (1, 1));
                    assert_eq!(view.spread(), Some(dec!(1)));
                    if view.last_update_marker() == Some(LAST) {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for marker in 2..=LAST {
        let previous = Price::from(100 + marker - 1);
        let price = Price::from(100 + marker);
        feed.push(FeedEvent::Update(DepthUpdate::incremental(
            marker,
            vec![entry(previous, dec!(0)), entry(price, dec!(1))],
            vec![entry(previous + dec!(1), dec!(0)), entry(price + dec!(1), dec!(1))],
        )));
    }

    for reader in readers {
        tokio::time::timeout(Duration::from_secs(10), reader)
            .await
            .expect("reader did not finish")
            .unwrap();
    }
    assert_eq!(book.best_bid(), Some(entry(Price::from(100 + LAST), dec!(1))));

    book.stop().await;
}
