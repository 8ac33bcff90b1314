//! The subscription feed an order book is driven by.
//!
//! A [`DepthFeed`] is the transport seen from the order book: it opens a
//! depth subscription for a symbol, pushes [`FeedEvent`]s into the sink it
//! was handed, and can be asked for a fresh snapshot. The Crex24 socket
//! implementation lives in [`client::websocket`](crate::client::websocket);
//! tests plug in scripted feeds.
//!
//! # Ordering contract
//!
//! Each sink has exactly one consumer. A feed must send events for a
//! subscription in the order it received them and must never send from two
//! tasks concurrently for the same subscription.

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::Error;
use crate::types::{DepthEntry, Marker, Price};

/// One depth update as delivered by the feed
#[derive(Debug, Clone, PartialEq)]
pub struct DepthUpdate {
    /// Snapshot (`true`) or delta on the previous update (`false`)
    pub is_full: bool,
    /// Ordering token
    pub marker: Marker,
    /// Changed bid levels
    pub bids: Vec<DepthEntry>,
    /// Changed ask levels
    pub asks: Vec<DepthEntry>,
    /// Last trade price, only sent with snapshots
    pub last_price: Option<Price>,
}

impl DepthUpdate {
    /// Build a snapshot update
    pub fn full(marker: Marker, bids: Vec<DepthEntry>, asks: Vec<DepthEntry>) -> Self {
        Self {
            is_full: true,
            marker,
            bids,
            asks,
            last_price: None,
        }
    }

    /// Build a delta update
    pub fn incremental(marker: Marker, bids: Vec<DepthEntry>, asks: Vec<DepthEntry>) -> Self {
        Self {
            is_full: false,
            marker,
            bids,
            asks,
            last_price: None,
        }
    }
}

/// Event pushed by a feed
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A depth update, in arrival order
    Update(DepthUpdate),
    /// The transport behind the subscription went away
    Disconnected,
}

/// Opaque handle to an active feed subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    /// Feed-assigned id
    pub id: u64,
    /// Subscribed symbol
    pub symbol: String,
}

/// Transport capability injected into a [`SymbolOrderBook`](super::SymbolOrderBook)
#[async_trait]
pub trait DepthFeed: Send + Sync {
    /// Open a depth subscription for `symbol`, sending its events into `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot connect or the server
    /// rejects the subscription.
    async fn subscribe(
        &self,
        symbol: &str,
        sink: UnboundedSender<FeedEvent>,
    ) -> Result<SubscriptionHandle, Error>;

    /// Close a subscription. No further events are sent for it.
    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), Error>;

    /// Ask for a fresh full snapshot on an existing subscription
    async fn request_resync(&self, handle: &SubscriptionHandle) -> Result<(), Error>;
}
