//! WebSocket client for real-time Crex24 market data.
//!
//! This module provides:
//!
//! - [`Crex24Socket`]: one socket connection speaking the Crex24 request /
//!   notification protocol
//! - [`Crex24DepthFeed`]: a [`DepthFeed`] that opens one socket per depth
//!   subscription and feeds a [`SymbolOrderBook`](crate::orderbook::SymbolOrderBook)
//!
//! Crex24 accepts a single subscription per connection and has no
//! unsubscribe request, so unsubscribing closes the connection. Asking for a
//! resync re-sends `depth.subscribe`, which makes the server push a fresh
//! full update.
//!
//! Depth updates carry no sequence number. The feed stamps every update it
//! receives on a connection with a counter starting at 1. An update that
//! cannot be decoded still consumes a number, so the book sees a gap on the
//! next delta and resynchronizes.
//!
//! # Example
//!
//! ```rust,no_run
//! use crex24_rs::client::websocket::Crex24Socket;
//! use crex24_rs::types::messages::SocketMessage;
//! use crex24_rs::Config;
//!
//! # async fn example() -> crex24_rs::Result<()> {
//! let mut socket = Crex24Socket::connect(&Config::new()).await?;
//! socket.subscribe_depth("ETH-BTC", 10, "0.00000001").await?;
//!
//! while let Some(message) = socket.next_message().await {
//!     if let SocketMessage::Notification(update) = message? {
//!         println!("{}: {:?}", update.method, update.params);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::{Config, OrderBookConfig};
use crate::error::{ApiError, Error};
use crate::orderbook::{DepthFeed, DepthUpdate, FeedEvent, SubscriptionHandle};
use crate::types::market::{merge_depth_string, validate_symbol};
use crate::types::messages::{
    DepthUpdateParams, SocketMessage, SocketNotification, SocketRequest, SocketResponse,
    DEPTH_SUBJECT, DEPTH_UPDATE_METHOD, SUBSCRIBE_ACTION,
};
use crate::types::Marker;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One connection to the Crex24 socket API
///
/// # Thread Safety
///
/// This client is NOT thread-safe. [`Crex24DepthFeed`] gives each
/// connection its own task.
#[derive(Debug)]
pub struct Crex24Socket {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    request_id: u64,
}

impl Crex24Socket {
    /// Connect to the Crex24 socket API
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the connection fails.
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(config.websocket_url()).await?;
        let (write, read) = ws_stream.split();
        debug!(url = config.websocket_url(), "socket connected");

        Ok(Self {
            write,
            read,
            request_id: 1,
        })
    }

    async fn send(&mut self, request: &SocketRequest) -> Result<u64, Error> {
        let json = serde_json::to_string(request)?;
        self.write.send(Message::Text(json)).await?;
        self.request_id += 1;
        Ok(request.id)
    }

    /// Subscribe to depth updates of one symbol
    ///
    /// # Arguments
    ///
    /// * `symbol` - Market symbol
    /// * `limit` - Levels per side (5, 10 or 20)
    /// * `merge` - Merge depth in wire form, see [`merge_depth_string`]
    pub async fn subscribe_depth(
        &mut self,
        symbol: &str,
        limit: u32,
        merge: &str,
    ) -> Result<u64, Error> {
        let request = SocketRequest::depth_subscribe(self.request_id, symbol, limit, merge);
        self.send(&request).await
    }

    /// Send a keepalive
    pub async fn ping(&mut self) -> Result<u64, Error> {
        let request = SocketRequest::ping(self.request_id);
        self.send(&request).await
    }

    /// Receive the next message from the socket
    ///
    /// # Returns
    ///
    /// The next message, or `None` if the connection is closed.
    pub async fn next_message(&mut self) -> Option<Result<SocketMessage, Error>> {
        loop {
            match self.read.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(&text).map_err(Error::from));
                }
                Ok(Message::Ping(data)) => {
                    // Respond to pings automatically
                    if let Err(e) = self.write.send(Message::Pong(data)).await {
                        return Some(Err(e.into()));
                    }
                }
                Ok(Message::Close(_)) => {
                    return Some(Err(Error::ConnectionClosed));
                }
                Ok(_) => {
                    // Ignore other message types (Binary, Pong, Frame)
                    continue;
                }
                Err(e) => {
                    return Some(Err(e.into()));
                }
            }
        }
    }

    /// Close the WebSocket connection
    pub async fn close(&mut self) -> Result<(), Error> {
        self.write.close().await?;
        Ok(())
    }
}

/// Turns `depth.update` notifications of one subscription into stamped
/// [`DepthUpdate`]s
#[derive(Debug, Clone)]
pub struct DepthDecoder {
    symbol: String,
    next_marker: Marker,
}

impl DepthDecoder {
    /// Create a decoder for `symbol`; the first update gets marker 1
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            next_marker: 1,
        }
    }

    /// Decode one notification.
    ///
    /// Returns `None` for notifications that are not depth updates of this
    /// subscription, and for depth updates that cannot be decoded (those
    /// still consume a marker).
    pub fn decode(&mut self, notification: SocketNotification) -> Option<DepthUpdate> {
        if notification.method != DEPTH_UPDATE_METHOD {
            debug!(method = %notification.method, "ignoring notification");
            return None;
        }

        let params = match DepthUpdateParams::try_from(notification.params) {
            Ok(params) => params,
            Err(err) => {
                let marker = self.take_marker();
                warn!(symbol = %self.symbol, marker, error = %err, "skipping undecodable depth update");
                return None;
            }
        };

        if params.symbol != self.symbol {
            debug!(expected = %self.symbol, got = %params.symbol, "ignoring depth update for another symbol");
            return None;
        }

        Some(DepthUpdate {
            is_full: params.full,
            marker: self.take_marker(),
            bids: params.book.bids,
            asks: params.book.asks,
            last_price: params.book.last,
        })
    }

    /// Account for a frame that could not be parsed at all.
    ///
    /// It may have been a depth update, so it consumes a marker and the
    /// next delta shows up as a gap.
    pub fn skip(&mut self) -> Marker {
        self.take_marker()
    }

    fn take_marker(&mut self) -> Marker {
        let marker = self.next_marker;
        self.next_marker += 1;
        marker
    }
}

/// Command sent to a connection task
#[derive(Debug)]
enum Command {
    /// Re-send `depth.subscribe`; the reply resolves once the server answers
    Resync(oneshot::Sender<Result<(), Error>>),
    /// Close the socket and stop
    Close,
}

type Registry = Arc<Mutex<FxHashMap<u64, UnboundedSender<Command>>>>;

/// The task side of one depth subscription
struct Connection {
    id: u64,
    symbol: String,
    limit: u32,
    merge: String,
    socket: Crex24Socket,
    decoder: DepthDecoder,
    sink: UnboundedSender<FeedEvent>,
    /// Resync replies waiting for their response, by request id
    pending: FxHashMap<u64, oneshot::Sender<Result<(), Error>>>,
    registry: Registry,
}

impl Connection {
    /// Forward one notification; returns `false` once the book is gone
    fn forward(&mut self, notification: SocketNotification) -> bool {
        match self.decoder.decode(notification) {
            Some(update) => self.sink.send(FeedEvent::Update(update)).is_ok(),
            None => true,
        }
    }

    fn handle_response(&mut self, response: SocketResponse) {
        let reply = response.id.and_then(|id| self.pending.remove(&id));
        let result = match response.error {
            Some(err) => {
                warn!(symbol = %self.symbol, code = err.code, reason = %err.message, "socket request failed");
                Err(Error::Api(ApiError::with_code(0, err.code, err.message)))
            }
            None => Ok(()),
        };
        if let Some(reply) = reply {
            let _ = reply.send(result);
        }
    }

    async fn run(mut self, mut commands: UnboundedReceiver<Command>, ping_interval: Duration) {
        let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Resync(reply)) => {
                        match self.socket.subscribe_depth(&self.symbol, self.limit, &self.merge).await {
                            Ok(id) => {
                                self.pending.insert(id, reply);
                            }
                            Err(err) => {
                                let _ = reply.send(Err(err));
                            }
                        }
                    }
                    Some(Command::Close) | None => {
                        debug!(symbol = %self.symbol, id = self.id, "closing depth connection");
                        let _ = self.socket.close().await;
                        break;
                    }
                },
                () = self.sink.closed() => {
                    debug!(symbol = %self.symbol, id = self.id, "order book dropped, closing connection");
                    let _ = self.socket.close().await;
                    break;
                }
                _ = ping.tick() => {
                    if let Err(err) = self.socket.ping().await {
                        warn!(symbol = %self.symbol, error = %err, "keepalive failed");
                        self.disconnected();
                        break;
                    }
                }
                message = self.socket.next_message() => match message {
                    Some(Ok(SocketMessage::Notification(notification))) => {
                        if !self.forward(notification) {
                            debug!(symbol = %self.symbol, "order book dropped, closing connection");
                            let _ = self.socket.close().await;
                            break;
                        }
                    }
                    Some(Ok(SocketMessage::Response(response))) => self.handle_response(response),
                    Some(Err(Error::Json(err))) => {
                        let marker = self.decoder.skip();
                        warn!(symbol = %self.symbol, marker, error = %err, "skipping unparsable socket message");
                    }
                    Some(Err(err)) => {
                        warn!(symbol = %self.symbol, error = %err, "depth connection lost");
                        self.disconnected();
                        break;
                    }
                    None => {
                        warn!(symbol = %self.symbol, "depth connection closed by server");
                        self.disconnected();
                        break;
                    }
                },
            }
        }

        self.registry.lock().remove(&self.id);
    }

    fn disconnected(&mut self) {
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(Error::ConnectionClosed));
        }
        let _ = self.sink.send(FeedEvent::Disconnected);
    }
}

/// [`DepthFeed`] over the Crex24 socket API, one connection per subscription
pub struct Crex24DepthFeed {
    config: Config,
    limit: u32,
    merge: String,
    next_id: AtomicU64,
    connections: Registry,
}

impl std::fmt::Debug for Crex24DepthFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crex24DepthFeed")
            .field("websocket_url", &self.config.websocket_url())
            .field("limit", &self.limit)
            .field("merge", &self.merge)
            .field("connections", &self.connections.lock().len())
            .finish()
    }
}

impl Crex24DepthFeed {
    /// Create a feed subscribing with the depth settings of `book_config`
    ///
    /// # Errors
    ///
    /// Returns an error if either config is invalid.
    pub fn new(config: Config, book_config: OrderBookConfig) -> Result<Self, Error> {
        config.validate()?;
        book_config.validate()?;

        Ok(Self {
            config,
            limit: book_config.levels(),
            merge: merge_depth_string(book_config.merge_depth()),
            next_id: AtomicU64::new(1),
            connections: Arc::new(Mutex::new(FxHashMap::default())),
        })
    }

    /// Number of open connections
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Connect, subscribe and wait for the server to accept
    async fn open(
        &self,
        symbol: &str,
    ) -> Result<(Crex24Socket, Vec<Option<SocketNotification>>), Error> {
        let mut socket = Crex24Socket::connect(&self.config).await?;
        let request_id = socket.subscribe_depth(symbol, self.limit, &self.merge).await?;

        // The first full update may arrive before the response; `None`
        // marks a frame that could not be parsed
        let mut early = Vec::new();
        let response = tokio::time::timeout(self.config.timeout(), async {
            loop {
                match socket.next_message().await {
                    Some(Ok(SocketMessage::Response(response))) if response.id == Some(request_id) => {
                        return Ok(response);
                    }
                    Some(Ok(SocketMessage::Notification(notification))) => early.push(Some(notification)),
                    Some(Err(Error::Json(_))) => early.push(None),
                    Some(Ok(SocketMessage::Response(_))) => continue,
                    Some(Err(err)) => return Err(err),
                    None => return Err(Error::ConnectionClosed),
                }
            }
        })
        .await
        .map_err(|_| Error::Timeout)??;

        if let Some(err) = response.error {
            let _ = socket.close().await;
            return Err(Error::SubscriptionFailed(format!(
                "{} {}.{} rejected: {} (code {})",
                symbol, DEPTH_SUBJECT, SUBSCRIBE_ACTION, err.message, err.code
            )));
        }
        Ok((socket, early))
    }
}

#[async_trait]
impl DepthFeed for Crex24DepthFeed {
    async fn subscribe(
        &self,
        symbol: &str,
        sink: UnboundedSender<FeedEvent>,
    ) -> Result<SubscriptionHandle, Error> {
        validate_symbol(symbol)?;
        let (socket, early) = self.open(symbol).await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        self.connections.lock().insert(id, commands_tx);

        let mut connection = Connection {
            id,
            symbol: symbol.to_string(),
            limit: self.limit,
            merge: self.merge.clone(),
            socket,
            decoder: DepthDecoder::new(symbol),
            sink,
            pending: FxHashMap::default(),
            registry: Arc::clone(&self.connections),
        };
        for notification in early {
            match notification {
                Some(notification) => {
                    connection.forward(notification);
                }
                None => {
                    connection.decoder.skip();
                }
            }
        }
        tokio::spawn(connection.run(commands_rx, self.config.ping_interval()));

        info!(symbol, id, "depth subscription opened");
        Ok(SubscriptionHandle {
            id,
            symbol: symbol.to_string(),
        })
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), Error> {
        let commands = self.connections.lock().remove(&handle.id);
        if let Some(commands) = commands {
            // The task may already be gone
            let _ = commands.send(Command::Close);
            info!(symbol = %handle.symbol, id = handle.id, "depth subscription closed");
        }
        Ok(())
    }

    async fn request_resync(&self, handle: &SubscriptionHandle) -> Result<(), Error> {
        let commands = self
            .connections
            .lock()
            .get(&handle.id)
            .cloned()
            .ok_or(Error::ConnectionClosed)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        commands
            .send(Command::Resync(reply_tx))
            .map_err(|_| Error::ConnectionClosed)?;

        match tokio::time::timeout(self.config.timeout(), reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::Timeout),
        }
    }
}
