//! WebSocket message types.
//!
//! This module contains types for requests sent to the Crex24 socket API and
//! the messages it pushes back. Crex24 speaks a JSON-RPC flavoured protocol:
//!
//! - requests: `{"method": "depth.subscribe", "params": [...], "id": 7}`
//! - responses: `{"error": null, "result": ..., "id": 7}`
//! - notifications: `{"method": "depth.update", "params": [...]}`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DepthEntry, Price, TimestampMs};
use crate::error::Error;

/// Subject of the depth channel
pub const DEPTH_SUBJECT: &str = "depth";
/// Subject of server-level requests (ping, time)
pub const SERVER_SUBJECT: &str = "server";
/// Subscribe action
pub const SUBSCRIBE_ACTION: &str = "subscribe";
/// Ping action
pub const PING_ACTION: &str = "ping";
/// Method name of depth notifications
pub const DEPTH_UPDATE_METHOD: &str = "depth.update";

/// Request sent to the socket server
#[derive(Debug, Clone, Serialize)]
pub struct SocketRequest {
    /// `"<subject>.<action>"`
    pub method: String,
    /// Positional parameters
    pub params: Vec<Value>,
    /// Request id, echoed back in the response
    pub id: u64,
}

impl SocketRequest {
    /// Build a request for `subject.action`
    pub fn new(id: u64, subject: &str, action: &str, params: Vec<Value>) -> Self {
        Self {
            method: format!("{}.{}", subject, action),
            params,
            id,
        }
    }

    /// `depth.subscribe` for a symbol
    pub fn depth_subscribe(id: u64, symbol: &str, limit: u32, merge: &str) -> Self {
        Self::new(
            id,
            DEPTH_SUBJECT,
            SUBSCRIBE_ACTION,
            vec![
                Value::from(symbol),
                Value::from(limit),
                Value::from(merge),
            ],
        )
    }

    /// `server.ping` keepalive
    pub fn ping(id: u64) -> Self {
        Self::new(id, SERVER_SUBJECT, PING_ACTION, Vec::new())
    }
}

/// Message received from the socket server
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SocketMessage {
    /// Server push (`depth.update`, ...)
    Notification(SocketNotification),
    /// Reply to one of our requests
    Response(SocketResponse),
}

/// Server push message
#[derive(Debug, Clone, Deserialize)]
pub struct SocketNotification {
    /// `"<subject>.<event>"`
    pub method: String,
    /// Positional payload
    #[serde(default)]
    pub params: Vec<Value>,
}

impl SocketNotification {
    /// Subject part of the method (`"depth"` for `"depth.update"`)
    pub fn subject(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }
}

/// Reply to a request
#[derive(Debug, Clone, Deserialize)]
pub struct SocketResponse {
    /// Id of the request this answers
    pub id: Option<u64>,
    /// Error, if the request failed
    #[serde(default)]
    pub error: Option<SocketError>,
    /// Result payload
    #[serde(default)]
    pub result: Option<Value>,
}

/// Error details in a socket response
#[derive(Debug, Clone, Deserialize)]
pub struct SocketError {
    /// Error code
    pub code: i64,
    /// Error message
    pub message: String,
}

/// Order book payload of a `depth.update` notification
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SocketOrderBook {
    /// Price of the last trade, only filled on a full update
    #[serde(default)]
    pub last: Option<Price>,
    /// Timestamp of the data, only filled on a full update
    #[serde(default)]
    pub time: Option<TimestampMs>,
    /// Ask levels
    #[serde(default)]
    pub asks: Vec<DepthEntry>,
    /// Bid levels
    #[serde(default)]
    pub bids: Vec<DepthEntry>,
}

/// Decoded `depth.update` parameters: `[full, book, symbol]`
#[derive(Debug, Clone)]
pub struct DepthUpdateParams {
    /// Whether this is a full snapshot or a delta on the last sent data
    pub full: bool,
    /// Changed levels
    pub book: SocketOrderBook,
    /// Symbol the update belongs to
    pub symbol: String,
}

impl TryFrom<Vec<Value>> for DepthUpdateParams {
    type Error = Error;

    fn try_from(params: Vec<Value>) -> Result<Self, Error> {
        let [full, book, symbol]: [Value; 3] = params.try_into().map_err(|p: Vec<Value>| {
            Error::MalformedUpdate(format!(
                "expected 3 depth update params, received {}",
                p.len()
            ))
        })?;

        let full = full
            .as_bool()
            .ok_or_else(|| Error::MalformedUpdate(format!("invalid full flag: {}", full)))?;
        let book: SocketOrderBook = serde_json::from_value(book)?;
        let symbol = symbol.as_str().unwrap_or_default().to_string();

        Ok(Self { full, book, symbol })
    }
}
