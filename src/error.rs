//! Error types for the crex24-rs crate.
//!
//! This module defines the error types that can occur when interacting with
//! the Crex24 API and while keeping a streamed order book synchronized.

use std::time::Duration;

use thiserror::Error;

use crate::orderbook::SyncStatus;
use crate::types::Marker;

/// The main error type for this crate
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration (bad URL, out of range option)
    #[error("Configuration error: {0}")]
    Config(String),

    /// API returned an error response
    #[error("API error ({}): {}", .0.status, .0.message)]
    Api(ApiError),

    /// Request parameter failed validation
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// WebSocket connection closed unexpectedly
    #[error("WebSocket connection closed")]
    ConnectionClosed,

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// The feed rejected the subscription or the transport failed while connecting
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    /// No full order book snapshot arrived within the sync budget
    #[error("No order book snapshot received within {0:?}")]
    SyncTimeout(Duration),

    /// Marker gap detected (missed updates)
    #[error("Marker gap: expected {expected}, got {got}")]
    GapDetected {
        /// Expected marker
        expected: Marker,
        /// Marker actually received
        got: Marker,
    },

    /// A depth update failed validation
    #[error("Malformed update: {0}")]
    MalformedUpdate(String),

    /// A delta arrived while the book had no base snapshot
    #[error("Order book is not synced (status: {0})")]
    NotSynced(SyncStatus),

    /// The order book was stopped while a caller was waiting on it
    #[error("Operation cancelled")]
    Cancelled,
}

/// Error returned by the Crex24 API
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code (0 for socket errors)
    pub status: u16,
    /// Error code from API (if provided)
    pub code: Option<i64>,
    /// Error message
    pub message: String,
}

impl From<tokio_tungstenite::tungstenite::http::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::http::Error) -> Self {
        Error::Config(format!("HTTP error building WebSocket request: {}", err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Config(format!("invalid URL: {}", err))
    }
}

impl Error {
    /// Whether the order book can recover from this error on its own
    /// (by resynchronizing or resubscribing)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::GapDetected { .. }
                | Error::NotSynced(_)
                | Error::MalformedUpdate(_)
                | Error::SyncTimeout(_)
                | Error::SubscriptionFailed(_)
                | Error::ConnectionClosed
                | Error::Timeout
                | Error::WebSocket(_)
        )
    }
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
        }
    }

    /// Create an API error with an error code
    pub fn with_code(status: u16, code: i64, message: impl Into<String>) -> Self {
        Self {
            status,
            code: Some(code),
            message: message.into(),
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// Check if the request was rate limited
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}
