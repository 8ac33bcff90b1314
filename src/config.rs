//! Configuration for the Crex24 API client and streamed order books.
//!
//! This module provides the [`Config`] struct for endpoints and transport
//! settings, and [`OrderBookConfig`] for the order book sync policy. Both are
//! plain values passed at construction; there are no process-wide defaults
//! to mutate.

use std::time::Duration;

use url::Url;

use crate::error::Error;
use crate::types::market::{validate_limit, validate_merge_depth};
use crate::types::Marker;

/// Default REST API base URL
pub const DEFAULT_REST_BASE_URL: &str = "https://api.crex24.com/v2";

/// Default WebSocket URL
pub const DEFAULT_WEBSOCKET_URL: &str = "wss://socket.crex24.com/";

/// Configuration for the Crex24 API client
///
/// # Example
///
/// ```rust
/// use crex24_rs::Config;
///
/// let config = Config::new();
///
/// // Custom timeout
/// let config = Config::new()
///     .with_timeout(std::time::Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// REST API base URL
    rest_base_url: String,

    /// WebSocket URL
    websocket_url: String,

    /// HTTP request and socket response timeout
    timeout: Duration,

    /// Interval between socket keepalive pings
    ping_interval: Duration,
}

impl Config {
    /// Create a new configuration pointing at the production endpoints
    pub fn new() -> Self {
        Self {
            rest_base_url: DEFAULT_REST_BASE_URL.to_string(),
            websocket_url: DEFAULT_WEBSOCKET_URL.to_string(),
            timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(60),
        }
    }

    /// Set the REST API base URL
    #[must_use]
    pub fn with_rest_base_url(mut self, url: impl Into<String>) -> Self {
        self.rest_base_url = url.into();
        self
    }

    /// Set the WebSocket URL
    #[must_use]
    pub fn with_websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = url.into();
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the socket keepalive interval
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Get the REST API base URL
    pub fn rest_base_url(&self) -> &str {
        &self.rest_base_url
    }

    /// Get the WebSocket URL
    pub fn websocket_url(&self) -> &str {
        &self.websocket_url
    }

    /// Get the timeout duration
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get the keepalive interval
    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    /// Check both URLs parse and use the expected schemes
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unparsable URLs or wrong schemes.
    pub fn validate(&self) -> Result<(), Error> {
        let rest = Url::parse(&self.rest_base_url)?;
        if !matches!(rest.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "REST URL must be http(s): {}",
                self.rest_base_url
            )));
        }

        let ws = Url::parse(&self.websocket_url)?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "WebSocket URL must be ws(s): {}",
                self.websocket_url
            )));
        }

        if self.timeout.is_zero() || self.ping_interval.is_zero() {
            return Err(Error::Config("timeouts must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// How the successor of a marker is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerPolicy {
    /// Markers are sequence numbers; the next update must carry `previous + 1`
    #[default]
    Strict,
    /// Markers are timestamps; the next update must carry a larger value
    Monotonic,
}

impl MarkerPolicy {
    /// Whether `next` is an acceptable successor of `previous`
    pub fn follows(self, previous: Marker, next: Marker) -> bool {
        match self {
            MarkerPolicy::Strict => previous.checked_add(1) == Some(next),
            MarkerPolicy::Monotonic => next > previous,
        }
    }

    /// The smallest marker that would be accepted after `previous`
    pub fn expected_after(self, previous: Marker) -> Marker {
        previous.saturating_add(1)
    }
}

/// Configuration for reconnection behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts (0 = infinite)
    pub max_retries: u32,
    /// Initial delay between reconnection attempts
    pub initial_delay_ms: u64,
    /// Maximum delay between reconnection attempts
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Create a new reconnect config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum retries (0 = infinite)
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set initial delay in milliseconds
    pub fn initial_delay_ms(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    /// Set maximum delay in milliseconds
    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Set backoff multiplier
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Whether another attempt is allowed after `attempts` failures
    pub fn allows_attempt(&self, attempts: u32) -> bool {
        self.max_retries == 0 || attempts < self.max_retries
    }

    /// Calculate delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay_ms = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay_ms)
    }
}

/// Sync policy for a streamed order book
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use crex24_rs::config::{OrderBookConfig, ReconnectConfig};
///
/// let config = OrderBookConfig::new()
///     .with_levels(10)
///     .with_sync_timeout(Duration::from_secs(5))
///     .with_reconnect(Some(ReconnectConfig::new().max_retries(3)));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct OrderBookConfig {
    /// Number of levels requested per side (5, 10 or 20)
    levels: u32,
    /// Price merge depth (0..=8)
    merge_depth: u8,
    /// How long to wait for a full snapshot
    sync_timeout: Duration,
    /// How marker succession is checked
    marker_policy: MarkerPolicy,
    /// Automatic resubscription after a transport disconnect
    reconnect: Option<ReconnectConfig>,
    /// Capacity of the consumer event channel
    event_capacity: usize,
}

impl OrderBookConfig {
    /// Create the default policy: 20 levels, no merging, 10 second sync timeout
    pub fn new() -> Self {
        Self {
            levels: 20,
            merge_depth: 0,
            sync_timeout: Duration::from_secs(10),
            marker_policy: MarkerPolicy::Strict,
            reconnect: Some(ReconnectConfig::default()),
            event_capacity: 64,
        }
    }

    /// Set the number of levels per side
    #[must_use]
    pub fn with_levels(mut self, levels: u32) -> Self {
        self.levels = levels;
        self
    }

    /// Set the price merge depth
    #[must_use]
    pub fn with_merge_depth(mut self, merge_depth: u8) -> Self {
        self.merge_depth = merge_depth;
        self
    }

    /// Set the snapshot wait budget
    #[must_use]
    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Set the marker policy
    #[must_use]
    pub fn with_marker_policy(mut self, policy: MarkerPolicy) -> Self {
        self.marker_policy = policy;
        self
    }

    /// Set (or disable with `None`) automatic resubscription
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: Option<ReconnectConfig>) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the consumer event channel capacity
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Get the number of levels per side
    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Get the merge depth
    pub fn merge_depth(&self) -> u8 {
        self.merge_depth
    }

    /// Get the sync timeout
    pub fn sync_timeout(&self) -> Duration {
        self.sync_timeout
    }

    /// Get the marker policy
    pub fn marker_policy(&self) -> MarkerPolicy {
        self.marker_policy
    }

    /// Get the reconnect policy
    pub fn reconnect(&self) -> Option<&ReconnectConfig> {
        self.reconnect.as_ref()
    }

    /// Get the event channel capacity
    pub fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    /// Validate the policy
    ///
    /// # Errors
    ///
    /// Returns an error for unsupported levels, merge depths, a zero sync
    /// timeout or a zero event capacity.
    pub fn validate(&self) -> Result<(), Error> {
        validate_limit(self.levels)?;
        validate_merge_depth(self.merge_depth)?;
        if self.sync_timeout.is_zero() {
            return Err(Error::Config("sync timeout must be non-zero".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event capacity must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl Default for OrderBookConfig {
    fn default() -> Self {
        Self::new()
    }
}
