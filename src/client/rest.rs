//! HTTP REST client for the public Crex24 API.
//!
//! This module provides the [`RestClient`] for the public market data
//! endpoints. Only the order book query is exposed; it is what a streamed
//! book is checked against.
//!
//! # Example
//!
//! ```rust,no_run
//! use crex24_rs::{Config, Crex24Client};
//!
//! # async fn example() -> crex24_rs::Result<()> {
//! let client = Crex24Client::new(Config::new())?;
//!
//! let book = client.rest().get_order_book("ETH-BTC", 0, Some(10)).await?;
//! println!("{} bids, {} asks", book.bids.len(), book.asks.len());
//! # Ok(())
//! # }
//! ```

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::Config;
use crate::error::{ApiError, Error};
use crate::types::market::{
    merge_depth_string, validate_limit, validate_merge_depth, validate_symbol, ApiEnvelope,
};
use crate::types::RestOrderBook;

/// HTTP client for the Crex24 REST API
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    /// Create a new REST client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.rest_base_url().trim_end_matches('/').to_string(),
        })
    }

    /// Get the order book of a market.
    ///
    /// # Arguments
    ///
    /// * `symbol` - Market symbol, e.g. `ETH-BTC`
    /// * `merge_depth` - Price grouping, 0..=8 decimals merged
    /// * `limit` - Levels per side (5, 10 or 20); `None` for the server default
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] before sending anything if a
    /// parameter is out of range, and [`Error::Api`] if the server answers
    /// with an error.
    pub async fn get_order_book(
        &self,
        symbol: &str,
        merge_depth: u8,
        limit: Option<u32>,
    ) -> Result<RestOrderBook, Error> {
        validate_symbol(symbol)?;
        validate_merge_depth(merge_depth)?;
        if let Some(limit) = limit {
            validate_limit(limit)?;
        }

        let mut query = vec![
            ("market", symbol.to_string()),
            ("merge", merge_depth_string(merge_depth)),
        ];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        self.get("/market/depth", &query).await
    }

    /// Make a GET request and unwrap the response envelope
    pub async fn get<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, ?query, "GET");

        let response = self.client.get(&url).query(query).send().await?;
        self.handle_response(response).await
    }

    /// Handle the HTTP response, checking for errors
    async fn handle_response<T>(&self, response: reqwest::Response) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Try to parse as API error
            if let Ok(envelope) = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body) {
                let message = envelope.message.unwrap_or(body);
                return Err(Error::Api(ApiError::with_code(
                    status.as_u16(),
                    envelope.code,
                    message,
                )));
            }
            return Err(Error::Api(ApiError::new(status.as_u16(), body)));
        }

        let envelope: ApiEnvelope<T> = serde_json::from_str(&body)?;
        if envelope.code != 0 {
            return Err(Error::Api(ApiError::with_code(
                status.as_u16(),
                envelope.code,
                envelope.message.unwrap_or_default(),
            )));
        }

        envelope.data.ok_or_else(|| {
            Error::Api(ApiError::new(
                status.as_u16(),
                envelope.message.unwrap_or_else(|| "empty response".to_string()),
            ))
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
