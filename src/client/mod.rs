//! API clients for communicating with Crex24.
//!
//! This module contains:
//!
//! - [`rest`] - HTTP client for the public REST endpoints
//! - [`websocket`] - socket connection and the depth feed driving streamed order books

pub mod rest;
pub mod websocket;

pub use rest::RestClient;
pub use websocket::{Crex24DepthFeed, Crex24Socket};
