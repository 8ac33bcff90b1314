//! Integration tests for the REST API.
//!
//! The `local_*` tests answer requests from a minimal in-process HTTP
//! responder. The `live_*` tests query the real exchange and only run when
//! `CREX24_LIVE=1` is set.
//!
//! # Running
//!
//! ```bash
//! cargo test --test integration_rest
//! CREX24_LIVE=1 cargo test --test integration_rest -- --nocapture
//! ```

use crex24_rs::types::DepthEntry;
use crex24_rs::{Config, Crex24Client, Error};
use rust_decimal_macros::dec;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Answer a single HTTP request with `status` and `body`, handing the
/// request line back to the test
async fn respond_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (request_tx, request_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await.unwrap();
        let request = String::from_utf8_lossy(&buf[..n]).to_string();
        let request_line = request.lines().next().unwrap_or_default().to_string();
        let _ = request_tx.send(request_line);

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;
    });

    (format!("http://{addr}"), request_rx)
}

fn local_client(base_url: &str) -> Crex24Client {
    Crex24Client::new(Config::new().with_rest_base_url(base_url)).unwrap()
}

#[tokio::test]
async fn local_get_order_book() {
    let (url, request) = respond_once(
        "200 OK",
        r#"{"code":0,"message":null,"data":{"last":"0.0505","asks":[["0.051","2"]],"bids":[["0.049","3"],["0.048","1"]]}}"#,
    )
    .await;
    let client = local_client(&url);

    let book = client
        .rest()
        .get_order_book("ETH-BTC", 6, Some(5))
        .await
        .unwrap();

    assert_eq!(book.last, Some(dec!(0.0505)));
    assert_eq!(book.asks, vec![DepthEntry::new(dec!(0.051), dec!(2))]);
    assert_eq!(book.bids.len(), 2);

    let request_line = request.await.unwrap();
    assert!(request_line.starts_with("GET /market/depth?"));
    assert!(request_line.contains("market=ETH-BTC"));
    assert!(request_line.contains("merge=0.01"));
    assert!(request_line.contains("limit=5"));
}

#[tokio::test]
async fn local_rate_limited() {
    let (url, _request) = respond_once(
        "429 Too Many Requests",
        r#"{"code":429,"message":"rate limit exceeded","data":null}"#,
    )
    .await;
    let client = local_client(&url);

    match client.rest().get_order_book("ETH-BTC", 0, None).await {
        Err(Error::Api(err)) => {
            assert!(err.is_rate_limited());
            assert_eq!(err.message, "rate limit exceeded");
        }
        other => panic!("expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn local_envelope_error_code() {
    let (url, _request) = respond_once(
        "200 OK",
        r#"{"code":12,"message":"unknown market","data":null}"#,
    )
    .await;
    let client = local_client(&url);

    match client.rest().get_order_book("NOPE-BTC", 0, None).await {
        Err(Error::Api(err)) => {
            assert_eq!(err.code, Some(12));
            assert!(!err.is_client_error());
        }
        other => panic!("expected API error, got {:?}", other),
    }
}

// Live exchange

fn create_client() -> Option<Crex24Client> {
    if !std::env::var("CREX24_LIVE").is_ok_and(|v| v == "1") {
        return None;
    }
    Crex24Client::new(Config::new()).ok()
}

/// Skip test unless live tests are enabled
macro_rules! require_client {
    () => {
        match create_client() {
            Some(c) => c,
            None => {
                eprintln!("Skipping test: CREX24_LIVE=1 not set");
                return;
            }
        }
    };
}

#[tokio::test]
async fn live_get_order_book() {
    let client = require_client!();

    let book = client.rest().get_order_book("ETH-BTC", 0, Some(10)).await;
    assert!(book.is_ok(), "Failed to get order book: {:?}", book);

    let book = book.unwrap();
    println!("ETH-BTC: {} bids, {} asks, last {:?}", book.bids.len(), book.asks.len(), book.last);
    assert!(book.bids.len() <= 10);
    if let (Some(bid), Some(ask)) = (book.bids.first(), book.asks.first()) {
        assert!(bid.price < ask.price);
    }
}

#[tokio::test]
async fn live_unknown_market() {
    let client = require_client!();

    let result = client.rest().get_order_book("NOSUCH-COIN", 0, None).await;
    assert!(matches!(result, Err(Error::Api(_))), "got {:?}", result);
}
