//! Live order book stream - keeps a Crex24 book in sync and prints its top
//!
//! Usage:
//!   cargo run --example stream_book
//!
//! Optional:
//!   CREX24_SYMBOL=ETH-BTC  # Market to stream (default: ETH-BTC)
//!   CREX24_LEVELS=10       # Book depth, one of 5, 10, 20 (default: 10)
//!   CREX24_SECONDS=30      # How long to stream (default: 30)

use std::time::Duration;

use crex24_rs::config::{OrderBookConfig, ReconnectConfig};
use crex24_rs::orderbook::BookEvent;
use crex24_rs::types::BookSide;
use crex24_rs::{Config, Crex24Client};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("crex24_rs=info".parse()?),
        )
        .init();

    let symbol = std::env::var("CREX24_SYMBOL").unwrap_or_else(|_| "ETH-BTC".to_string());
    let levels: u32 = std::env::var("CREX24_LEVELS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);
    let seconds: u64 = std::env::var("CREX24_SECONDS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30);

    println!("=== Crex24 Order Book Stream ===\n");

    let client = Crex24Client::new(Config::new())?;

    // Cross-check against a one-off REST snapshot
    let rest_book = client.rest().get_order_book(&symbol, 0, Some(levels)).await?;
    println!(
        "REST {}: {} bids, {} asks, last {:?}",
        symbol,
        rest_book.bids.len(),
        rest_book.asks.len(),
        rest_book.last
    );

    let book_config = OrderBookConfig::new()
        .with_levels(levels)
        .with_sync_timeout(Duration::from_secs(15))
        .with_reconnect(Some(ReconnectConfig::new().max_retries(5)));
    let book = client.symbol_order_book(&symbol, book_config)?;

    let mut events = book.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                BookEvent::StatusChanged { from, to } => println!("[status] {from} -> {to}"),
                BookEvent::Resynced { marker } => println!("[resync] snapshot at marker {marker}"),
                BookEvent::SyncTimedOut { timeout } => {
                    println!("[resync] no snapshot within {timeout:?}, retrying")
                }
                BookEvent::Reconnecting { attempt, delay } => {
                    println!("[reconnect] attempt {attempt} in {delay:?}")
                }
                BookEvent::ReconnectFailed { attempts } => {
                    println!("[reconnect] gave up after {attempts} attempts")
                }
            }
        }
    });

    println!("\nConnecting...");
    book.start().await?;
    println!("Synced. Streaming for {seconds}s (Ctrl-C to stop)\n");

    let mut ticker = tokio::time::interval(Duration::from_secs(2));
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                if !book.is_synced() {
                    println!("({}, waiting for snapshot)", book.status());
                    continue;
                }

                println!(
                    "--- {} marker {:?} spread {:?} mid {:?}",
                    symbol,
                    book.last_update_marker(),
                    book.spread(),
                    book.mid_price()
                );
                for level in book.top_levels(BookSide::Ask, 5).iter().rev() {
                    println!("    ask {level}");
                }
                for level in book.top_levels(BookSide::Bid, 5) {
                    println!("    bid {level}");
                }
            }
        }
    }

    book.stop().await;
    println!("\nStopped ({})", book.status());
    Ok(())
}
