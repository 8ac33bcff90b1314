//! Update reconciliation.
//!
//! The functions here are the only way an [`OrderBook`] changes. They enforce:
//!
//! - a snapshot (`apply_full`) is always legal and replaces both sides;
//! - a delta (`apply_incremental`) is legal only on a synced book and only if
//!   its marker follows the stored one;
//! - an update is validated in full before anything is written, so it either
//!   applies completely or not at all.

use rust_decimal::Decimal;

use crate::config::MarkerPolicy;
use crate::error::Error;
use crate::types::{DepthEntry, Marker};

use super::book::{OrderBook, SyncStatus};
use super::feed::DepthUpdate;

/// Check every entry of an update.
///
/// # Errors
///
/// Returns [`Error::MalformedUpdate`] for a non-positive price or a negative
/// quantity.
pub fn validate(bids: &[DepthEntry], asks: &[DepthEntry]) -> Result<(), Error> {
    for entry in bids.iter().chain(asks) {
        if entry.price <= Decimal::ZERO {
            return Err(Error::MalformedUpdate(format!(
                "non-positive price {}",
                entry.price
            )));
        }
        if entry.quantity < Decimal::ZERO {
            return Err(Error::MalformedUpdate(format!(
                "negative quantity {} at price {}",
                entry.quantity, entry.price
            )));
        }
    }
    Ok(())
}

/// Replace both sides with a snapshot and store its marker.
///
/// Applying the same snapshot twice yields the same book.
///
/// # Errors
///
/// Returns [`Error::MalformedUpdate`] if any entry is invalid; the book is
/// left untouched in that case.
pub fn apply_full(
    book: &mut OrderBook,
    bids: &[DepthEntry],
    asks: &[DepthEntry],
    marker: Marker,
) -> Result<(), Error> {
    validate(bids, asks)?;

    book.bids.replace(bids.iter().copied());
    book.asks.replace(asks.iter().copied());
    book.last_update_marker = Some(marker);
    Ok(())
}

/// Apply a delta on top of the current book.
///
/// # Errors
///
/// - [`Error::NotSynced`] if the book is not [`SyncStatus::Synced`]
/// - [`Error::GapDetected`] if `marker` does not follow the stored marker
/// - [`Error::MalformedUpdate`] if any entry is invalid
///
/// In every error case the book is left untouched.
pub fn apply_incremental(
    book: &mut OrderBook,
    bids: &[DepthEntry],
    asks: &[DepthEntry],
    marker: Marker,
    policy: MarkerPolicy,
) -> Result<(), Error> {
    if book.status != SyncStatus::Synced {
        return Err(Error::NotSynced(book.status));
    }

    let previous = book.last_update_marker.ok_or(Error::NotSynced(book.status))?;
    if !policy.follows(previous, marker) {
        return Err(Error::GapDetected {
            expected: policy.expected_after(previous),
            got: marker,
        });
    }

    validate(bids, asks)?;

    for &entry in bids {
        book.bids.apply(entry);
    }
    for &entry in asks {
        book.asks.apply(entry);
    }
    book.last_update_marker = Some(marker);
    Ok(())
}

/// Apply a feed update, dispatching on its full flag.
///
/// Snapshots also record the last trade price they carry.
pub fn apply_update(
    book: &mut OrderBook,
    update: &DepthUpdate,
    policy: MarkerPolicy,
) -> Result<(), Error> {
    if update.is_full {
        apply_full(book, &update.bids, &update.asks, update.marker)?;
        book.last_trade_price = update.last_price;
        Ok(())
    } else {
        apply_incremental(book, &update.bids, &update.asks, update.marker, policy)
    }
}
