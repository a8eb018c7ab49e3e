//! Truck selection and capacity splitting.
//!
//! Selection scans a distribution center's own trucks in round-robin order,
//! then the pool, for the first truck free at the requested instant. Each
//! scan resumes from a persisted cursor so consecutive dispatches rotate
//! through the fleet instead of always loading the first truck.
//!
//! Three outcomes are kept distinct:
//! - `Ok(Some(truck))`: a truck is free.
//! - `Ok(None)`: every eligible truck is busy; the caller queues.
//! - `Err(NoTrucksConfigured)`: nothing could ever serve this DC; the caller
//!   must not queue, or the request would hang forever.

use crate::availability::TruckAvailability;
use crate::id::{DcId, TruckId};
use crate::queue::PendingShipmentRequest;
use crate::roster::TruckRoster;
use crate::shipment::{LineItem, Shipment};
use crate::time::SimTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dispatch failures. Busy fleets are not errors; see [`DispatchOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("no trucks configured for distribution center {0} and the truck pool is empty")]
    NoTrucksConfigured(DcId),
}

/// Result of dispatching one capacity-sized chunk of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A truck was assigned and a `Scheduled` shipment created.
    Dispatched(Shipment),
    /// No truck was free; the chunk waits in the pending queue.
    Queued(PendingShipmentRequest),
}

impl DispatchOutcome {
    pub fn shipment(&self) -> Option<&Shipment> {
        match self {
            DispatchOutcome::Dispatched(shipment) => Some(shipment),
            DispatchOutcome::Queued(_) => None,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, DispatchOutcome::Queued(_))
    }

    /// Items carried by this chunk, whether dispatched or queued.
    pub fn line_items(&self) -> &[LineItem] {
        match self {
            DispatchOutcome::Dispatched(shipment) => shipment.line_items(),
            DispatchOutcome::Queued(request) => &request.line_items,
        }
    }
}

// ---------------------------------------------------------------------------
// Round-robin selection
// ---------------------------------------------------------------------------

/// Persisted rotation positions: one per distribution center plus one for
/// the pool. A cursor is the offset to start the next scan from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationCursors {
    per_dc: BTreeMap<DcId, usize>,
    pool: usize,
}

impl RotationCursors {
    pub fn dc(&self, dc: DcId) -> usize {
        self.per_dc.get(&dc).copied().unwrap_or(0)
    }

    pub fn pool(&self) -> usize {
        self.pool
    }

    /// Per-DC cursors that have moved at least once.
    pub fn iter(&self) -> impl Iterator<Item = (DcId, usize)> + '_ {
        self.per_dc.iter().map(|(&dc, &pos)| (dc, pos))
    }
}

/// Select a free truck for `dc` at `now`, advancing the rotation cursor past
/// the chosen truck.
pub fn select_truck(
    roster: &TruckRoster,
    availability: &TruckAvailability,
    cursors: &mut RotationCursors,
    dc: DcId,
    now: SimTime,
) -> Result<Option<TruckId>, DispatchError> {
    if !roster.can_serve(dc) {
        return Err(DispatchError::NoTrucksConfigured(dc));
    }

    let assigned = roster.assigned_indexes(dc);
    let start = cursors.dc(dc);
    if let Some(pos) = scan(roster, availability, assigned, start, now) {
        cursors.per_dc.insert(dc, (pos + 1) % assigned.len());
        return Ok(Some(roster.at(assigned[pos]).id));
    }

    let pool = roster.pool_indexes();
    if let Some(pos) = scan(roster, availability, pool, cursors.pool, now) {
        cursors.pool = (pos + 1) % pool.len();
        return Ok(Some(roster.at(pool[pos]).id));
    }

    Ok(None)
}

/// Position within `indexes` of the first free truck, scanning circularly
/// from `start`.
fn scan(
    roster: &TruckRoster,
    availability: &TruckAvailability,
    indexes: &[usize],
    start: usize,
    now: SimTime,
) -> Option<usize> {
    let len = indexes.len();
    (0..len)
        .map(|offset| (start + offset) % len)
        .find(|&pos| availability.is_free(roster.at(indexes[pos]).id, now))
}

// ---------------------------------------------------------------------------
// Capacity splitting
// ---------------------------------------------------------------------------

/// Drop zero-quantity lines and merge adjacent lines of the same product.
pub fn normalize_line_items(items: &[LineItem]) -> Vec<LineItem> {
    let mut lines: Vec<LineItem> = Vec::with_capacity(items.len());
    for item in items.iter().filter(|item| item.quantity > 0) {
        let merged = lines
            .last()
            .filter(|last| last.product == item.product)
            .and_then(|last| last.quantity.checked_add(item.quantity));
        match (merged, lines.last_mut()) {
            (Some(quantity), Some(last)) => last.quantity = quantity,
            _ => lines.push(*item),
        }
    }
    lines
}

/// Move up to `capacity` units off the front of `remaining`, in line order.
/// A line straddling the boundary is split, leaving its tail in `remaining`.
pub fn take_chunk(remaining: &mut Vec<LineItem>, capacity: u32) -> Vec<LineItem> {
    let mut room = capacity.max(1);
    let mut chunk = Vec::new();
    let mut consumed = 0;
    for item in remaining.iter_mut() {
        if room == 0 {
            break;
        }
        let take = item.quantity.min(room);
        if take > 0 {
            chunk.push(LineItem::new(item.product, take));
        }
        item.quantity -= take;
        room -= take;
        if item.quantity > 0 {
            break;
        }
        consumed += 1;
    }
    remaining.drain(..consumed);
    chunk
}

/// Split line items into chunks of at most `capacity` units, greedily in
/// line order. A line straddling a chunk boundary is split across chunks, so
/// the total is preserved exactly. Zero-quantity lines are dropped.
pub fn split_line_items(items: &[LineItem], capacity: u32) -> Vec<Vec<LineItem>> {
    let mut remaining = normalize_line_items(items);
    let mut chunks = Vec::new();
    while !remaining.is_empty() {
        chunks.push(take_chunk(&mut remaining, capacity));
    }
    chunks
}

/// Trim a chunk so it fits `capacity`, keeping lines in order. Returns the
/// number of units dropped.
pub fn truncate_to_capacity(items: &mut Vec<LineItem>, capacity: u32) -> u64 {
    let mut room = capacity as u64;
    let mut dropped = 0u64;
    for item in items.iter_mut() {
        let keep = (item.quantity as u64).min(room);
        dropped += item.quantity as u64 - keep;
        item.quantity = keep as u32;
        room -= keep;
    }
    items.retain(|item| item.quantity > 0);
    dropped
}
