//! Backlog of shipment requests that found every eligible truck busy.
//!
//! Requests are ordered by their originally requested departure instant,
//! with enqueue order breaking ties. The drainer walks them in that order so
//! the oldest request for a distribution center always gets the next truck.

use crate::id::{DcId, PendingRequestId, StoreId};
use crate::shipment::{LineItem, total_quantity};
use crate::time::SimTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A capacity-sized chunk waiting for a truck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingShipmentRequest {
    pub id: PendingRequestId,
    pub origin: DcId,
    pub destination: StoreId,
    pub line_items: Vec<LineItem>,
    /// Fairness key. Never rewritten while queued.
    pub requested_departure: SimTime,
    pub enqueued_at: SimTime,
}

impl PendingShipmentRequest {
    pub fn total_quantity(&self) -> u64 {
        total_quantity(&self.line_items)
    }
}

/// Drain order: requested departure, then enqueue sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub(crate) struct QueueKey {
    requested: SimTime,
    seq: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingQueue {
    requests: BTreeMap<QueueKey, PendingShipmentRequest>,
    next_seq: u64,
    high_water: usize,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a request and return a copy of what was stored.
    pub(crate) fn push(
        &mut self,
        origin: DcId,
        destination: StoreId,
        line_items: Vec<LineItem>,
        requested_departure: SimTime,
        enqueued_at: SimTime,
    ) -> PendingShipmentRequest {
        let seq = self.next_seq;
        self.next_seq += 1;
        let request = PendingShipmentRequest {
            id: PendingRequestId(seq),
            origin,
            destination,
            line_items,
            requested_departure,
            enqueued_at,
        };
        let key = QueueKey {
            requested: requested_departure,
            seq,
        };
        self.requests.insert(key, request.clone());
        self.high_water = self.high_water.max(self.requests.len());
        request
    }

    pub(crate) fn keys(&self) -> Vec<QueueKey> {
        self.requests.keys().copied().collect()
    }

    pub(crate) fn get(&self, key: QueueKey) -> Option<&PendingShipmentRequest> {
        self.requests.get(&key)
    }

    pub(crate) fn get_mut(&mut self, key: QueueKey) -> Option<&mut PendingShipmentRequest> {
        self.requests.get_mut(&key)
    }

    pub(crate) fn remove(&mut self, key: QueueKey) -> Option<PendingShipmentRequest> {
        self.requests.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Requests in drain order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingShipmentRequest> {
        self.requests.values()
    }

    pub fn len_for(&self, dc: DcId) -> usize {
        self.requests.values().filter(|r| r.origin == dc).count()
    }

    /// Whether a request for `dc` requested no later than `by` is waiting.
    /// A new request for `dc` at `by` must not overtake it.
    pub fn has_waiting(&self, dc: DcId, by: SimTime) -> bool {
        let bound = QueueKey {
            requested: by,
            seq: u64::MAX,
        };
        self.requests
            .range(..=bound)
            .any(|(_, request)| request.origin == dc)
    }

    /// Largest queue length ever observed.
    pub fn high_water_mark(&self) -> usize {
        self.high_water
    }

    /// Requested departure of the request that will be tried first.
    pub fn oldest_requested(&self) -> Option<SimTime> {
        self.requests.keys().next().map(|key| key.requested)
    }

    /// Units waiting across every queued request.
    pub fn queued_quantity(&self) -> u64 {
        self.requests.values().map(|r| r.total_quantity()).sum()
    }
}
