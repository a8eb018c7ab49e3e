//! When each truck next becomes free.

use crate::id::TruckId;
use crate::time::SimTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Truck id to next-free instant. A missing entry means the truck was never
/// dispatched and is free from the epoch.
///
/// Only the dispatcher writes here, once per created shipment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruckAvailability {
    next_free: BTreeMap<TruckId, SimTime>,
}

impl TruckAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_free(&self, truck: TruckId, at: SimTime) -> bool {
        self.next_free(truck) <= at
    }

    pub fn next_free(&self, truck: TruckId) -> SimTime {
        self.next_free.get(&truck).copied().unwrap_or(SimTime::EPOCH)
    }

    /// Entries for trucks that have been dispatched at least once.
    pub fn iter(&self) -> impl Iterator<Item = (TruckId, SimTime)> + '_ {
        self.next_free.iter().map(|(&id, &at)| (id, at))
    }

    pub fn busy_count(&self, at: SimTime) -> usize {
        self.next_free.values().filter(|&&free| free > at).count()
    }

    pub(crate) fn mark_busy_until(&mut self, truck: TruckId, until: SimTime) {
        self.next_free.insert(truck, until);
    }
}
