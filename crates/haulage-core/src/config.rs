//! Engine configuration: timing constants, route travel times, RNG seed.
//!
//! Every field has a default matching the reference fleet behavior, so an
//! empty configuration file (or `EngineConfig::default()`) yields a working
//! engine.

use crate::id::{DcId, StoreId};
use crate::rng::SimRng;
use crate::time::SimDuration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tunables for a single engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Offset from requested departure to loading start.
    pub loading_lead: SimDuration,
    /// Longest a shipment may sit in one non-terminal state before it is
    /// forced to completion.
    pub dwell_ceiling: SimDuration,
    /// Outbound travel time for routes with no explicit entry.
    pub default_travel: SimDuration,
    /// Upper bound of random extra outbound travel per shipment.
    pub travel_jitter: SimDuration,
    /// Seed for the engine's deterministic RNG.
    pub seed: u64,
    /// Ring-buffer capacity per event kind.
    pub event_buffer_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            loading_lead: SimDuration::from_hours(2),
            dwell_ceiling: SimDuration::from_hours(8),
            default_travel: SimDuration::from_hours(2),
            travel_jitter: SimDuration::ZERO,
            seed: 0,
            event_buffer_capacity: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// RouteTable
// ---------------------------------------------------------------------------

/// Outbound travel time per (distribution center, store) pair.
///
/// Routes are symmetric: the return leg takes as long as the outbound leg.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    routes: BTreeMap<(DcId, StoreId), SimDuration>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the outbound travel time for a route, replacing any previous entry.
    pub fn set(&mut self, dc: DcId, store: StoreId, travel: SimDuration) {
        self.routes.insert((dc, store), travel);
    }

    /// Builder-style variant of [`set`](Self::set).
    pub fn with_route(mut self, dc: DcId, store: StoreId, travel: SimDuration) -> Self {
        self.set(dc, store, travel);
        self
    }

    pub fn get(&self, dc: DcId, store: StoreId) -> Option<SimDuration> {
        self.routes.get(&(dc, store)).copied()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Outbound travel for a route: the explicit entry (or the configured
    /// default) plus jitter drawn from `rng`.
    pub fn outbound(
        &self,
        dc: DcId,
        store: StoreId,
        config: &EngineConfig,
        rng: &mut SimRng,
    ) -> SimDuration {
        let base = self.get(dc, store).unwrap_or(config.default_travel);
        base + rng.jitter(config.travel_jitter)
    }
}
