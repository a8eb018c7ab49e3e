//! Per-call reports and the deterministic state hash.

use crate::id::{ShipmentId, TruckId};
use crate::record::TruckMove;
use crate::shipment::{Shipment, ShipmentState};
use crate::time::{SimDuration, SimTime};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// A stuck shipment forced to completion by timeout recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recovery {
    pub shipment: ShipmentId,
    pub truck: TruckId,
    /// State the shipment was stuck in.
    pub stuck_in: ShipmentState,
    /// Time spent in that state when recovery fired.
    pub dwell: SimDuration,
    /// The forced move to `Completed`.
    pub movement: TruckMove,
}

/// Result of [`Engine::advance_all`](crate::engine::Engine::advance_all).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvanceReport {
    /// One entry per shipment that changed state, in shipment key order.
    pub moves: Vec<TruckMove>,
    /// Shipments that reached `Completed` and left the active set.
    pub completed: Vec<ShipmentId>,
}

/// Result of [`Engine::tick`](crate::engine::Engine::tick).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub now: SimTime,
    /// Shipments created from the pending queue.
    pub drained: Vec<Shipment>,
    pub advanced: AdvanceReport,
    pub recovered: Vec<Recovery>,
    /// Queue length after the tick.
    pub queue_len: usize,
    /// Active shipments after the tick.
    pub active: usize,
}

impl TickReport {
    /// Whether the tick changed anything.
    pub fn is_idle(&self) -> bool {
        self.drained.is_empty() && self.advanced.moves.is_empty() && self.recovered.is_empty()
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A deterministic hash of engine state for determinism checks.
///
/// FNV-1a (64-bit). Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_time(&mut self, t: SimTime) {
        self.write_u64(t.as_secs());
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}
