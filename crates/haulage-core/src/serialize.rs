//! Binary snapshots of the engine via `bitcode` with a versioned header.
//!
//! A snapshot holds everything that affects future behavior: roster, routes,
//! configuration, availability, rotation cursors, the pending queue, active
//! shipments, balances, the RNG state and the clock. Event listeners hold
//! closures and are not persisted; re-register them after restoring.

use crate::availability::TruckAvailability;
use crate::config::{EngineConfig, RouteTable};
use crate::dispatch::RotationCursors;
use crate::engine::Engine;
use crate::event::EventBus;
use crate::id::ShipmentId;
use crate::ledger::InventoryLedger;
use crate::queue::PendingQueue;
use crate::rng::SimRng;
use crate::roster::TruckRoster;
use crate::shipment::Shipment;
use crate::time::SimTime;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

/// Magic number identifying a haulage engine snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x4841_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

/// Prepended to every snapshot for format detection and version checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Engine clock when the snapshot was taken.
    pub clock: SimTime,
}

impl SnapshotHeader {
    pub fn new(clock: SimTime) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            clock,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

/// Read the header of a snapshot. bitcode has no partial decode, so this
/// decodes the whole payload.
pub fn read_snapshot_header(data: &[u8]) -> Result<SnapshotHeader, DeserializeError> {
    let snapshot: EngineSnapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    Ok(snapshot.header)
}

/// The serializable portion of the engine. Excludes the event bus.
#[derive(Debug, Serialize, Deserialize)]
struct EngineSnapshot {
    header: SnapshotHeader,
    config: EngineConfig,
    roster: TruckRoster,
    routes: RouteTable,
    availability: TruckAvailability,
    cursors: RotationCursors,
    queue: PendingQueue,
    shipments: SlotMap<ShipmentId, Shipment>,
    ledger: InventoryLedger,
    rng: SimRng,
    last_drain: Option<SimTime>,
}

impl Engine {
    /// Serialize the engine to a binary blob.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        let snapshot = EngineSnapshot {
            header: SnapshotHeader::new(self.clock),
            config: self.config.clone(),
            roster: self.roster.clone(),
            routes: self.routes.clone(),
            availability: self.availability.clone(),
            cursors: self.cursors.clone(),
            queue: self.queue.clone(),
            shipments: self.shipments.clone(),
            ledger: self.ledger.clone(),
            rng: self.rng.clone(),
            last_drain: self.last_drain,
        };
        bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Restore an engine from a blob produced by [`Engine::serialize`].
    ///
    /// The event bus is recreated empty with the snapshot's configured
    /// capacity; listeners must be registered again.
    pub fn deserialize(data: &[u8]) -> Result<Self, DeserializeError> {
        let snapshot: EngineSnapshot =
            bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;

        Ok(Engine {
            event_bus: EventBus::new(snapshot.config.event_buffer_capacity),
            config: snapshot.config,
            roster: snapshot.roster,
            routes: snapshot.routes,
            availability: snapshot.availability,
            cursors: snapshot.cursors,
            queue: snapshot.queue,
            shipments: snapshot.shipments,
            ledger: snapshot.ledger,
            rng: snapshot.rng,
            clock: snapshot.header.clock,
            last_drain: snapshot.last_drain,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{DcId, ProductId, StoreId, TruckId};
    use crate::roster::Truck;
    use crate::shipment::LineItem;
    use crate::time::SimDuration;

    fn busy_engine() -> Engine {
        let roster = TruckRoster::from_trucks([
            Truck::assigned(TruckId(1), DcId(1), 100),
            Truck::pool(TruckId(9), 100),
        ])
        .unwrap();
        let config = EngineConfig {
            travel_jitter: SimDuration::from_minutes(20),
            seed: 7,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(roster, config);
        engine.stock_dc(DcId(1), ProductId(1), 1_000, SimTime::EPOCH);
        engine
            .request_shipment(
                DcId(1),
                StoreId(2),
                &[LineItem::new(ProductId(1), 250)],
                SimTime::from_hours(1),
            )
            .unwrap();
        engine
    }

    #[test]
    fn round_trip_preserves_state_hash() {
        let engine = busy_engine();
        let bytes = engine.serialize().unwrap();
        let restored = Engine::deserialize(&bytes).unwrap();
        assert_eq!(engine.state_hash(), restored.state_hash());
        assert_eq!(restored.queue_len(), engine.queue_len());
        assert_eq!(restored.active_count(), engine.active_count());
    }

    #[test]
    fn restored_engine_continues_identically() {
        let mut original = busy_engine();
        let mut restored = Engine::deserialize(&original.serialize().unwrap()).unwrap();

        for hour in 2..40 {
            let now = SimTime::from_hours(hour);
            original.tick(now);
            restored.tick(now);
            assert_eq!(original.state_hash(), restored.state_hash(), "diverged at {now}");
        }
    }

    #[test]
    fn header_reports_clock() {
        let engine = busy_engine();
        let header = read_snapshot_header(&engine.serialize().unwrap()).unwrap();
        assert_eq!(header.clock, SimTime::from_hours(1));
        assert_eq!(header.magic, SNAPSHOT_MAGIC);
    }

    #[test]
    fn bad_magic_and_versions_are_rejected() {
        let mut header = SnapshotHeader::new(SimTime::EPOCH);
        header.magic = 0xDEAD_BEEF;
        assert!(matches!(header.validate(), Err(DeserializeError::InvalidMagic(0xDEAD_BEEF))));

        let mut header = SnapshotHeader::new(SimTime::EPOCH);
        header.version = FORMAT_VERSION + 1;
        assert!(matches!(header.validate(), Err(DeserializeError::FutureVersion(_))));

        let mut header = SnapshotHeader::new(SimTime::EPOCH);
        header.version = 0;
        assert!(matches!(header.validate(), Err(DeserializeError::UnsupportedVersion(0))));
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(matches!(
            Engine::deserialize(&[1, 2, 3]),
            Err(DeserializeError::Decode(_))
        ));
    }
}
