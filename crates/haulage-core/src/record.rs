//! Plain records handed to export and persistence code.
//!
//! These carry no behavior. Exporters receive them through engine return
//! values or through [`crate::event::Event`] listeners and write one fact row
//! per record.

use crate::id::{DcId, ShipmentId, StoreId, TruckId};
use crate::shipment::{LineItem, ShipmentState};
use crate::time::SimTime;
use serde::{Deserialize, Serialize};

/// A single observed lifecycle transition: the truck-move fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruckMove {
    pub shipment: ShipmentId,
    pub truck: TruckId,
    pub origin: DcId,
    pub destination: StoreId,
    pub from: ShipmentState,
    pub to: ShipmentState,
    pub at: SimTime,
    /// Set when timeout recovery forced the move.
    pub forced: bool,
}

/// Export view of a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRecord {
    pub shipment: ShipmentId,
    pub truck: TruckId,
    pub origin: DcId,
    pub destination: StoreId,
    pub line_items: Vec<LineItem>,
    pub requested_departure: SimTime,
    pub loading_start: SimTime,
    pub estimated_arrival: SimTime,
    pub estimated_departure: SimTime,
    pub state: ShipmentState,
}

impl ShipmentRecord {
    pub fn total_quantity(&self) -> u64 {
        crate::shipment::total_quantity(&self.line_items)
    }
}
