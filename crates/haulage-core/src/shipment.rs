//! Shipments and their lifecycle state machine.
//!
//! A shipment moves through a fixed, strictly ordered lifecycle:
//!
//! ```text
//! Scheduled -> Loading -> InTransit -> Arrived -> Unloading -> Completed
//! ```
//!
//! [`ShipmentState::next`] is the single source of truth for transition
//! validity. The engine advances a shipment at most one state per call; the
//! only way to skip ahead is [`Shipment::force_complete`], reserved for
//! timeout recovery.

use crate::id::{DcId, ProductId, ShipmentId, StoreId, TruckId};
use crate::record::{ShipmentRecord, TruckMove};
use crate::time::{SimDuration, SimTime};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Line items
// ---------------------------------------------------------------------------

/// One product line of a shipment or request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineItem {
    pub product: ProductId,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(product: ProductId, quantity: u32) -> Self {
        Self { product, quantity }
    }
}

/// Sum of quantities across line items. Widened so large requests cannot wrap.
pub fn total_quantity(items: &[LineItem]) -> u64 {
    items.iter().map(|item| item.quantity as u64).sum()
}

// ---------------------------------------------------------------------------
// Lifecycle state
// ---------------------------------------------------------------------------

/// Lifecycle state of a shipment. Variant order is the lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ShipmentState {
    Scheduled,
    Loading,
    InTransit,
    Arrived,
    Unloading,
    Completed,
}

/// Total number of lifecycle states.
pub const STATE_COUNT: usize = 6;

impl ShipmentState {
    /// Every state in lifecycle order.
    pub const ALL: [ShipmentState; STATE_COUNT] = [
        ShipmentState::Scheduled,
        ShipmentState::Loading,
        ShipmentState::InTransit,
        ShipmentState::Arrived,
        ShipmentState::Unloading,
        ShipmentState::Completed,
    ];

    /// The single state that may follow this one, if any.
    pub fn next(self) -> Option<ShipmentState> {
        match self {
            ShipmentState::Scheduled => Some(ShipmentState::Loading),
            ShipmentState::Loading => Some(ShipmentState::InTransit),
            ShipmentState::InTransit => Some(ShipmentState::Arrived),
            ShipmentState::Arrived => Some(ShipmentState::Unloading),
            ShipmentState::Unloading => Some(ShipmentState::Completed),
            ShipmentState::Completed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ShipmentState::Completed
    }

    /// Transient states are entered on the first call after their
    /// predecessor's trigger has passed, with no trigger of their own.
    pub fn is_transient(self) -> bool {
        matches!(self, ShipmentState::InTransit | ShipmentState::Unloading)
    }

    pub fn can_transition_to(self, to: ShipmentState) -> bool {
        self.next() == Some(to)
    }

    /// Check a proposed transition against the lifecycle order.
    pub fn validate_transition(self, to: ShipmentState) -> Result<(), TransitionError> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(TransitionError { from: self, to })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShipmentState::Scheduled => "scheduled",
            ShipmentState::Loading => "loading",
            ShipmentState::InTransit => "in_transit",
            ShipmentState::Arrived => "arrived",
            ShipmentState::Unloading => "unloading",
            ShipmentState::Completed => "completed",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for ShipmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transition outside the lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid shipment transition {from} -> {to}")]
pub struct TransitionError {
    pub from: ShipmentState,
    pub to: ShipmentState,
}

/// Errors from operations addressed to a single shipment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShipmentError {
    #[error("shipment {0:?} is not active")]
    Unknown(ShipmentId),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Instants computed when a truck is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentTiming {
    /// Instant the truck was assigned. Equals the requested departure for
    /// direct dispatch; the drain instant for queued requests.
    pub departure: SimTime,
    pub loading_start: SimTime,
    pub estimated_arrival: SimTime,
    /// Departure from the store once unloading finishes.
    pub estimated_departure: SimTime,
    /// When the truck is back and free for another shipment.
    pub truck_free_at: SimTime,
}

// ---------------------------------------------------------------------------
// Shipment
// ---------------------------------------------------------------------------

/// A dispatched shipment. Created by the dispatcher; mutated only by the
/// state machine methods below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    id: ShipmentId,
    origin: DcId,
    destination: StoreId,
    truck: TruckId,
    line_items: Vec<LineItem>,
    requested_departure: SimTime,
    timing: ShipmentTiming,
    state: ShipmentState,
    /// Entry instant per state, indexed by lifecycle position.
    entered_at: [Option<SimTime>; STATE_COUNT],
    /// Instant of the most recent `advance` call, for no-op detection.
    last_advanced: Option<SimTime>,
}

impl Shipment {
    pub(crate) fn new(
        id: ShipmentId,
        origin: DcId,
        destination: StoreId,
        truck: TruckId,
        line_items: Vec<LineItem>,
        requested_departure: SimTime,
        timing: ShipmentTiming,
    ) -> Self {
        let mut entered_at = [None; STATE_COUNT];
        entered_at[ShipmentState::Scheduled.index()] = Some(timing.departure);
        Self {
            id,
            origin,
            destination,
            truck,
            line_items,
            requested_departure,
            timing,
            state: ShipmentState::Scheduled,
            entered_at,
            last_advanced: None,
        }
    }

    pub fn id(&self) -> ShipmentId {
        self.id
    }

    pub fn origin(&self) -> DcId {
        self.origin
    }

    pub fn destination(&self) -> StoreId {
        self.destination
    }

    pub fn truck(&self) -> TruckId {
        self.truck
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn total_quantity(&self) -> u64 {
        total_quantity(&self.line_items)
    }

    pub fn requested_departure(&self) -> SimTime {
        self.requested_departure
    }

    pub fn timing(&self) -> &ShipmentTiming {
        &self.timing
    }

    pub fn state(&self) -> ShipmentState {
        self.state
    }

    /// Instant the shipment entered `state`, if it ever did.
    pub fn entered_at(&self, state: ShipmentState) -> Option<SimTime> {
        self.entered_at[state.index()]
    }

    /// Time spent so far in the current state.
    pub fn dwell(&self, now: SimTime) -> SimDuration {
        self.entered_at(self.state)
            .map(|entered| now.saturating_since(entered))
            .unwrap_or(SimDuration::ZERO)
    }

    /// Earliest instant at which `state` may be entered.
    pub fn trigger_for(&self, state: ShipmentState) -> SimTime {
        match state {
            ShipmentState::Scheduled => self.timing.departure,
            ShipmentState::Loading | ShipmentState::InTransit => self.timing.loading_start,
            ShipmentState::Arrived | ShipmentState::Unloading => self.timing.estimated_arrival,
            ShipmentState::Completed => self.timing.estimated_departure,
        }
    }

    /// Export view of the shipment.
    pub fn record(&self) -> ShipmentRecord {
        ShipmentRecord {
            shipment: self.id,
            truck: self.truck,
            origin: self.origin,
            destination: self.destination,
            line_items: self.line_items.clone(),
            requested_departure: self.requested_departure,
            loading_start: self.timing.loading_start,
            estimated_arrival: self.timing.estimated_arrival,
            estimated_departure: self.timing.estimated_departure,
            state: self.state,
        }
    }

    /// Move at most one state forward if `now` has reached the next state's
    /// trigger. A call with an instant no later than the previous call is a
    /// no-op.
    pub(crate) fn advance(&mut self, now: SimTime) -> Option<TruckMove> {
        if let Some(last) = self.last_advanced
            && now <= last
        {
            return None;
        }
        self.last_advanced = Some(now);

        let next = self.state.next()?;
        if now < self.trigger_for(next) {
            return None;
        }
        Some(self.enter(next, now, false))
    }

    /// Apply an explicit transition, rejecting anything but the next state.
    pub(crate) fn transition_to(
        &mut self,
        to: ShipmentState,
        at: SimTime,
    ) -> Result<TruckMove, TransitionError> {
        self.state.validate_transition(to)?;
        Ok(self.enter(to, at, false))
    }

    /// Jump straight to `Completed`, bypassing single-step advancement.
    /// Returns `None` if the shipment is already complete.
    pub(crate) fn force_complete(&mut self, at: SimTime) -> Option<TruckMove> {
        if self.state.is_terminal() {
            return None;
        }
        Some(self.enter(ShipmentState::Completed, at, true))
    }

    fn enter(&mut self, to: ShipmentState, at: SimTime, forced: bool) -> TruckMove {
        let from = self.state;
        self.state = to;
        self.entered_at[to.index()] = Some(at);
        TruckMove {
            shipment: self.id,
            truck: self.truck,
            origin: self.origin,
            destination: self.destination,
            from,
            to,
            at,
            forced,
        }
    }
}
