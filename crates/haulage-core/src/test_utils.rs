//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::event::{Event, EventKind};
use crate::id::*;
use crate::roster::{RosterBuilder, Truck, TruckRoster};
use crate::shipment::LineItem;
use crate::time::{SimDuration, SimTime};
use std::cell::RefCell;
use std::rc::Rc;

// ===========================================================================
// Id constructors
// ===========================================================================

pub fn dc(n: u32) -> DcId {
    DcId(n)
}

pub fn store(n: u32) -> StoreId {
    StoreId(n)
}

pub fn truck(n: u32) -> TruckId {
    TruckId(n)
}

pub fn product(n: u32) -> ProductId {
    ProductId(n)
}

// ===========================================================================
// Time
// ===========================================================================

pub fn at_hours(h: u64) -> SimTime {
    SimTime::from_hours(h)
}

pub fn at_minutes(m: u64) -> SimTime {
    SimTime::from_minutes(m)
}

// ===========================================================================
// Line items
// ===========================================================================

/// A single-line request.
pub fn line(product_id: u32, quantity: u32) -> Vec<LineItem> {
    vec![LineItem::new(ProductId(product_id), quantity)]
}

/// A multi-line request from `(product, quantity)` pairs.
pub fn lines(pairs: &[(u32, u32)]) -> Vec<LineItem> {
    pairs
        .iter()
        .map(|&(p, q)| LineItem::new(ProductId(p), q))
        .collect()
}

// ===========================================================================
// Fleet builders
// ===========================================================================

/// A roster where every truck has the same capacity. `assigned` lists
/// `(dc, truck)` pairs in rotation order; `pool` lists pool truck ids.
pub fn uniform_roster(assigned: &[(u32, u32)], pool: &[u32], capacity: u32) -> TruckRoster {
    let mut builder = RosterBuilder::new();
    for &(dc_id, t) in assigned {
        builder
            .add(Truck::assigned(TruckId(t), DcId(dc_id), capacity))
            .unwrap();
    }
    for &t in pool {
        builder.add(Truck::pool(TruckId(t), capacity)).unwrap();
    }
    builder.build()
}

/// An engine with default configuration over a uniform roster.
pub fn engine_with_fleet(assigned: &[(u32, u32)], pool: &[u32], capacity: u32) -> Engine {
    Engine::new(uniform_roster(assigned, pool, capacity), EngineConfig::default())
}

/// Single DC 1 with one truck 101 of capacity 1000.
pub fn single_truck_engine() -> Engine {
    engine_with_fleet(&[(1, 101)], &[], 1000)
}

// ===========================================================================
// Driving
// ===========================================================================

/// Step size used by [`run_until_stable`].
pub const STEP: SimDuration = SimDuration::from_minutes(15);

/// Tick every [`STEP`] from `start` until no shipment is active and the queue
/// is empty, or `max_steps` ticks have run. Returns the last instant ticked.
pub fn run_until_stable(engine: &mut Engine, start: SimTime, max_steps: usize) -> SimTime {
    let mut now = start;
    for _ in 0..max_steps {
        now += STEP;
        engine.tick(now);
        if engine.active_count() == 0 && engine.queue_len() == 0 {
            break;
        }
    }
    now
}

// ===========================================================================
// Event capture
// ===========================================================================

/// Record every delivered event of `kind`.
pub fn capture(engine: &mut Engine, kind: EventKind) -> Rc<RefCell<Vec<Event>>> {
    let sink = Rc::new(RefCell::new(Vec::new()));
    let writer = sink.clone();
    engine
        .event_bus
        .on_passive(kind, Box::new(move |event| writer.borrow_mut().push(event.clone())));
    sink
}
