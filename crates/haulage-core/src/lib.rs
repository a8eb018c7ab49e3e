//! Haulage Core -- the truck dispatch engine and inventory-balance simulator.
//!
//! Turns reorder requests into truck shipments from distribution centers to
//! stores, queues requests when the fleet is busy, walks each shipment
//! through its lifecycle as simulated time advances, and keeps distribution
//! center and store balances in step with the goods that move.
//!
//! # Lifecycle
//!
//! ```text
//! Scheduled -> Loading -> InTransit -> Arrived -> Unloading -> Completed
//! ```
//!
//! A shipment moves at most one state per [`engine::Engine::advance`] call,
//! however far the clock jumps. Reaching `Completed` credits the store and
//! removes the shipment. Shipments stuck past the dwell ceiling are forced to
//! completion by [`engine::Engine::check_timeout`].
//!
//! # Example
//!
//! ```rust,ignore
//! let roster = TruckRoster::from_trucks([
//!     Truck::assigned(TruckId(101), DcId(1), 1000),
//!     Truck::assigned(TruckId(102), DcId(1), 1000),
//! ])?;
//! let mut engine = Engine::new(roster, EngineConfig::default());
//! let outcomes = engine.request_shipment(
//!     DcId(1),
//!     StoreId(7),
//!     &[LineItem::new(ProductId(3), 1500)],
//!     SimTime::from_hours(8),
//! )?;
//! assert_eq!(outcomes.len(), 2);
//! engine.tick(SimTime::from_hours(10));
//! ```
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- owns all state; dispatch, drain, advance, recover.
//! - [`roster::TruckRoster`] -- immutable fleet arena with per-DC and pool indexes.
//! - [`dispatch`] -- round-robin selection and capacity splitting.
//! - [`queue::PendingQueue`] -- backlog ordered by requested departure.
//! - [`shipment::Shipment`] -- the lifecycle state machine.
//! - [`ledger::InventoryLedger`] -- distribution-center and store balances.
//! - [`event::EventBus`] -- buffered engine events for exporters and metrics.
//! - [`serialize`] -- versioned snapshots via bitcode.

pub mod availability;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod event;
pub mod id;
pub mod ledger;
pub mod queue;
pub mod record;
pub mod rng;
pub mod roster;
pub mod serialize;
pub mod shipment;
pub mod sim;
pub mod time;
pub mod timing;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
