//! Data-driven runs over the `fixtures/regional` fleet: two distribution
//! centers, five assigned trucks, one pool truck, seven stores.
//!
//! Loads the fleet from mixed RON / TOML / JSON files, drives several days of
//! reorders and sales with statistics attached, and checks the engine's
//! invariants after every tick.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use haulage_core::engine::Engine;
use haulage_core::id::*;
use haulage_core::shipment::LineItem;
use haulage_core::time::{SimDuration, SimTime};
use haulage_core::validation::audit;
use haulage_data::{FleetData, load_fleet_data};
use haulage_stats::{DispatchStats, StatsConfig, attach};
use tracing_subscriber::EnvFilter;

const STEP: SimDuration = SimDuration::from_minutes(30);
/// Reorders stop after this many hours; the run continues until the fleet
/// has worked off the backlog.
const ORDER_HOURS: u64 = 36;
const MAX_STEPS: usize = 400;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/regional")
}

fn load() -> FleetData {
    load_fleet_data(&fixture_dir()).unwrap()
}

/// Stores 1-4 reorder from DC 1, stores 5-7 from DC 2.
fn origin_for(store: u32) -> DcId {
    if store <= 4 { DcId(1) } else { DcId(2) }
}

/// Deterministic reorder and sales pattern for the instant `now`. Returns
/// the units sold.
fn drive_demand(engine: &mut Engine, now: SimTime) -> u64 {
    let hour = now.as_secs() / 3_600;
    let on_the_hour = now.as_secs() % 3_600 == 0;
    if !on_the_hour || hour >= ORDER_HOURS {
        return 0;
    }
    let mut sold = 0;
    for s in 1..=7u32 {
        let product = ProductId(s % 3);
        // Each store reorders every 6 hours, staggered by store.
        if (hour + s as u64) % 6 == 0 {
            let quantity = 200 + (s * 131 + hour as u32 * 57) % 500;
            let items = [LineItem::new(product, quantity), LineItem::new(ProductId(9), 25)];
            engine
                .request_shipment(origin_for(s), StoreId(s), &items, now)
                .unwrap();
        }
        if hour % 3 == 0
            && let Some(tx) = engine.sell(StoreId(s), product, 50, now)
        {
            sold += tx.delta.unsigned_abs();
        }
    }
    sold
}

fn stock_distribution_centers(engine: &mut Engine) {
    for dc in [DcId(1), DcId(2)] {
        for p in [0, 1, 2, 9] {
            engine.stock_dc(dc, ProductId(p), 100_000, SimTime::EPOCH);
        }
    }
}

/// Run from `start` until the fleet is idle, with demand until
/// `ORDER_HOURS` when `demand` is set. Returns the units sold.
fn run_to_idle(
    engine: &mut Engine,
    stats: &Rc<RefCell<DispatchStats>>,
    start: SimTime,
    demand: bool,
) -> u64 {
    let mut now = start;
    let mut sold = 0;
    for _ in 0..MAX_STEPS {
        now += STEP;
        if demand {
            sold += drive_demand(engine, now);
        }
        let report = engine.tick(now);
        stats.borrow_mut().end_tick(now);

        let issues = audit(engine);
        assert!(issues.is_empty(), "audit at {now}: {issues:?}");

        let demand_over = !demand || now >= SimTime::from_hours(ORDER_HOURS);
        if demand_over && report.active == 0 && report.queue_len == 0 {
            return sold;
        }
    }
    panic!("fleet still busy after {MAX_STEPS} steps");
}

// ===========================================================================
// Loading
// ===========================================================================

#[test]
fn fixture_fleet_loads() {
    let fleet = load();
    assert_eq!(fleet.distribution_centers.len(), 2);
    assert_eq!(fleet.distribution_centers[&DcId(2)], "Hillcrest");
    assert_eq!(fleet.roster.len(), 6);
    assert_eq!(fleet.roster.assigned_to(DcId(1)).count(), 3);
    assert_eq!(fleet.roster.pool().count(), 1);
    assert_eq!(fleet.roster.refrigerated_count(), 1);
    assert_eq!(fleet.roster.max_capacity(DcId(1)), Some(1000));
    assert_eq!(fleet.roster.max_capacity(DcId(2)), Some(800));
    assert_eq!(
        fleet.routes.get(DcId(2), StoreId(6)),
        Some(SimDuration::from_minutes(105))
    );
    assert_eq!(fleet.config.seed, 7);
    assert_eq!(fleet.config.travel_jitter, SimDuration::from_minutes(15));
}

// ===========================================================================
// Full run
// ===========================================================================

#[test]
fn regional_run_settles_with_consistent_stats() {
    init_tracing();
    let fleet = load();
    let truck_ids: Vec<TruckId> = fleet.roster.iter().map(|t| t.id).collect();
    let mut engine = fleet.into_engine();
    stock_distribution_centers(&mut engine);

    let stats = Rc::new(RefCell::new(DispatchStats::new(StatsConfig::default())));
    attach(&mut engine.event_bus, &stats);

    let sold = run_to_idle(&mut engine, &stats, SimTime::EPOCH, true);

    assert_eq!(engine.active_count(), 0);
    assert_eq!(engine.queue_len(), 0);

    let stats = stats.borrow();
    assert!(stats.total_dispatched() > 0);
    assert_eq!(stats.total_completed(), stats.total_dispatched());
    assert_eq!(stats.recoveries(), 0);
    assert_eq!(stats.truncations(), 0);
    assert_eq!(stats.queue_len(), 0);

    let trips: u64 = truck_ids.iter().map(|&t| stats.trips(t)).sum();
    assert_eq!(trips, stats.total_dispatched());
    for &t in &truck_ids {
        assert!(stats.utilization(t) <= haulage_core::time::Fixed64::ONE);
    }

    for s in 1..=7 {
        for p in [0, 1, 2, 9] {
            assert!(engine.ledger().store_balance(StoreId(s), ProductId(p)) >= 0);
        }
    }
    // Every unit that left a DC is either on a store shelf or sold.
    let dc_out: i64 = [DcId(1), DcId(2)]
        .iter()
        .map(|&dc| 4 * 100_000 - engine.ledger().dc_book().location_total(dc))
        .sum();
    let on_shelves: i64 = (1..=7)
        .map(|s| engine.ledger().store_book().location_total(StoreId(s)))
        .sum();
    assert!(dc_out > 0);
    assert_eq!(dc_out, on_shelves + sold as i64);
}

#[test]
fn busy_fleet_builds_a_backlog() {
    let mut engine = load().into_engine();
    let stats = Rc::new(RefCell::new(DispatchStats::new(StatsConfig::default())));
    attach(&mut engine.event_bus, &stats);

    // Three large requests at once against DC 2's two trucks plus the pool.
    let now = SimTime::from_hours(1);
    for s in 5..=7u32 {
        engine
            .request_shipment(DcId(2), StoreId(s), &[LineItem::new(ProductId(1), 1_100)], now)
            .unwrap();
    }
    engine.tick(now);
    stats.borrow_mut().end_tick(now);

    // Store 5 fills 201 and part of 202, store 6 takes the pool truck and
    // queues 500; store 7 queues behind it as 800 + 300.
    assert_eq!(engine.active_count(), 3);
    assert_eq!(engine.queue_len_for(DcId(2)), 3);
    assert_eq!(engine.queue().queued_quantity(), 1_600);
    assert_eq!(stats.borrow().peak_queue_len(), 3);

    run_to_idle(&mut engine, &stats, now, false);
    let stats = stats.borrow();
    assert!(stats.total_dispatched() >= 6);
    assert_eq!(stats.truncations(), 0);
    assert!(stats.mean_queue_wait().is_some_and(|w| w > SimDuration::ZERO));
    for s in 5..=7 {
        assert_eq!(engine.ledger().store_balance(StoreId(s), ProductId(1)), 1_100);
    }
}

// ===========================================================================
// Determinism
// ===========================================================================

#[test]
fn identical_fleets_stay_identical() {
    let mut a = load().into_engine();
    let mut b = load().into_engine();
    stock_distribution_centers(&mut a);
    stock_distribution_centers(&mut b);

    let mut now = SimTime::EPOCH;
    for _ in 0..96 {
        now += STEP;
        drive_demand(&mut a, now);
        drive_demand(&mut b, now);
        a.tick(now);
        b.tick(now);
        assert_eq!(a.state_hash(), b.state_hash(), "diverged at {now}");
    }
}

#[test]
fn snapshot_midway_continues_identically() {
    let mut original = load().into_engine();
    stock_distribution_centers(&mut original);

    let mut now = SimTime::EPOCH;
    for _ in 0..40 {
        now += STEP;
        drive_demand(&mut original, now);
        original.tick(now);
    }

    let bytes = original.serialize().unwrap();
    let mut restored = Engine::deserialize(&bytes).unwrap();
    assert_eq!(restored.state_hash(), original.state_hash());
    assert_eq!(restored.routes().len(), 7);

    for _ in 0..60 {
        now += STEP;
        drive_demand(&mut original, now);
        drive_demand(&mut restored, now);
        original.tick(now);
        restored.tick(now);
        assert_eq!(restored.state_hash(), original.state_hash(), "diverged at {now}");
    }
}
