//! Property-based tests for the haulage core engine.
//!
//! Uses proptest to generate random fleets, requests and clock progressions,
//! then verify the engine's invariants hold.

use haulage_core::config::EngineConfig;
use haulage_core::dispatch::split_line_items;
use haulage_core::engine::Engine;
use haulage_core::id::*;
use haulage_core::roster::{Truck, TruckRoster};
use haulage_core::shipment::{LineItem, ShipmentState, total_quantity};
use haulage_core::test_utils::*;
use haulage_core::time::{SimDuration, SimTime};
use haulage_core::validation::audit;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

fn arb_line_items(max_lines: usize) -> impl Strategy<Value = Vec<LineItem>> {
    proptest::collection::vec(
        (0..6u32, 0..3_000u32).prop_map(|(p, q)| LineItem::new(ProductId(p), q)),
        0..=max_lines,
    )
}

/// DC 1 with 1-3 assigned trucks plus 0-2 pool trucks, mixed capacities.
fn arb_roster() -> impl Strategy<Value = TruckRoster> {
    (
        proptest::collection::vec(50..1_500u32, 1..=3),
        proptest::collection::vec(50..1_500u32, 0..=2),
    )
        .prop_map(|(assigned, pool)| {
            let assigned = assigned
                .into_iter()
                .enumerate()
                .map(|(i, cap)| Truck::assigned(TruckId(100 + i as u32), DcId(1), cap));
            let pool = pool
                .into_iter()
                .enumerate()
                .map(|(i, cap)| Truck::pool(TruckId(900 + i as u32), cap));
            TruckRoster::from_trucks(assigned.chain(pool)).unwrap()
        })
}

/// Strictly increasing gaps between advance calls, up to 20h.
fn arb_gaps(max: usize) -> impl Strategy<Value = Vec<u64>> {
    proptest::collection::vec(1..72_000u64, 1..=max)
}

#[derive(Debug, Clone)]
enum InvOp {
    Stock(u32, u32),
    Sell(u32, u32),
}

fn arb_inventory_ops(max: usize) -> impl Strategy<Value = Vec<InvOp>> {
    proptest::collection::vec(
        prop_oneof![
            (0..4u32, 0..500u32).prop_map(|(p, q)| InvOp::Stock(p, q)),
            (0..4u32, 0..800u32).prop_map(|(p, q)| InvOp::Sell(p, q)),
        ],
        1..=max,
    )
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Splitting never loses or invents units and never exceeds capacity.
    #[test]
    fn split_is_lossless_and_bounded(items in arb_line_items(8), capacity in 1..2_000u32) {
        let chunks = split_line_items(&items, capacity);
        let split_total: u64 = chunks.iter().map(|c| total_quantity(c)).sum();
        prop_assert_eq!(split_total, total_quantity(&items));
        for chunk in &chunks {
            prop_assert!(!chunk.is_empty());
            prop_assert!(total_quantity(chunk) <= capacity as u64);
            prop_assert!(chunk.iter().all(|line| line.quantity > 0));
        }
    }

    /// Every chunk of a request fits the truck it lands on, and the chunks
    /// add up to the request whether they were dispatched or queued.
    #[test]
    fn request_respects_truck_capacity(roster in arb_roster(), items in arb_line_items(5)) {
        let mut engine = Engine::new(roster, EngineConfig::default());
        let outcomes = engine
            .request_shipment(DcId(1), StoreId(1), &items, SimTime::from_hours(1))
            .unwrap();

        let produced: u64 = outcomes.iter().map(|o| total_quantity(o.line_items())).sum();
        prop_assert_eq!(produced, total_quantity(&items));

        for shipment in engine.shipments() {
            let capacity = engine.roster().get(shipment.truck()).unwrap().capacity;
            prop_assert!(shipment.total_quantity() <= capacity as u64);
        }
        prop_assert!(audit(&engine).is_empty());
    }

    /// States are visited in lifecycle order, one per call at most, no
    /// matter how far the clock jumps between calls.
    #[test]
    fn lifecycle_is_ordered_and_single_step(gaps in arb_gaps(40)) {
        let mut engine = single_truck_engine();
        let outcomes = engine
            .request_shipment(dc(1), store(1), &line(1, 300), SimTime::EPOCH)
            .unwrap();
        let id = outcomes[0].shipment().unwrap().id();

        let mut state = ShipmentState::Scheduled;
        let mut now = SimTime::EPOCH;
        for gap in gaps {
            now += SimDuration::from_secs(gap);
            let Ok(result) = engine.advance(id, now) else {
                // Completed and removed on an earlier call.
                prop_assert_eq!(state, ShipmentState::Completed);
                break;
            };
            if let Some(movement) = result {
                prop_assert_eq!(movement.from, state);
                prop_assert_eq!(Some(movement.to), state.next());
                state = movement.to;
            }
        }
    }

    /// Advancing twice at the same instant changes nothing the second time.
    #[test]
    fn advance_is_idempotent(offset in 0..100_000u64) {
        let mut engine = single_truck_engine();
        let outcomes = engine
            .request_shipment(dc(1), store(1), &line(1, 10), SimTime::EPOCH)
            .unwrap();
        let id = outcomes[0].shipment().unwrap().id();
        let now = SimTime::from_secs(offset);

        let _ = engine.advance(id, now).unwrap();
        let hash = engine.state_hash();
        prop_assert_eq!(engine.advance(id, now).unwrap(), None);
        prop_assert_eq!(engine.state_hash(), hash);
    }

    /// No sequence of sales drives a store below zero.
    #[test]
    fn store_balances_never_negative(ops in arb_inventory_ops(30)) {
        let mut engine = single_truck_engine();
        let mut now = SimTime::EPOCH;
        for op in ops {
            now += SimDuration::from_minutes(5);
            match op {
                InvOp::Stock(p, q) => {
                    engine.stock_store(store(1), product(p), q, now);
                }
                InvOp::Sell(p, q) => {
                    if let Some(tx) = engine.sell(store(1), product(p), q, now) {
                        prop_assert!(tx.balance >= 0);
                        prop_assert!(tx.delta < 0);
                    }
                }
            }
            for p in 0..4 {
                prop_assert!(engine.ledger().store_balance(store(1), product(p)) >= 0);
            }
        }
    }

    /// Two engines fed the same inputs stay bit-for-bit identical, and a
    /// snapshot taken midway continues identically too.
    #[test]
    fn runs_are_deterministic(
        seed in any::<u64>(),
        requests in proptest::collection::vec((1..4u32, 1..2_500u32, 0..12u64), 1..8),
    ) {
        let config = EngineConfig {
            seed,
            travel_jitter: SimDuration::from_minutes(45),
            ..EngineConfig::default()
        };
        let build = || Engine::new(uniform_roster(&[(1, 101), (1, 102)], &[900], 1_000), config.clone());
        let mut a = build();
        let mut b = build();

        for &(store_id, qty, hour) in &requests {
            let at = SimTime::from_hours(hour);
            a.request_shipment(dc(1), store(store_id), &line(1, qty), at).unwrap();
            b.request_shipment(dc(1), store(store_id), &line(1, qty), at).unwrap();
        }
        prop_assert_eq!(a.state_hash(), b.state_hash());

        let mut c = Engine::deserialize(&a.serialize().unwrap()).unwrap();
        for hour in 1..48 {
            let now = SimTime::from_hours(hour);
            a.tick(now);
            b.tick(now);
            c.tick(now);
            prop_assert_eq!(a.state_hash(), b.state_hash());
            prop_assert_eq!(a.state_hash(), c.state_hash());
        }
    }
}
