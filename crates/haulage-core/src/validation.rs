//! Invariant audit over a live engine.
//!
//! [`audit`] walks the engine's state and reports every broken invariant it
//! finds. A healthy engine always yields an empty list; tests and long
//! simulation runs call it after each step to catch drift early.

use crate::engine::Engine;
use crate::id::{ProductId, ShipmentId, StoreId, TruckId};
use crate::time::SimTime;

/// A single broken invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditIssue {
    /// A shipment carries more than its truck can hold.
    CapacityExceeded {
        shipment: ShipmentId,
        truck: TruckId,
        quantity: u64,
        capacity: u32,
    },
    /// A shipment references a truck the roster does not know.
    UnknownTruck { shipment: ShipmentId, truck: TruckId },
    /// A store holds negative stock.
    NegativeStoreBalance {
        store: StoreId,
        product: ProductId,
        balance: i64,
    },
    /// A completed shipment was left in the active set.
    TerminalShipmentActive { shipment: ShipmentId },
    /// A truck is marked free before the shipment it carries returns.
    TruckFreedEarly {
        truck: TruckId,
        shipment: ShipmentId,
        next_free: SimTime,
        returns_at: SimTime,
    },
}

/// Check every engine invariant. Empty means healthy.
pub fn audit(engine: &Engine) -> Vec<AuditIssue> {
    let mut issues = Vec::new();

    for shipment in engine.shipments() {
        let id = shipment.id();
        let truck = shipment.truck();

        match engine.roster().get(truck) {
            Some(t) if shipment.total_quantity() > t.capacity as u64 => {
                issues.push(AuditIssue::CapacityExceeded {
                    shipment: id,
                    truck,
                    quantity: shipment.total_quantity(),
                    capacity: t.capacity,
                });
            }
            Some(_) => {}
            None => issues.push(AuditIssue::UnknownTruck { shipment: id, truck }),
        }

        if shipment.state().is_terminal() {
            issues.push(AuditIssue::TerminalShipmentActive { shipment: id });
        }

        let next_free = engine.availability().next_free(truck);
        let returns_at = shipment.timing().truck_free_at;
        if next_free < returns_at {
            issues.push(AuditIssue::TruckFreedEarly {
                truck,
                shipment: id,
                next_free,
                returns_at,
            });
        }
    }

    for (store, product, balance) in engine.ledger().store_book().iter() {
        if balance < 0 {
            issues.push(AuditIssue::NegativeStoreBalance {
                store,
                product,
                balance,
            });
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn healthy_engine_has_no_issues() {
        let mut engine = engine_with_fleet(&[(1, 101), (1, 102)], &[900], 1000);
        engine
            .request_shipment(dc(1), store(1), &line(1, 2_500), at_hours(1))
            .unwrap();
        run_until_stable(&mut engine, at_hours(1), 60);
        assert!(audit(&engine).is_empty());
    }

    #[test]
    fn in_flight_shipments_pass() {
        let mut engine = engine_with_fleet(&[(1, 101)], &[], 500);
        engine
            .request_shipment(dc(1), store(3), &line(2, 400), at_hours(0))
            .unwrap();
        engine.tick(at_hours(3));
        assert_eq!(engine.active_count(), 1);
        assert!(audit(&engine).is_empty());
    }
}
