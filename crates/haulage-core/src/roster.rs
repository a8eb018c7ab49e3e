//! The truck roster: an immutable arena of trucks with per-distribution-center
//! and pool indexes.
//!
//! Built once at startup through [`RosterBuilder`] and never mutated while the
//! simulation runs. Round-robin selection state lives elsewhere
//! ([`crate::dispatch::RotationCursors`]); the roster only answers "which
//! trucks may serve this distribution center, in what order".

use crate::id::{DcId, TruckId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A truck in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Truck {
    pub id: TruckId,
    /// Home distribution center. `None` marks a pool truck usable by any DC.
    pub home_dc: Option<DcId>,
    /// Maximum items carried per shipment.
    pub capacity: u32,
    pub refrigerated: bool,
}

impl Truck {
    /// A dry-goods truck based at `dc`.
    pub fn assigned(id: TruckId, dc: DcId, capacity: u32) -> Self {
        Self {
            id,
            home_dc: Some(dc),
            capacity,
            refrigerated: false,
        }
    }

    /// A dry-goods pool truck.
    pub fn pool(id: TruckId, capacity: u32) -> Self {
        Self {
            id,
            home_dc: None,
            capacity,
            refrigerated: false,
        }
    }

    pub fn with_refrigeration(mut self) -> Self {
        self.refrigerated = true;
        self
    }

    pub fn is_pool(&self) -> bool {
        self.home_dc.is_none()
    }
}

/// Errors raised while building a roster.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    #[error("truck {0} registered twice")]
    DuplicateTruck(TruckId),
    #[error("truck {0} has zero capacity")]
    ZeroCapacity(TruckId),
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects trucks, then freezes them into a [`TruckRoster`].
#[derive(Debug, Default)]
pub struct RosterBuilder {
    trucks: Vec<Truck>,
    by_id: BTreeMap<TruckId, usize>,
}

impl RosterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a truck. Registration order is the rotation order within
    /// each distribution center and within the pool.
    pub fn add(&mut self, truck: Truck) -> Result<&mut Self, RosterError> {
        if self.by_id.contains_key(&truck.id) {
            return Err(RosterError::DuplicateTruck(truck.id));
        }
        if truck.capacity == 0 {
            return Err(RosterError::ZeroCapacity(truck.id));
        }
        self.by_id.insert(truck.id, self.trucks.len());
        self.trucks.push(truck);
        Ok(self)
    }

    /// Register every truck from an iterator, stopping at the first error.
    pub fn extend(
        &mut self,
        trucks: impl IntoIterator<Item = Truck>,
    ) -> Result<&mut Self, RosterError> {
        for truck in trucks {
            self.add(truck)?;
        }
        Ok(self)
    }

    pub fn build(self) -> TruckRoster {
        let mut by_dc: BTreeMap<DcId, Vec<usize>> = BTreeMap::new();
        let mut pool = Vec::new();
        for (index, truck) in self.trucks.iter().enumerate() {
            match truck.home_dc {
                Some(dc) => by_dc.entry(dc).or_default().push(index),
                None => pool.push(index),
            }
        }
        TruckRoster {
            trucks: self.trucks,
            by_id: self.by_id,
            by_dc,
            pool,
        }
    }
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// Immutable fleet arena. Trucks are addressed by arena index internally and
/// by [`TruckId`] externally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruckRoster {
    trucks: Vec<Truck>,
    by_id: BTreeMap<TruckId, usize>,
    by_dc: BTreeMap<DcId, Vec<usize>>,
    pool: Vec<usize>,
}

impl TruckRoster {
    /// Build a roster from a list, rejecting duplicates and zero capacities.
    pub fn from_trucks(trucks: impl IntoIterator<Item = Truck>) -> Result<Self, RosterError> {
        let mut builder = RosterBuilder::new();
        builder.extend(trucks)?;
        Ok(builder.build())
    }

    pub fn len(&self) -> usize {
        self.trucks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trucks.is_empty()
    }

    pub fn get(&self, id: TruckId) -> Option<&Truck> {
        self.by_id.get(&id).map(|&index| &self.trucks[index])
    }

    pub(crate) fn at(&self, index: usize) -> &Truck {
        &self.trucks[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Truck> {
        self.trucks.iter()
    }

    /// Arena indexes of trucks based at `dc`, in rotation order.
    pub(crate) fn assigned_indexes(&self, dc: DcId) -> &[usize] {
        self.by_dc.get(&dc).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Arena indexes of pool trucks, in rotation order.
    pub(crate) fn pool_indexes(&self) -> &[usize] {
        &self.pool
    }

    /// Trucks based at `dc`, in rotation order.
    pub fn assigned_to(&self, dc: DcId) -> impl Iterator<Item = &Truck> {
        self.assigned_indexes(dc).iter().map(|&i| &self.trucks[i])
    }

    /// Pool trucks, in rotation order.
    pub fn pool(&self) -> impl Iterator<Item = &Truck> {
        self.pool.iter().map(|&i| &self.trucks[i])
    }

    /// Distribution centers with at least one assigned truck.
    pub fn distribution_centers(&self) -> impl Iterator<Item = DcId> + '_ {
        self.by_dc.keys().copied()
    }

    /// Whether any truck (assigned or pool) could ever serve `dc`.
    pub fn can_serve(&self, dc: DcId) -> bool {
        !self.assigned_indexes(dc).is_empty() || !self.pool.is_empty()
    }

    /// Largest capacity among trucks eligible for `dc`. Work that has to
    /// wait for a truck is queued in chunks of this size.
    pub fn max_capacity(&self, dc: DcId) -> Option<u32> {
        self.assigned_indexes(dc)
            .iter()
            .chain(self.pool.iter())
            .map(|&i| self.trucks[i].capacity)
            .max()
    }

    pub fn refrigerated_count(&self) -> usize {
        self.trucks.iter().filter(|t| t.refrigerated).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TruckRoster {
        TruckRoster::from_trucks([
            Truck::assigned(TruckId(101), DcId(1), 1000),
            Truck::assigned(TruckId(102), DcId(1), 800),
            Truck::assigned(TruckId(201), DcId(2), 1200),
            Truck::pool(TruckId(900), 600).with_refrigeration(),
        ])
        .unwrap()
    }

    #[test]
    fn indexes_by_dc_and_pool() {
        let roster = sample();
        let dc1: Vec<TruckId> = roster.assigned_to(DcId(1)).map(|t| t.id).collect();
        assert_eq!(dc1, vec![TruckId(101), TruckId(102)]);
        let pool: Vec<TruckId> = roster.pool().map(|t| t.id).collect();
        assert_eq!(pool, vec![TruckId(900)]);
        assert_eq!(roster.assigned_to(DcId(9)).count(), 0);
    }

    #[test]
    fn duplicate_truck_rejected() {
        let result = TruckRoster::from_trucks([
            Truck::assigned(TruckId(1), DcId(1), 10),
            Truck::pool(TruckId(1), 10),
        ]);
        assert_eq!(result, Err(RosterError::DuplicateTruck(TruckId(1))));
    }

    #[test]
    fn zero_capacity_rejected() {
        let result = TruckRoster::from_trucks([Truck::pool(TruckId(5), 0)]);
        assert_eq!(result, Err(RosterError::ZeroCapacity(TruckId(5))));
    }

    #[test]
    fn can_serve_uses_pool_fallback() {
        let roster = sample();
        assert!(roster.can_serve(DcId(7)));

        let no_pool = TruckRoster::from_trucks([Truck::assigned(TruckId(1), DcId(1), 10)]).unwrap();
        assert!(no_pool.can_serve(DcId(1)));
        assert!(!no_pool.can_serve(DcId(2)));
    }

    #[test]
    fn max_capacity_is_largest_eligible() {
        let roster = sample();
        assert_eq!(roster.max_capacity(DcId(1)), Some(1000));
        assert_eq!(roster.max_capacity(DcId(2)), Some(1200));
        assert_eq!(roster.max_capacity(DcId(3)), Some(600));

        let no_pool = TruckRoster::from_trucks([Truck::assigned(TruckId(1), DcId(1), 10)]).unwrap();
        assert_eq!(no_pool.max_capacity(DcId(2)), None);
    }

    #[test]
    fn lookup_and_counts() {
        let roster = sample();
        assert_eq!(roster.len(), 4);
        assert_eq!(roster.get(TruckId(201)).map(|t| t.capacity), Some(1200));
        assert!(roster.get(TruckId(999)).is_none());
        assert_eq!(roster.refrigerated_count(), 1);
        assert!(roster.get(TruckId(900)).is_some_and(Truck::is_pool));
        let dcs: Vec<DcId> = roster.distribution_centers().collect();
        assert_eq!(dcs, vec![DcId(1), DcId(2)]);
    }
}
