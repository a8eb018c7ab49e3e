//! The dispatch engine: owns the fleet, the ledger, and every active
//! shipment, and drives them forward as simulated time advances.
//!
//! # Architecture
//!
//! The `Engine` owns:
//! - An immutable [`TruckRoster`] and [`RouteTable`]
//! - [`TruckAvailability`] and the round-robin [`RotationCursors`]
//! - The [`PendingQueue`] of requests waiting for a truck
//! - Active shipments in a `SlotMap` keyed by [`ShipmentId`]
//! - The [`InventoryLedger`]
//! - A seeded [`SimRng`] for travel jitter
//! - An [`EventBus`] for typed engine events
//!
//! # Driving the engine
//!
//! A simulation driver calls [`Engine::request_shipment`] for reorders and
//! then, once per simulated step, [`Engine::tick`]:
//!
//! 1. **Drain** -- retry queued requests, oldest requested departure first
//! 2. **Advance** -- move every active shipment at most one lifecycle state
//! 3. **Recover** -- force-complete shipments past the dwell ceiling
//! 4. **Deliver** -- hand buffered events to listeners
//!
//! Each step is also callable on its own. Draining and advancing are no-ops
//! when given an instant no later than the previous call, so the engine never
//! regresses.

use crate::availability::TruckAvailability;
use crate::config::{EngineConfig, RouteTable};
use crate::dispatch::{
    DispatchError, DispatchOutcome, RotationCursors, normalize_line_items, select_truck,
    split_line_items, take_chunk, truncate_to_capacity,
};
use crate::event::{Event, EventBus};
use crate::id::{DcId, ProductId, ShipmentId, StoreId, TruckId};
use crate::ledger::{InventoryLedger, InventoryTransaction, LedgerError};
use crate::queue::{PendingQueue, PendingShipmentRequest};
use crate::record::TruckMove;
use crate::rng::SimRng;
use crate::roster::TruckRoster;
use crate::shipment::{LineItem, Shipment, ShipmentError, ShipmentState, total_quantity};
use crate::sim::{AdvanceReport, Recovery, StateHash, TickReport};
use crate::time::SimTime;
use crate::timing;
use slotmap::{Key, SlotMap};
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) roster: TruckRoster,
    pub(crate) routes: RouteTable,
    pub(crate) availability: TruckAvailability,
    pub(crate) cursors: RotationCursors,
    pub(crate) queue: PendingQueue,
    pub(crate) shipments: SlotMap<ShipmentId, Shipment>,
    pub(crate) ledger: InventoryLedger,
    pub(crate) rng: SimRng,

    /// Latest instant passed to any operation.
    pub(crate) clock: SimTime,

    /// Instant of the last queue drain, for no-op detection.
    pub(crate) last_drain: Option<SimTime>,

    /// Typed event bus for engine events. Not persisted in snapshots.
    pub event_bus: EventBus,
}

impl Engine {
    /// An engine where every route uses the configured default travel time.
    pub fn new(roster: TruckRoster, config: EngineConfig) -> Self {
        Self::with_routes(roster, RouteTable::new(), config)
    }

    pub fn with_routes(roster: TruckRoster, routes: RouteTable, config: EngineConfig) -> Self {
        Self {
            rng: SimRng::new(config.seed),
            event_bus: EventBus::new(config.event_buffer_capacity),
            config,
            roster,
            routes,
            availability: TruckAvailability::new(),
            cursors: RotationCursors::default(),
            queue: PendingQueue::new(),
            shipments: SlotMap::with_key(),
            ledger: InventoryLedger::new(),
            clock: SimTime::EPOCH,
            last_drain: None,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn roster(&self) -> &TruckRoster {
        &self.roster
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn availability(&self) -> &TruckAvailability {
        &self.availability
    }

    pub fn cursors(&self) -> &RotationCursors {
        &self.cursors
    }

    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_len_for(&self, dc: DcId) -> usize {
        self.queue.len_for(dc)
    }

    /// Latest instant the engine has been driven to.
    pub fn clock(&self) -> SimTime {
        self.clock
    }

    pub fn shipment(&self, id: ShipmentId) -> Option<&Shipment> {
        self.shipments.get(id)
    }

    /// Active shipments in key order.
    pub fn shipments(&self) -> impl Iterator<Item = &Shipment> {
        self.shipments.values()
    }

    pub fn active_count(&self) -> usize {
        self.shipments.len()
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Select a free truck for `dc` at `now`. `Ok(None)` means every eligible
    /// truck is busy.
    pub fn select_truck(&mut self, dc: DcId, now: SimTime) -> Result<Option<TruckId>, DispatchError> {
        select_truck(&self.roster, &self.availability, &mut self.cursors, dc, now)
    }

    /// Turn a reorder into shipments.
    ///
    /// Each selected truck takes as much of the remaining request as it can
    /// carry, so a request that fits one truck becomes one shipment. When no
    /// truck is free, or an older request for `origin` is still queued, the
    /// rest is queued in chunks of the largest eligible capacity. Fails
    /// without side effects when no truck could ever serve `origin`.
    pub fn request_shipment(
        &mut self,
        origin: DcId,
        destination: StoreId,
        line_items: &[LineItem],
        departure: SimTime,
    ) -> Result<Vec<DispatchOutcome>, DispatchError> {
        let Some(queue_capacity) = self.roster.max_capacity(origin) else {
            return Err(DispatchError::NoTrucksConfigured(origin));
        };
        self.observe(departure);

        let backlog = self.queue.has_waiting(origin, departure);
        let mut remaining = normalize_line_items(line_items);
        let mut outcomes = Vec::new();
        while !remaining.is_empty() {
            let picked = if backlog {
                None
            } else {
                self.pick_truck(origin, departure)?
            };
            let Some((truck, capacity)) = picked else {
                for chunk in split_line_items(&remaining, queue_capacity) {
                    outcomes.push(DispatchOutcome::Queued(self.enqueue(
                        origin,
                        destination,
                        chunk,
                        departure,
                    )));
                }
                break;
            };
            let chunk = take_chunk(&mut remaining, capacity);
            outcomes.push(DispatchOutcome::Dispatched(self.create_shipment(
                origin,
                destination,
                (truck, capacity),
                chunk,
                departure,
                departure,
                false,
            )));
        }

        if outcomes.len() > 1 {
            debug!(
                dc = %origin,
                store = %destination,
                quantity = total_quantity(line_items),
                chunks = outcomes.len(),
                "request split across trucks"
            );
        }
        Ok(outcomes)
    }

    /// Retry queued requests in requested-departure order.
    ///
    /// A request larger than the selected truck is dispatched in part and
    /// keeps its place with the remainder. Once a request for a distribution
    /// center finds no free truck, later requests for that DC are skipped
    /// for this call so they cannot jump ahead of it. Timing of drained
    /// shipments is computed from `now`.
    pub fn drain_queue(&mut self, now: SimTime) -> Vec<Shipment> {
        if let Some(last) = self.last_drain
            && now <= last
        {
            return Vec::new();
        }
        self.last_drain = Some(now);
        self.observe(now);

        if self.queue.is_empty() {
            return Vec::new();
        }

        let mut blocked: BTreeSet<DcId> = BTreeSet::new();
        let mut dispatched = Vec::new();
        for key in self.queue.keys() {
            let Some(origin) = self.queue.get(key).map(|request| request.origin) else {
                continue;
            };
            if blocked.contains(&origin) {
                continue;
            }
            loop {
                let (truck, capacity) = match self.pick_truck(origin, now) {
                    Ok(Some(picked)) => picked,
                    Ok(None) => {
                        blocked.insert(origin);
                        break;
                    }
                    Err(err) => {
                        error!(dc = %origin, error = %err, "queued request can no longer be served; leaving it queued");
                        blocked.insert(origin);
                        break;
                    }
                };
                let Some(request) = self.queue.get_mut(key) else {
                    break;
                };
                let chunk = take_chunk(&mut request.line_items, capacity);
                let destination = request.destination;
                let requested_departure = request.requested_departure;
                let exhausted = request.line_items.is_empty();
                if exhausted {
                    self.queue.remove(key);
                } else {
                    debug!(
                        dc = %origin,
                        store = %destination,
                        request = %request.id,
                        capacity,
                        left = request.total_quantity(),
                        "queued request larger than selected truck; dispatching part"
                    );
                }
                let shipment = self.create_shipment(
                    origin,
                    destination,
                    (truck, capacity),
                    chunk,
                    requested_departure,
                    now,
                    true,
                );
                dispatched.push(shipment);
                if exhausted {
                    break;
                }
            }
        }

        let remaining = self.queue.len();
        if !dispatched.is_empty() {
            info!(at = %now, dispatched = dispatched.len(), remaining, "drained pending queue");
        }
        self.event_bus.emit(Event::QueueDrained {
            dispatched: dispatched.len(),
            remaining,
            at: now,
        });
        dispatched
    }

    /// Selected truck id and capacity.
    fn pick_truck(&mut self, dc: DcId, now: SimTime) -> Result<Option<(TruckId, u32)>, DispatchError> {
        let picked = select_truck(&self.roster, &self.availability, &mut self.cursors, dc, now)?;
        Ok(picked
            .and_then(|id| self.roster.get(id))
            .map(|truck| (truck.id, truck.capacity)))
    }

    fn enqueue(
        &mut self,
        origin: DcId,
        destination: StoreId,
        line_items: Vec<LineItem>,
        requested_departure: SimTime,
    ) -> PendingShipmentRequest {
        let request = self
            .queue
            .push(origin, destination, line_items, requested_departure, self.clock);
        let queue_len = self.queue.len();
        debug!(
            dc = %origin,
            store = %destination,
            request = %request.id,
            queue_len,
            "all eligible trucks busy; request queued"
        );
        self.event_bus.emit(Event::ShipmentQueued {
            request: request.id,
            origin,
            destination,
            quantity: request.total_quantity(),
            requested_departure,
            queue_len,
            at: self.clock,
        });
        request
    }

    /// Create a `Scheduled` shipment departing at `at`, reserve the truck for
    /// its round trip, and debit the origin's stock.
    #[allow(clippy::too_many_arguments)]
    fn create_shipment(
        &mut self,
        origin: DcId,
        destination: StoreId,
        (truck, capacity): (TruckId, u32),
        mut line_items: Vec<LineItem>,
        requested_departure: SimTime,
        at: SimTime,
        from_queue: bool,
    ) -> Shipment {
        let dropped = truncate_to_capacity(&mut line_items, capacity);
        if dropped > 0 {
            warn!(
                dc = %origin,
                store = %destination,
                truck = %truck,
                capacity,
                dropped,
                "chunk exceeds truck capacity; truncating"
            );
            self.event_bus.emit(Event::CapacityTruncated {
                origin,
                destination,
                truck,
                capacity,
                dropped,
                at,
            });
        }

        let quantity = total_quantity(&line_items);
        let outbound = self
            .routes
            .outbound(origin, destination, &self.config, &mut self.rng);
        let timing = timing::plan(at, outbound, self.config.loading_lead, quantity, capacity);
        self.availability.mark_busy_until(truck, timing.truck_free_at);

        let id = self.shipments.insert_with_key(|id| {
            Shipment::new(
                id,
                origin,
                destination,
                truck,
                line_items,
                requested_departure,
                timing,
            )
        });
        let shipment = self.shipments[id].clone();

        for tx in self.ledger.dispatch_out(origin, shipment.line_items(), at) {
            if tx.balance < 0 {
                warn!(
                    dc = %origin,
                    product = %tx.product,
                    balance = tx.balance,
                    "distribution center balance went negative at dispatch"
                );
            }
            self.event_bus.emit(Event::InventoryChanged { transaction: tx });
        }

        debug!(
            shipment = ?id,
            truck = %truck,
            dc = %origin,
            store = %destination,
            quantity,
            departure = %at,
            free_at = %timing.truck_free_at,
            "shipment dispatched"
        );
        self.event_bus.emit(Event::ShipmentDispatched {
            shipment: id,
            truck,
            origin,
            destination,
            quantity,
            requested_departure,
            busy_until: timing.truck_free_at,
            from_queue,
            at,
        });
        shipment
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Move one shipment at most one state forward. Reaching `Completed`
    /// credits the destination store and removes the shipment.
    pub fn advance(&mut self, id: ShipmentId, now: SimTime) -> Result<Option<TruckMove>, ShipmentError> {
        let movement = match self.shipments.get_mut(id) {
            Some(shipment) => shipment.advance(now),
            None => return Err(ShipmentError::Unknown(id)),
        };
        self.observe(now);

        let Some(movement) = movement else {
            return Ok(None);
        };
        self.record_move(movement);
        if movement.to.is_terminal() {
            self.complete(id, movement.at);
        }
        Ok(Some(movement))
    }

    /// Advance every active shipment once.
    pub fn advance_all(&mut self, now: SimTime) -> AdvanceReport {
        let ids: Vec<ShipmentId> = self.shipments.keys().collect();
        let mut report = AdvanceReport::default();
        for id in ids {
            if let Ok(Some(movement)) = self.advance(id, now) {
                if movement.to.is_terminal() {
                    report.completed.push(id);
                }
                report.moves.push(movement);
            }
        }
        self.observe(now);
        report
    }

    /// Force a shipment to `Completed` if it has sat in its current state
    /// longer than the dwell ceiling.
    pub fn check_timeout(&mut self, id: ShipmentId, now: SimTime) -> Result<Option<Recovery>, ShipmentError> {
        let Some(shipment) = self.shipments.get_mut(id) else {
            return Err(ShipmentError::Unknown(id));
        };
        let stuck_in = shipment.state();
        let dwell = shipment.dwell(now);
        if stuck_in.is_terminal() || dwell <= self.config.dwell_ceiling {
            return Ok(None);
        }
        let truck = shipment.truck();
        let Some(movement) = shipment.force_complete(now) else {
            return Ok(None);
        };
        self.observe(now);

        warn!(
            shipment = ?id,
            truck = %truck,
            state = %stuck_in,
            dwell = %dwell,
            ceiling = %self.config.dwell_ceiling,
            "shipment stuck past dwell ceiling; forcing completion"
        );
        self.record_move(movement);
        self.complete(id, now);
        self.event_bus.emit(Event::ShipmentRecovered {
            shipment: id,
            truck,
            stuck_in,
            dwell,
            at: now,
        });
        Ok(Some(Recovery {
            shipment: id,
            truck,
            stuck_in,
            dwell,
            movement,
        }))
    }

    pub fn check_timeouts(&mut self, now: SimTime) -> Vec<Recovery> {
        let ids: Vec<ShipmentId> = self.shipments.keys().collect();
        ids.into_iter()
            .filter_map(|id| self.check_timeout(id, now).ok().flatten())
            .collect()
    }

    /// Apply a state reported from outside the engine. Anything but the
    /// single next state is rejected and the shipment is left unchanged.
    pub fn apply_external_update(
        &mut self,
        id: ShipmentId,
        to: ShipmentState,
        at: SimTime,
    ) -> Result<TruckMove, ShipmentError> {
        let Some(shipment) = self.shipments.get_mut(id) else {
            return Err(ShipmentError::Unknown(id));
        };
        match shipment.transition_to(to, at) {
            Ok(movement) => {
                self.observe(at);
                self.record_move(movement);
                if movement.to.is_terminal() {
                    self.complete(id, at);
                }
                Ok(movement)
            }
            Err(err) => {
                warn!(shipment = ?id, from = %err.from, to = %err.to, "rejected shipment transition");
                self.event_bus.emit(Event::TransitionRejected {
                    shipment: id,
                    from: err.from,
                    to: err.to,
                    at,
                });
                Err(err.into())
            }
        }
    }

    fn record_move(&mut self, movement: TruckMove) {
        debug!(
            shipment = ?movement.shipment,
            truck = %movement.truck,
            from = %movement.from,
            to = %movement.to,
            at = %movement.at,
            forced = movement.forced,
            "shipment state changed"
        );
        self.event_bus.emit(Event::TruckMoved { movement });
    }

    /// Remove a completed shipment and credit its store.
    fn complete(&mut self, id: ShipmentId, at: SimTime) {
        let Some(shipment) = self.shipments.remove(id) else {
            return;
        };
        for tx in self.ledger.deliver(shipment.destination(), shipment.line_items(), at) {
            self.event_bus.emit(Event::InventoryChanged { transaction: tx });
        }
        self.event_bus.emit(Event::ShipmentCompleted {
            shipment: id,
            truck: shipment.truck(),
            destination: shipment.destination(),
            quantity: shipment.total_quantity(),
            at,
        });
    }

    // -----------------------------------------------------------------------
    // Inventory
    // -----------------------------------------------------------------------

    pub fn receive(
        &mut self,
        dc: DcId,
        product: ProductId,
        quantity: u32,
        at: SimTime,
    ) -> Result<InventoryTransaction, LedgerError> {
        let tx = self.ledger.receive(dc, product, quantity, at)?;
        self.event_bus.emit(Event::InventoryChanged { transaction: tx });
        Ok(tx)
    }

    /// Sell from a store, capped at what it holds.
    pub fn sell(
        &mut self,
        store: StoreId,
        product: ProductId,
        quantity: u32,
        at: SimTime,
    ) -> Option<InventoryTransaction> {
        let tx = self.ledger.sell(store, product, quantity, at)?;
        self.event_bus.emit(Event::InventoryChanged { transaction: tx });
        Some(tx)
    }

    pub fn stock_dc(&mut self, dc: DcId, product: ProductId, quantity: u32, at: SimTime) -> InventoryTransaction {
        let tx = self.ledger.stock_dc(dc, product, quantity, at);
        self.event_bus.emit(Event::InventoryChanged { transaction: tx });
        tx
    }

    pub fn stock_store(
        &mut self,
        store: StoreId,
        product: ProductId,
        quantity: u32,
        at: SimTime,
    ) -> InventoryTransaction {
        let tx = self.ledger.stock_store(store, product, quantity, at);
        self.event_bus.emit(Event::InventoryChanged { transaction: tx });
        tx
    }

    // -----------------------------------------------------------------------
    // Driving
    // -----------------------------------------------------------------------

    /// Drain, advance, recover, then deliver events.
    pub fn tick(&mut self, now: SimTime) -> TickReport {
        let drained = self.drain_queue(now);
        let advanced = self.advance_all(now);
        let recovered = self.check_timeouts(now);
        self.deliver_events();
        TickReport {
            now,
            drained,
            advanced,
            recovered,
            queue_len: self.queue.len(),
            active: self.shipments.len(),
        }
    }

    /// Hand buffered events to listeners.
    pub fn deliver_events(&mut self) {
        self.event_bus.deliver();
    }

    fn observe(&mut self, now: SimTime) {
        self.clock = self.clock.max(now);
    }

    // -----------------------------------------------------------------------
    // State hash
    // -----------------------------------------------------------------------

    /// Hash of every piece of state that affects future behavior.
    pub fn state_hash(&self) -> u64 {
        let mut h = StateHash::new();
        h.write_time(self.clock);
        h.write_u64(self.last_drain.map_or(u64::MAX, SimTime::as_secs));
        h.write_u64(self.rng.state());

        for (truck, free_at) in self.availability.iter() {
            h.write_u32(truck.0);
            h.write_time(free_at);
        }
        for (dc, pos) in self.cursors.iter() {
            h.write_u32(dc.0);
            h.write_u64(pos as u64);
        }
        h.write_u64(self.cursors.pool() as u64);

        for request in self.queue.iter() {
            h.write_u64(request.id.0);
            h.write_u32(request.origin.0);
            h.write_u32(request.destination.0);
            h.write_time(request.requested_departure);
            hash_items(&mut h, &request.line_items);
        }

        for (id, shipment) in &self.shipments {
            h.write_u64(id.data().as_ffi());
            h.write_u32(shipment.truck().0);
            h.write_u32(shipment.state() as u32);
            h.write_time(shipment.timing().departure);
            h.write_time(shipment.timing().truck_free_at);
            hash_items(&mut h, shipment.line_items());
        }

        for (dc, product, qty) in self.ledger.dc_book().iter() {
            h.write_u32(dc.0);
            h.write_u32(product.0);
            h.write_i64(qty);
        }
        for (store, product, qty) in self.ledger.store_book().iter() {
            h.write_u32(store.0);
            h.write_u32(product.0);
            h.write_i64(qty);
        }
        h.finish()
    }
}

fn hash_items(h: &mut StateHash, items: &[LineItem]) {
    for item in items {
        h.write_u32(item.product.0);
        h.write_u32(item.quantity);
    }
}
