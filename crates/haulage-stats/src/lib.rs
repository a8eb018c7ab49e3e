//! Dispatch statistics for the haulage engine.
//!
//! Tracks shipment throughput, queue pressure, recoveries and per-truck
//! utilization over configurable tick windows. Listens to core events
//! (`ShipmentDispatched`, `ShipmentQueued`, `QueueDrained`,
//! `ShipmentCompleted`, `ShipmentRecovered`, `CapacityTruncated`,
//! `TransitionRejected`) and aggregates them into rolling metrics using
//! [`Fixed64`] arithmetic.
//!
//! # Usage
//!
//! ```ignore
//! let stats = Rc::new(RefCell::new(DispatchStats::new(StatsConfig::default())));
//! attach(&mut engine.event_bus, &stats);
//! // Drive the engine; listeners feed events on delivery:
//! engine.tick(now);
//! // Close the tick:
//! stats.borrow_mut().end_tick(now);
//! // Query metrics:
//! let rate = stats.borrow().dispatch_rate();
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use haulage_core::event::{Event, EventBus, EventKind};
use haulage_core::id::TruckId;
use haulage_core::time::{Fixed64, SimDuration, SimTime};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the statistics module.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// Window size in ticks for rolling averages.
    pub window_size: usize,
    /// Maximum number of queue-length samples to retain.
    pub history_capacity: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            window_size: 24,
            history_capacity: 256,
        }
    }
}

// ---------------------------------------------------------------------------
// RingBuffer
// ---------------------------------------------------------------------------

/// A fixed-capacity ring buffer storing [`Fixed64`] values for trend analysis.
///
/// When full, the oldest entry is overwritten. Iterates oldest-to-newest.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Vec<Fixed64>,
    head: usize,
    len: usize,
}

impl RingBuffer {
    /// Create a new ring buffer with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "RingBuffer capacity must be > 0");
        Self {
            data: vec![Fixed64::ZERO; capacity],
            head: 0,
            len: 0,
        }
    }

    /// Push a value, overwriting the oldest entry if at capacity.
    pub fn push(&mut self, value: Fixed64) {
        self.data[self.head] = value;
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The most recently pushed value, if any.
    pub fn latest(&self) -> Option<Fixed64> {
        if self.len == 0 {
            return None;
        }
        let idx = (self.head + self.capacity() - 1) % self.capacity();
        Some(self.data[idx])
    }

    /// Highest stored value, if any.
    pub fn max(&self) -> Option<Fixed64> {
        self.iter().max()
    }

    /// Iterate values from oldest to newest.
    pub fn iter(&self) -> RingBufferIter<'_> {
        let start = if self.len < self.capacity() {
            0
        } else {
            self.head
        };
        RingBufferIter {
            buffer: self,
            index: start,
            remaining: self.len,
        }
    }

    pub fn to_vec(&self) -> Vec<Fixed64> {
        self.iter().collect()
    }

    /// Clear all stored values without changing capacity.
    pub fn clear(&mut self) {
        self.data.fill(Fixed64::ZERO);
        self.head = 0;
        self.len = 0;
    }
}

/// Iterator over [`RingBuffer`] values, oldest to newest.
pub struct RingBufferIter<'a> {
    buffer: &'a RingBuffer,
    index: usize,
    remaining: usize,
}

impl Iterator for RingBufferIter<'_> {
    type Item = Fixed64;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let value = self.buffer.data[self.index];
        self.index = (self.index + 1) % self.buffer.capacity();
        self.remaining -= 1;
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for RingBufferIter<'_> {}

// ---------------------------------------------------------------------------
// Rolling window counter
// ---------------------------------------------------------------------------

/// A count over the most recent N ticks.
///
/// [`add`](Self::add) accumulates into the in-progress tick;
/// [`commit`](Self::commit) closes it, evicting the oldest tick once the
/// window is full. Queries include the in-progress tick.
#[derive(Debug, Clone)]
struct RollingWindow {
    tick_counts: Vec<u64>,
    write_pos: usize,
    committed_total: u64,
    current: u64,
    committed_count: usize,
}

impl RollingWindow {
    fn new(window_size: usize) -> Self {
        assert!(window_size > 0, "RollingWindow size must be > 0");
        Self {
            tick_counts: vec![0; window_size],
            write_pos: 0,
            committed_total: 0,
            current: 0,
            committed_count: 0,
        }
    }

    fn window_size(&self) -> usize {
        self.tick_counts.len()
    }

    fn add(&mut self, count: u64) {
        self.current += count;
    }

    fn commit(&mut self) {
        if self.committed_count == self.window_size() {
            self.committed_total -= self.tick_counts[self.write_pos];
        }
        self.tick_counts[self.write_pos] = self.current;
        self.committed_total += self.current;
        self.current = 0;
        self.write_pos = (self.write_pos + 1) % self.window_size();
        if self.committed_count < self.window_size() {
            self.committed_count += 1;
        }
    }

    fn total(&self) -> u64 {
        self.committed_total + self.current
    }

    /// Average per tick over committed ticks plus a non-empty current tick.
    fn rate(&self) -> Fixed64 {
        let effective_count = if self.current > 0 {
            self.committed_count + 1
        } else {
            self.committed_count
        };
        if effective_count == 0 {
            return Fixed64::ZERO;
        }
        Fixed64::saturating_from_num(self.total()) / Fixed64::saturating_from_num(effective_count)
    }

    fn clear(&mut self) {
        self.tick_counts.fill(0);
        self.write_pos = 0;
        self.committed_total = 0;
        self.current = 0;
        self.committed_count = 0;
    }
}

// ---------------------------------------------------------------------------
// Per-truck statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct TruckStats {
    trips: u64,
    /// Sum of departure-to-free spans over all trips.
    busy: SimDuration,
}

// ---------------------------------------------------------------------------
// DispatchStats
// ---------------------------------------------------------------------------

/// Event kinds [`DispatchStats`] consumes.
pub const TRACKED_KINDS: [EventKind; 7] = [
    EventKind::ShipmentDispatched,
    EventKind::ShipmentQueued,
    EventKind::QueueDrained,
    EventKind::ShipmentCompleted,
    EventKind::ShipmentRecovered,
    EventKind::CapacityTruncated,
    EventKind::TransitionRejected,
];

/// Main dispatch statistics aggregator.
///
/// Accepts events via [`process_event`](DispatchStats::process_event),
/// closes ticks via [`end_tick`](DispatchStats::end_tick), and exposes
/// rolling rates, cumulative counters and per-truck figures.
#[derive(Debug)]
pub struct DispatchStats {
    config: StatsConfig,

    dispatched: RollingWindow,
    queued: RollingWindow,
    completed: RollingWindow,
    delivered_units: RollingWindow,

    queue_history: RingBuffer,
    queue_len: usize,
    queue_len_at: Option<SimTime>,
    peak_queue_len: usize,

    total_dispatched: u64,
    total_queued: u64,
    total_completed: u64,
    recoveries: u64,
    truncations: u64,
    units_truncated: u64,
    rejected_transitions: u64,

    wait_total: SimDuration,
    wait_count: u64,

    trucks: BTreeMap<TruckId, TruckStats>,
    started: Option<SimTime>,
    now: Option<SimTime>,
    ticks: u64,
}

impl DispatchStats {
    pub fn new(config: StatsConfig) -> Self {
        let ws = config.window_size;
        Self {
            dispatched: RollingWindow::new(ws),
            queued: RollingWindow::new(ws),
            completed: RollingWindow::new(ws),
            delivered_units: RollingWindow::new(ws),
            queue_history: RingBuffer::new(config.history_capacity),
            queue_len: 0,
            queue_len_at: None,
            peak_queue_len: 0,
            total_dispatched: 0,
            total_queued: 0,
            total_completed: 0,
            recoveries: 0,
            truncations: 0,
            units_truncated: 0,
            rejected_transitions: 0,
            wait_total: SimDuration::ZERO,
            wait_count: 0,
            trucks: BTreeMap::new(),
            started: None,
            now: None,
            ticks: 0,
            config,
        }
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Instant passed to the last [`end_tick`](Self::end_tick).
    pub fn now(&self) -> Option<SimTime> {
        self.now
    }

    /// Number of closed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    // -- Event processing ---------------------------------------------------

    /// Process a single event. Events of kinds outside [`TRACKED_KINDS`]
    /// are ignored.
    pub fn process_event(&mut self, event: &Event) {
        match event {
            Event::ShipmentDispatched {
                truck,
                requested_departure,
                busy_until,
                from_queue,
                at,
                ..
            } => {
                self.observe(*at);
                self.dispatched.add(1);
                self.total_dispatched += 1;
                let entry = self.trucks.entry(*truck).or_default();
                entry.trips += 1;
                entry.busy += busy_until.saturating_since(*at);
                if *from_queue {
                    self.wait_total += at.saturating_since(*requested_departure);
                    self.wait_count += 1;
                }
            }

            Event::ShipmentQueued { queue_len, at, .. } => {
                self.observe(*at);
                self.queued.add(1);
                self.total_queued += 1;
                self.sample_queue(*queue_len, *at);
            }

            Event::QueueDrained { remaining, at, .. } => {
                self.observe(*at);
                self.sample_queue(*remaining, *at);
            }

            Event::ShipmentCompleted { quantity, at, .. } => {
                self.observe(*at);
                self.completed.add(1);
                self.delivered_units.add(*quantity);
                self.total_completed += 1;
            }

            Event::ShipmentRecovered { .. } => {
                self.recoveries += 1;
            }

            Event::CapacityTruncated { dropped, .. } => {
                self.truncations += 1;
                self.units_truncated += dropped;
            }

            Event::TransitionRejected { .. } => {
                self.rejected_transitions += 1;
            }

            _ => {}
        }
    }

    /// Close the current tick at `now`: sample the queue length and advance
    /// every rolling window.
    pub fn end_tick(&mut self, now: SimTime) {
        self.observe(now);
        self.now = Some(self.now.map_or(now, |prev| prev.max(now)));
        self.ticks += 1;

        self.queue_history
            .push(Fixed64::saturating_from_num(self.queue_len));
        self.dispatched.commit();
        self.queued.commit();
        self.completed.commit();
        self.delivered_units.commit();
    }

    // -- Throughput ---------------------------------------------------------

    /// Shipments dispatched per tick over the window.
    pub fn dispatch_rate(&self) -> Fixed64 {
        self.dispatched.rate()
    }

    /// Requests queued per tick over the window.
    pub fn queue_rate(&self) -> Fixed64 {
        self.queued.rate()
    }

    /// Shipments completed per tick over the window, recoveries included.
    pub fn completion_rate(&self) -> Fixed64 {
        self.completed.rate()
    }

    /// Units delivered per tick over the window.
    pub fn delivery_rate(&self) -> Fixed64 {
        self.delivered_units.rate()
    }

    pub fn total_dispatched(&self) -> u64 {
        self.total_dispatched
    }

    pub fn total_queued(&self) -> u64 {
        self.total_queued
    }

    pub fn total_completed(&self) -> u64 {
        self.total_completed
    }

    // -- Queue --------------------------------------------------------------

    /// Latest known queue length.
    pub fn queue_len(&self) -> usize {
        self.queue_len
    }

    pub fn peak_queue_len(&self) -> usize {
        self.peak_queue_len
    }

    /// One queue-length sample per closed tick, oldest to newest.
    pub fn queue_history(&self) -> Vec<Fixed64> {
        self.queue_history.to_vec()
    }

    /// Mean time queued requests waited past their requested departure.
    /// `None` until a queued request has been dispatched.
    pub fn mean_queue_wait(&self) -> Option<SimDuration> {
        if self.wait_count == 0 {
            return None;
        }
        Some(SimDuration::from_secs(
            self.wait_total.as_secs() / self.wait_count,
        ))
    }

    /// [`mean_queue_wait`](Self::mean_queue_wait) in hours, zero when unknown.
    pub fn mean_queue_wait_hours(&self) -> Fixed64 {
        self.mean_queue_wait()
            .map(SimDuration::as_hours)
            .unwrap_or(Fixed64::ZERO)
    }

    // -- Anomalies ----------------------------------------------------------

    pub fn recoveries(&self) -> u64 {
        self.recoveries
    }

    pub fn truncations(&self) -> u64 {
        self.truncations
    }

    pub fn units_truncated(&self) -> u64 {
        self.units_truncated
    }

    pub fn rejected_transitions(&self) -> u64 {
        self.rejected_transitions
    }

    // -- Per-truck ----------------------------------------------------------

    pub fn trips(&self, truck: TruckId) -> u64 {
        self.trucks.get(&truck).map_or(0, |t| t.trips)
    }

    /// Fraction of elapsed simulated time the truck was out, capped at one.
    ///
    /// Elapsed time runs from the first observed instant to the last closed
    /// tick. Trips still in progress count in full.
    pub fn utilization(&self, truck: TruckId) -> Fixed64 {
        let elapsed = self.elapsed();
        if elapsed == SimDuration::ZERO {
            return Fixed64::ZERO;
        }
        let busy = self
            .trucks
            .get(&truck)
            .map_or(SimDuration::ZERO, |t| t.busy)
            .min(elapsed);
        Fixed64::saturating_from_num(busy.as_secs()) / Fixed64::saturating_from_num(elapsed.as_secs())
    }

    /// Mean utilization over every truck that has made a trip.
    pub fn fleet_utilization(&self) -> Fixed64 {
        if self.trucks.is_empty() {
            return Fixed64::ZERO;
        }
        let sum: Fixed64 = self
            .trucks
            .keys()
            .map(|&truck| self.utilization(truck))
            .sum();
        sum / Fixed64::saturating_from_num(self.trucks.len())
    }

    pub fn tracked_truck_count(&self) -> usize {
        self.trucks.len()
    }

    // -- Utility ------------------------------------------------------------

    /// Clear all statistics, resetting to a fresh state.
    pub fn clear(&mut self) {
        self.dispatched.clear();
        self.queued.clear();
        self.completed.clear();
        self.delivered_units.clear();
        self.queue_history.clear();
        self.queue_len = 0;
        self.queue_len_at = None;
        self.peak_queue_len = 0;
        self.total_dispatched = 0;
        self.total_queued = 0;
        self.total_completed = 0;
        self.recoveries = 0;
        self.truncations = 0;
        self.units_truncated = 0;
        self.rejected_transitions = 0;
        self.wait_total = SimDuration::ZERO;
        self.wait_count = 0;
        self.trucks.clear();
        self.started = None;
        self.now = None;
        self.ticks = 0;
    }

    // -- Internal helpers ---------------------------------------------------

    fn observe(&mut self, at: SimTime) {
        self.started = Some(self.started.map_or(at, |s| s.min(at)));
    }

    /// Keep the queue length reported at the latest instant. Events arrive
    /// grouped by kind, so a later-processed sample may be older.
    fn sample_queue(&mut self, len: usize, at: SimTime) {
        if self.queue_len_at.is_some_and(|prev| at < prev) {
            return;
        }
        self.queue_len = len;
        self.queue_len_at = Some(at);
        self.peak_queue_len = self.peak_queue_len.max(len);
    }

    fn elapsed(&self) -> SimDuration {
        match (self.started, self.now) {
            (Some(start), Some(now)) => now.saturating_since(start),
            _ => SimDuration::ZERO,
        }
    }
}

/// Feed every tracked event delivered by `bus` into `stats`.
pub fn attach(bus: &mut EventBus, stats: &Rc<RefCell<DispatchStats>>) {
    for kind in TRACKED_KINDS {
        let sink = Rc::clone(stats);
        bus.on_passive(
            kind,
            Box::new(move |event| sink.borrow_mut().process_event(event)),
        );
    }
}

// ===========================================================================
// Tests
// ===========================================================================
