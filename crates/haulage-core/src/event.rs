//! Typed engine events with pre-allocated ring buffers.
//!
//! Every diagnostic the engine produces (dispatches, queueing, truck moves,
//! recoveries, rejected transitions, truncations, inventory changes) is
//! emitted here as it happens and delivered in batch by
//! [`Engine::deliver_events`](crate::engine::Engine::deliver_events). Each
//! event kind has its own [`EventBuffer`] with a configurable capacity.
//!
//! Listeners are passive: they observe events and cannot mutate the engine.
//! Exporters hook in here to write truck-move and inventory-transaction
//! fact rows.
//!
//! # Suppression
//!
//! Event kinds can be suppressed via [`EventBus::suppress`], which prevents
//! any allocation or recording for that kind.

use crate::id::{DcId, PendingRequestId, ShipmentId, StoreId, TruckId};
use crate::ledger::InventoryTransaction;
use crate::record::TruckMove;
use crate::shipment::ShipmentState;
use crate::time::{SimDuration, SimTime};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// An engine event. All events carry the instant at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // -- Dispatch --
    ShipmentDispatched {
        shipment: ShipmentId,
        truck: TruckId,
        origin: DcId,
        destination: StoreId,
        quantity: u64,
        requested_departure: SimTime,
        /// When the truck is back and free again.
        busy_until: SimTime,
        /// Set when the shipment came out of the pending queue.
        from_queue: bool,
        at: SimTime,
    },
    ShipmentQueued {
        request: PendingRequestId,
        origin: DcId,
        destination: StoreId,
        quantity: u64,
        requested_departure: SimTime,
        queue_len: usize,
        at: SimTime,
    },
    CapacityTruncated {
        origin: DcId,
        destination: StoreId,
        truck: TruckId,
        capacity: u32,
        dropped: u64,
        at: SimTime,
    },
    QueueDrained {
        dispatched: usize,
        remaining: usize,
        at: SimTime,
    },

    // -- Lifecycle --
    TruckMoved {
        movement: TruckMove,
    },
    ShipmentCompleted {
        shipment: ShipmentId,
        truck: TruckId,
        destination: StoreId,
        quantity: u64,
        at: SimTime,
    },
    ShipmentRecovered {
        shipment: ShipmentId,
        truck: TruckId,
        stuck_in: ShipmentState,
        dwell: SimDuration,
        at: SimTime,
    },
    TransitionRejected {
        shipment: ShipmentId,
        from: ShipmentState,
        to: ShipmentState,
        at: SimTime,
    },

    // -- Inventory --
    InventoryChanged {
        transaction: InventoryTransaction,
    },
}

/// Discriminant tag for event types, used for suppression and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ShipmentDispatched,
    ShipmentQueued,
    CapacityTruncated,
    QueueDrained,
    TruckMoved,
    ShipmentCompleted,
    ShipmentRecovered,
    TransitionRejected,
    InventoryChanged,
}

/// Total number of event kinds.
const EVENT_KIND_COUNT: usize = 9;

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ShipmentDispatched { .. } => EventKind::ShipmentDispatched,
            Event::ShipmentQueued { .. } => EventKind::ShipmentQueued,
            Event::CapacityTruncated { .. } => EventKind::CapacityTruncated,
            Event::QueueDrained { .. } => EventKind::QueueDrained,
            Event::TruckMoved { .. } => EventKind::TruckMoved,
            Event::ShipmentCompleted { .. } => EventKind::ShipmentCompleted,
            Event::ShipmentRecovered { .. } => EventKind::ShipmentRecovered,
            Event::TransitionRejected { .. } => EventKind::TransitionRejected,
            Event::InventoryChanged { .. } => EventKind::InventoryChanged,
        }
    }

    /// Instant the event occurred.
    pub fn at(&self) -> SimTime {
        match self {
            Event::ShipmentDispatched { at, .. }
            | Event::ShipmentQueued { at, .. }
            | Event::CapacityTruncated { at, .. }
            | Event::QueueDrained { at, .. }
            | Event::ShipmentCompleted { at, .. }
            | Event::ShipmentRecovered { at, .. }
            | Event::TransitionRejected { at, .. } => *at,
            Event::TruckMoved { movement } => movement.at,
            Event::InventoryChanged { transaction } => transaction.at,
        }
    }
}

impl EventKind {
    pub const ALL: [EventKind; EVENT_KIND_COUNT] = [
        EventKind::ShipmentDispatched,
        EventKind::ShipmentQueued,
        EventKind::CapacityTruncated,
        EventKind::QueueDrained,
        EventKind::TruckMoved,
        EventKind::ShipmentCompleted,
        EventKind::ShipmentRecovered,
        EventKind::TransitionRejected,
        EventKind::InventoryChanged,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventBuffer: pre-allocated ring buffer
// ---------------------------------------------------------------------------

/// A pre-allocated ring buffer for events. Fixed capacity; when full, the
/// oldest events are dropped.
#[derive(Debug)]
pub struct EventBuffer {
    events: Vec<Option<Event>>,
    /// Write position (wraps around).
    head: usize,
    len: usize,
    /// Total events ever written, including dropped ones.
    total_written: u64,
    /// Events overwritten while the buffer was full.
    dropped: u64,
}

impl EventBuffer {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
            dropped: 0,
        }
    }

    /// Push an event. If full, the oldest event is dropped.
    pub fn push(&mut self, event: Event) {
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        } else {
            self.dropped += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Number of events overwritten before they could be delivered.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Iterate from oldest to newest.
    pub fn iter(&self) -> EventBufferIter<'_> {
        let start = if self.len < self.capacity() {
            0
        } else {
            // head is the next write position, which holds the oldest entry
            self.head
        };
        EventBufferIter {
            buffer: self,
            index: start,
            remaining: self.len,
        }
    }

    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

/// Iterator over events in an [`EventBuffer`], from oldest to newest.
pub struct EventBufferIter<'a> {
    buffer: &'a EventBuffer,
    index: usize,
    remaining: usize,
}

impl<'a> Iterator for EventBufferIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let event = self.buffer.events[self.index].as_ref();
        self.index = (self.index + 1) % self.buffer.capacity();
        self.remaining -= 1;
        event
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for EventBufferIter<'_> {}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// A passive listener receives events read-only.
pub type PassiveListener = Box<dyn FnMut(&Event)>;

/// Optional predicate that filters events for a listener.
pub type EventFilter = Box<dyn Fn(&Event) -> bool>;

/// Priority level for listeners. Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListenerPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

struct ListenerEntry {
    listener: PassiveListener,
    priority: ListenerPriority,
    filter: Option<EventFilter>,
    insertion_order: u64,
}

impl std::fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("priority", &self.priority)
            .field("filtered", &self.filter.is_some())
            .field("insertion_order", &self.insertion_order)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// One ring buffer per event kind, listener lists, and suppression flags.
pub struct EventBus {
    buffers: [Option<EventBuffer>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    listeners: [Vec<ListenerEntry>; EVENT_KIND_COUNT],
    default_capacity: usize,
    /// Stable sort key for listeners sharing a priority.
    next_insertion_order: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffers", &self.buffers)
            .field("suppressed", &self.suppressed)
            .field("default_capacity", &self.default_capacity)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            buffers: Default::default(),
            suppressed: [false; EVENT_KIND_COUNT],
            listeners: Default::default(),
            default_capacity,
            next_insertion_order: 0,
        }
    }

    /// Suppressed kinds are never allocated or buffered.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()] = None;
    }

    pub fn unsuppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = false;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Buffer an event. No-op if its kind is suppressed.
    pub fn emit(&mut self, event: Event) {
        let idx = event.kind().index();
        if self.suppressed[idx] {
            return;
        }
        let capacity = self.default_capacity;
        self.buffers[idx]
            .get_or_insert_with(|| EventBuffer::new(capacity))
            .push(event);
    }

    /// Register a listener with normal priority and no filter.
    pub fn on_passive(&mut self, kind: EventKind, listener: PassiveListener) {
        self.on_passive_filtered(kind, ListenerPriority::Normal, None, listener);
    }

    pub fn on_passive_filtered(
        &mut self,
        kind: EventKind,
        priority: ListenerPriority,
        filter: Option<EventFilter>,
        listener: PassiveListener,
    ) {
        let order = self.next_insertion_order;
        self.next_insertion_order += 1;
        self.listeners[kind.index()].push(ListenerEntry {
            listener,
            priority,
            filter,
            insertion_order: order,
        });
    }

    /// Deliver all buffered events to listeners, then clear the buffers.
    ///
    /// Kinds are delivered in [`EventKind::ALL`] order. Within a kind,
    /// listeners run by `(priority, insertion_order)` and each sees events
    /// oldest to newest.
    pub fn deliver(&mut self) {
        for idx in 0..EVENT_KIND_COUNT {
            if self.suppressed[idx] {
                continue;
            }
            let Some(buffer) = self.buffers[idx].as_ref() else {
                continue;
            };
            if buffer.is_empty() {
                continue;
            }

            // Copy out so listeners and the buffer are not borrowed together.
            let events: Vec<Event> = buffer.iter().cloned().collect();

            self.listeners[idx].sort_by_key(|entry| (entry.priority, entry.insertion_order));
            for entry in &mut self.listeners[idx] {
                for event in &events {
                    if let Some(ref filter) = entry.filter
                        && !filter(event)
                    {
                        continue;
                    }
                    (entry.listener)(event);
                }
            }

            if let Some(buffer) = self.buffers[idx].as_mut() {
                buffer.clear();
            }
        }
    }

    pub fn buffer(&self, kind: EventKind) -> Option<&EventBuffer> {
        self.buffers[kind.index()].as_ref()
    }

    pub fn buffered_count(&self, kind: EventKind) -> usize {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.len())
            .unwrap_or(0)
    }

    /// Total events ever emitted for a kind, including dropped ones.
    pub fn total_emitted(&self, kind: EventKind) -> u64 {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.total_written())
            .unwrap_or(0)
    }

    /// Clear all buffers. Listeners and suppression settings stay.
    pub fn clear_all(&mut self) {
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.clear();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
