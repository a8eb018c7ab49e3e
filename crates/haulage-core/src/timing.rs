//! Shipment timing: unload duration, round trip, and the four lifecycle
//! instants computed when a truck is assigned.

use crate::shipment::ShipmentTiming;
use crate::time::{Fixed64, SimDuration, SimTime};

/// Unload time for an empty truck, in hours.
const UNLOAD_FLOOR_HOURS: Fixed64 = Fixed64::lit("0.5");
/// Additional unload time for a full truck, in hours.
const UNLOAD_SPAN_HOURS: Fixed64 = Fixed64::lit("1.5");

/// Unload duration: `0.5h + 1.5h * (quantity / capacity)`.
///
/// Ranges from 0.5h for a near-empty truck to 2.0h for a full one. Quantity
/// above capacity is treated as a full load.
pub fn unload_duration(quantity: u64, capacity: u32) -> SimDuration {
    if capacity == 0 {
        return SimDuration::from_fractional_hours(UNLOAD_FLOOR_HOURS + UNLOAD_SPAN_HOURS);
    }
    let load = quantity.min(capacity as u64);
    let fill = Fixed64::saturating_from_num(load) / Fixed64::saturating_from_num(capacity);
    SimDuration::from_fractional_hours(UNLOAD_FLOOR_HOURS + UNLOAD_SPAN_HOURS * fill)
}

/// Time a truck is unavailable after departing: outbound + unload + return.
/// Routes are symmetric, so the return leg equals the outbound leg.
pub fn round_trip(outbound: SimDuration, unload: SimDuration) -> SimDuration {
    outbound + unload + outbound
}

/// Compute every lifecycle instant for a shipment departing at `departure`.
pub fn plan(
    departure: SimTime,
    outbound: SimDuration,
    loading_lead: SimDuration,
    quantity: u64,
    capacity: u32,
) -> ShipmentTiming {
    let unload = unload_duration(quantity, capacity);
    let estimated_arrival = departure + outbound;
    ShipmentTiming {
        departure,
        loading_start: departure + loading_lead,
        estimated_arrival,
        estimated_departure: estimated_arrival + unload,
        truck_free_at: departure + round_trip(outbound, unload),
    }
}
