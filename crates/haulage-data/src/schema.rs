//! Serde data file structs for fleet definitions.
//!
//! These structs define the on-disk format for distribution centers, trucks,
//! routes, and engine settings. They are deserialized from RON, JSON, or TOML
//! data files and then resolved into core types by the loader.

use serde::Deserialize;

// ===========================================================================
// Distribution centers
// ===========================================================================

/// A distribution center definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct DcData {
    pub id: u32,
    pub name: String,
}

// ===========================================================================
// Trucks
// ===========================================================================

/// A truck definition in a data file. Omitting `home_dc` makes it a pool
/// truck.
#[derive(Debug, Clone, Deserialize)]
pub struct TruckData {
    pub id: u32,
    #[serde(default)]
    pub home_dc: Option<u32>,
    pub capacity: u32,
    #[serde(default)]
    pub refrigerated: bool,
}

// ===========================================================================
// Routes
// ===========================================================================

/// Outbound travel time between a distribution center and a store.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteData {
    pub dc: u32,
    pub store: u32,
    pub travel_hours: f64,
}

// ===========================================================================
// Engine settings
// ===========================================================================

/// Engine tunables. Every field is optional and falls back to the engine
/// default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineData {
    pub loading_lead_hours: Option<f64>,
    pub dwell_ceiling_hours: Option<f64>,
    pub default_travel_hours: Option<f64>,
    pub travel_jitter_minutes: Option<u64>,
    pub seed: Option<u64>,
    pub event_buffer_capacity: Option<usize>,
}
