//! Loading pipeline: reads fleet data files, resolves cross-references, and
//! builds the roster, route table, and engine configuration.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and
//! deserialization helpers used by [`load_fleet_data`].

use crate::schema::{DcData, EngineData, RouteData, TruckData};
use haulage_core::config::{EngineConfig, RouteTable};
use haulage_core::engine::Engine;
use haulage_core::id::{DcId, StoreId, TruckId};
use haulage_core::roster::{RosterBuilder, Truck, TruckRoster};
use haulage_core::time::{SimDuration, f64_to_fixed64};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: &'static str, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// An id reference could not be resolved.
    #[error("unresolved {expected_kind} reference {id} in {file}")]
    UnresolvedRef {
        file: PathBuf,
        id: u32,
        expected_kind: &'static str,
    },

    /// The same id was defined twice.
    #[error("duplicate {kind} id {id} in {file}")]
    DuplicateId {
        file: PathBuf,
        id: u32,
        kind: &'static str,
    },

    /// A truck definition the roster cannot accept.
    #[error("invalid truck {id} in {file}: {detail}")]
    InvalidTruck {
        file: PathBuf,
        id: u32,
        detail: String,
    },

    /// A numeric field outside its allowed range.
    #[error("invalid value for '{field}' in {file}: {detail}")]
    InvalidValue {
        file: PathBuf,
        field: &'static str,
        detail: String,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a data file with the given base name (without extension).
///
/// Looks for `{base_name}.ron`, `{base_name}.toml`, and `{base_name}.json`.
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// multiple formats exist for the same base name.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(DataLoadError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

/// Like [`find_data_file`], but returns an error if no file is found.
pub fn require_data_file(dir: &Path, base_name: &'static str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name,
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

/// Read a file and deserialize it according to its format (detected from extension).
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list from a file. For TOML files, extracts the array at the
/// given `toml_key` from a top-level table. For RON and JSON, deserializes
/// directly as `Vec<T>`.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => {
            let mut table: toml::Table =
                toml::from_str(&content).map_err(|e| parse_error(path, e))?;
            let array = table
                .remove(toml_key)
                .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?;
            array
                .try_into()
                .map_err(|e: toml::de::Error| parse_error(path, e))
        }
    }
}

// ===========================================================================
// Resolution helpers
// ===========================================================================

/// Check that a distribution center id was declared.
pub fn resolve_dc(
    dcs: &BTreeMap<DcId, String>,
    id: u32,
    file: &Path,
) -> Result<DcId, DataLoadError> {
    let dc = DcId(id);
    if dcs.contains_key(&dc) {
        Ok(dc)
    } else {
        Err(DataLoadError::UnresolvedRef {
            file: file.to_path_buf(),
            id,
            expected_kind: "distribution center",
        })
    }
}

/// Return a `DuplicateId` error if `key` is already present.
pub fn check_duplicate<K: Ord, V>(
    map: &BTreeMap<K, V>,
    key: &K,
    id: u32,
    kind: &'static str,
    file: &Path,
) -> Result<(), DataLoadError> {
    if map.contains_key(key) {
        Err(DataLoadError::DuplicateId {
            file: file.to_path_buf(),
            id,
            kind,
        })
    } else {
        Ok(())
    }
}

/// Convert a non-negative, finite hour count from a data file.
fn hours(value: f64, field: &'static str, file: &Path) -> Result<SimDuration, DataLoadError> {
    if !value.is_finite() || value < 0.0 {
        return Err(DataLoadError::InvalidValue {
            file: file.to_path_buf(),
            field,
            detail: format!("expected a non-negative number of hours, got {value}"),
        });
    }
    Ok(SimDuration::from_fractional_hours(f64_to_fixed64(value)))
}

// ===========================================================================
// Pipeline
// ===========================================================================

/// Everything loaded from a fleet data directory.
#[derive(Debug, Clone)]
pub struct FleetData {
    /// Declared distribution centers and their display names.
    pub distribution_centers: BTreeMap<DcId, String>,
    pub roster: TruckRoster,
    pub routes: RouteTable,
    pub config: EngineConfig,
}

impl FleetData {
    /// Build an engine over the loaded fleet.
    pub fn into_engine(self) -> Engine {
        Engine::with_routes(self.roster, self.routes, self.config)
    }
}

/// Load a fleet from `dir`.
///
/// `distribution_centers` and `trucks` are required; `routes` and `engine`
/// are optional. Trucks may only reference declared distribution centers,
/// and so may routes.
pub fn load_fleet_data(dir: &Path) -> Result<FleetData, DataLoadError> {
    let distribution_centers = load_dcs(dir)?;
    let roster = load_trucks(dir, &distribution_centers)?;
    let routes = load_routes(dir, &distribution_centers)?;
    let config = load_engine_config(dir)?;

    info!(
        dir = %dir.display(),
        dcs = distribution_centers.len(),
        trucks = roster.len(),
        routes = routes.len(),
        "fleet data loaded"
    );
    Ok(FleetData {
        distribution_centers,
        roster,
        routes,
        config,
    })
}

fn load_dcs(dir: &Path) -> Result<BTreeMap<DcId, String>, DataLoadError> {
    let path = require_data_file(dir, "distribution_centers")?;
    let list: Vec<DcData> = deserialize_list(&path, "distribution_centers")?;
    debug!(file = %path.display(), count = list.len(), "read distribution centers");

    let mut dcs = BTreeMap::new();
    for data in list {
        let id = DcId(data.id);
        check_duplicate(&dcs, &id, data.id, "distribution center", &path)?;
        dcs.insert(id, data.name);
    }
    Ok(dcs)
}

fn load_trucks(
    dir: &Path,
    dcs: &BTreeMap<DcId, String>,
) -> Result<TruckRoster, DataLoadError> {
    let path = require_data_file(dir, "trucks")?;
    let list: Vec<TruckData> = deserialize_list(&path, "trucks")?;
    debug!(file = %path.display(), count = list.len(), "read trucks");

    let mut seen: BTreeMap<TruckId, ()> = BTreeMap::new();
    let mut builder = RosterBuilder::new();
    for data in list {
        let id = TruckId(data.id);
        check_duplicate(&seen, &id, data.id, "truck", &path)?;
        seen.insert(id, ());

        let mut truck = match data.home_dc {
            Some(dc) => Truck::assigned(id, resolve_dc(dcs, dc, &path)?, data.capacity),
            None => Truck::pool(id, data.capacity),
        };
        if data.refrigerated {
            truck = truck.with_refrigeration();
        }
        builder
            .add(truck)
            .map_err(|e| DataLoadError::InvalidTruck {
                file: path.clone(),
                id: data.id,
                detail: e.to_string(),
            })?;
    }
    Ok(builder.build())
}

fn load_routes(
    dir: &Path,
    dcs: &BTreeMap<DcId, String>,
) -> Result<RouteTable, DataLoadError> {
    let mut routes = RouteTable::new();
    let Some(path) = find_data_file(dir, "routes")? else {
        return Ok(routes);
    };
    let list: Vec<RouteData> = deserialize_list(&path, "routes")?;
    debug!(file = %path.display(), count = list.len(), "read routes");

    for data in list {
        let dc = resolve_dc(dcs, data.dc, &path)?;
        let travel = hours(data.travel_hours, "travel_hours", &path)?;
        routes.set(dc, StoreId(data.store), travel);
    }
    Ok(routes)
}

fn load_engine_config(dir: &Path) -> Result<EngineConfig, DataLoadError> {
    let mut config = EngineConfig::default();
    let Some(path) = find_data_file(dir, "engine")? else {
        return Ok(config);
    };
    let data: EngineData = deserialize_file(&path)?;

    if let Some(h) = data.loading_lead_hours {
        config.loading_lead = hours(h, "loading_lead_hours", &path)?;
    }
    if let Some(h) = data.dwell_ceiling_hours {
        config.dwell_ceiling = hours(h, "dwell_ceiling_hours", &path)?;
    }
    if let Some(h) = data.default_travel_hours {
        config.default_travel = hours(h, "default_travel_hours", &path)?;
    }
    if let Some(m) = data.travel_jitter_minutes {
        config.travel_jitter = SimDuration::from_minutes(m);
    }
    if let Some(seed) = data.seed {
        config.seed = seed;
    }
    if let Some(capacity) = data.event_buffer_capacity {
        if capacity == 0 {
            return Err(DataLoadError::InvalidValue {
                file: path,
                field: "event_buffer_capacity",
                detail: "must be at least 1".to_string(),
            });
        }
        config.event_buffer_capacity = capacity;
    }
    debug!(file = %path.display(), seed = config.seed, "read engine settings");
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
