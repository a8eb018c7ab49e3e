pub mod loader;
pub mod schema;

pub use loader::{DataLoadError, FleetData, load_fleet_data};
