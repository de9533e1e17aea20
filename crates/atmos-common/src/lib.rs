//! Shared types for the atmos ingestion workspace.
//!
//! Everything that more than one crate needs to agree on lives here:
//! geographic extents, the canonical timestamp key used in object-store
//! layouts, sensor identifiers and brightness-temperature unit handling.

pub mod bbox;
pub mod error;
pub mod sensor;
pub mod time;
pub mod units;

pub use bbox::BoundingBox;
pub use error::{CommonError, CommonResult};
pub use sensor::{CompositeProduct, SatelliteSector, SensorKind};
pub use time::{parse_iso8601, TimeTarget, TimestampKey};
pub use units::TemperatureStyle;
