//! Sensor geometry to geographic coordinate transforms.
//!
//! Implements the two observation geometries from scratch without external
//! dependencies:
//!
//! - [`Geostationary`]: ABI scan angles (radians) to lon/lat
//! - [`polar`]: radar gate azimuth/range/elevation to lon/lat

pub mod geostationary;
pub mod polar;

pub use geostationary::Geostationary;
pub use polar::{RadarSite, EFFECTIVE_RADIUS_FACTOR};
