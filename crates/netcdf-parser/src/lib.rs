//! NetCDF reader for GOES-R ABI imagery.
//!
//! ABI Level 1b (`Rad`) and Level 2 (`CMI`) files are NetCDF-4 with packed
//! 16-bit data, a `goes_imager_projection` grid-mapping variable and `x`/`y`
//! scan-angle coordinates in radians.
//!
//! Reading is split in two layers:
//!
//! - [`AbiSource`]: the narrow view a decoder needs (variable names, one
//!   unpacked field, scalar calibration constants, scan angles, projection)
//! - [`NetCdfDataset`] implements it over libnetcdf, [`MemoryDataset`] over
//!   in-memory arrays for synthetic inputs

pub mod dataset;
pub mod error;
pub mod native;

pub use dataset::{AbiField, AbiSource, MemoryDataset, ScanAngles};
pub use error::{NetCdfError, NetCdfResult};
pub use native::{silence_hdf5_errors, NetCdfDataset};
