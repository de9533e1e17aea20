//! libnetcdf-backed [`AbiSource`].
//!
//! libnetcdf only opens paths, so downloaded bytes are spooled to a named
//! temp file that lives as long as the dataset.

use std::io::Write;
use std::sync::Once;

use netcdf::{AttributeValue, Variable};
use projection::Geostationary;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::dataset::{AbiField, AbiSource, ScanAngles};
use crate::error::{NetCdfError, NetCdfResult};

/// Turn off HDF5's stderr diagnostics.
///
/// Reading optional attributes such as `_Unsigned` makes HDF5 print a
/// diagnostic stack even though the miss is handled. Idempotent; call it
/// before the first file is opened.
pub fn silence_hdf5_errors() {
    static QUIET: Once = Once::new();
    QUIET.call_once(|| {
        // SAFETY: null handlers are the documented way to disable auto printing
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// An ABI NetCDF file opened from downloaded bytes.
///
/// Packed variables are assumed to be 16-bit integers, which holds for every
/// ABI L1b radiance and L2 CMI product.
pub struct NetCdfDataset {
    // Field order matters: the handle closes before the spool file is removed
    file: netcdf::File,
    _spool: NamedTempFile,
}

impl NetCdfDataset {
    pub fn from_bytes(data: &[u8]) -> NetCdfResult<Self> {
        silence_hdf5_errors();

        let mut spool = tempfile::Builder::new()
            .prefix("abi-")
            .suffix(".nc")
            .tempfile_in(spool_dir())?;
        spool.write_all(data)?;
        spool.flush()?;

        let file = netcdf::open(spool.path())
            .map_err(|e| NetCdfError::InvalidFormat(format!("not a NetCDF-4 file: {}", e)))?;

        debug!(path = %spool.path().display(), size = data.len(), "Opened ABI dataset");
        Ok(Self {
            file,
            _spool: spool,
        })
    }

    fn variable(&self, name: &str) -> NetCdfResult<Variable<'_>> {
        self.file
            .variable(name)
            .ok_or_else(|| NetCdfError::MissingData(format!("{} variable", name)))
    }

    fn dimension_len(&self, name: &str) -> NetCdfResult<usize> {
        self.file
            .dimension(name)
            .map(|d| d.len())
            .ok_or_else(|| NetCdfError::MissingData(format!("{} dimension", name)))
    }

    /// Coordinate values of a packed 1D scan-angle variable.
    fn coordinate(&self, name: &str, len: usize) -> NetCdfResult<Vec<f64>> {
        let var = self.variable(name)?;
        let scale = required::<f64>(&var, name, "scale_factor")?;
        let offset = required::<f64>(&var, name, "add_offset")?;
        Ok((0..len).map(|i| offset + i as f64 * scale).collect())
    }
}

impl AbiSource for NetCdfDataset {
    fn variable_names(&self) -> Vec<String> {
        self.file.variables().map(|v| v.name()).collect()
    }

    fn read_field(&self, name: &str) -> NetCdfResult<AbiField> {
        let var = self.variable(name)?;
        let dims = var.dimensions();
        if dims.len() != 2 {
            return Err(NetCdfError::InvalidFormat(format!(
                "{} has {} dimensions, expected 2",
                name,
                dims.len()
            )));
        }
        let rows = dims[0].len();
        let cols = dims[1].len();

        let packed: Vec<i16> = var
            .get_values(..)
            .map_err(|e| NetCdfError::InvalidFormat(format!("reading {}: {}", name, e)))?;

        let scale = attr::<f32>(&var, "scale_factor").unwrap_or(1.0);
        let offset = attr::<f32>(&var, "add_offset").unwrap_or(0.0);
        let fill = attr::<i16>(&var, "_FillValue");
        let unsigned = str_attr(&var, "_Unsigned").as_deref() == Some("true");

        let values = packed
            .into_iter()
            .map(|raw| match (Some(raw) == fill, unsigned) {
                (true, _) => f32::NAN,
                (false, true) => raw as u16 as f32 * scale + offset,
                (false, false) => raw as f32 * scale + offset,
            })
            .collect();

        Ok(AbiField {
            name: name.to_string(),
            rows,
            cols,
            values,
            units: str_attr(&var, "units"),
        })
    }

    fn read_scalar(&self, name: &str) -> Option<f64> {
        let var = self.file.variable(name)?;
        let values: Vec<f32> = var.get_values(..).ok()?;
        let value = *values.first()?;
        if Some(value) == attr::<f32>(&var, "_FillValue") || !value.is_finite() {
            return None;
        }
        Some(value as f64)
    }

    fn scan_angles(&self) -> NetCdfResult<ScanAngles> {
        let nx = self.dimension_len("x")?;
        let ny = self.dimension_len("y")?;
        Ok(ScanAngles {
            x: self.coordinate("x", nx)?,
            y: self.coordinate("y", ny)?,
        })
    }

    fn projection(&self) -> NetCdfResult<Geostationary> {
        const MAPPING: &str = "goes_imager_projection";
        let var = self.variable(MAPPING)?;
        Ok(Geostationary::new(
            required::<f64>(&var, MAPPING, "perspective_point_height")?,
            required::<f64>(&var, MAPPING, "semi_major_axis")?,
            required::<f64>(&var, MAPPING, "semi_minor_axis")?,
            required::<f64>(&var, MAPPING, "longitude_of_projection_origin")?,
        ))
    }

    fn global_attribute(&self, name: &str) -> Option<String> {
        match self.file.attribute(name)?.value().ok()? {
            AttributeValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// `/dev/shm` when writable, otherwise the OS temp dir.
fn spool_dir() -> std::path::PathBuf {
    let shm = std::path::Path::new("/dev/shm");
    let writable = shm.is_dir()
        && std::fs::metadata(shm).is_ok_and(|m| !m.permissions().readonly());
    if cfg!(target_os = "linux") && writable {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

/// Numeric attribute lookup. Names are checked first since a direct miss
/// goes through HDF5's error stack.
fn attr<T>(var: &Variable, name: &str) -> Option<T>
where
    T: TryFrom<AttributeValue>,
{
    if !var.attributes().any(|a| a.name() == name) {
        return None;
    }
    T::try_from(var.attribute_value(name)?.ok()?).ok()
}

fn required<T>(var: &Variable, owner: &str, name: &str) -> NetCdfResult<T>
where
    T: TryFrom<AttributeValue>,
{
    attr(var, name).ok_or_else(|| NetCdfError::MissingData(format!("{} {}", owner, name)))
}

fn str_attr(var: &Variable, name: &str) -> Option<String> {
    if !var.attributes().any(|a| a.name() == name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spool_dir_exists() {
        assert!(spool_dir().is_dir());
    }

    #[test]
    fn test_garbage_bytes_are_invalid_format() {
        let result = NetCdfDataset::from_bytes(b"definitely not hdf5");
        assert!(matches!(result, Err(NetCdfError::InvalidFormat(_))));
    }
}
