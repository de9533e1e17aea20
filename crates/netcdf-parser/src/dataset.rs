//! Reader abstraction over ABI datasets.

use std::collections::BTreeMap;

use projection::Geostationary;

use crate::error::{NetCdfError, NetCdfResult};

/// One unpacked 2D data variable.
///
/// `values` are row-major with `rows * cols` entries; fill values are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct AbiField {
    pub name: String,
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f32>,
    pub units: Option<String>,
}

/// Scan-angle coordinates (radians) of each column (`x`) and row (`y`).
#[derive(Debug, Clone, PartialEq)]
pub struct ScanAngles {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// What a decoder needs from an ABI file.
pub trait AbiSource {
    /// Names of every variable in the dataset.
    fn variable_names(&self) -> Vec<String>;

    /// Read and unpack a 2D variable.
    fn read_field(&self, name: &str) -> NetCdfResult<AbiField>;

    /// Read a scalar variable such as `planck_fk1`, `None` when absent or fill.
    fn read_scalar(&self, name: &str) -> Option<f64>;

    fn scan_angles(&self) -> NetCdfResult<ScanAngles>;

    /// Viewing geometry from `goes_imager_projection`.
    fn projection(&self) -> NetCdfResult<Geostationary>;

    /// String-valued global attribute such as `platform_ID`.
    fn global_attribute(&self, name: &str) -> Option<String>;
}

/// In-memory dataset, used for synthetic inputs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    fields: BTreeMap<String, AbiField>,
    scalars: BTreeMap<String, f64>,
    scan: Option<ScanAngles>,
    projection: Option<Geostationary>,
    attributes: BTreeMap<String, String>,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(
        mut self,
        name: &str,
        rows: usize,
        cols: usize,
        values: Vec<f32>,
        units: Option<&str>,
    ) -> Self {
        self.fields.insert(
            name.to_string(),
            AbiField {
                name: name.to_string(),
                rows,
                cols,
                values,
                units: units.map(str::to_string),
            },
        );
        self
    }

    pub fn with_scalar(mut self, name: &str, value: f64) -> Self {
        self.scalars.insert(name.to_string(), value);
        self
    }

    pub fn with_scan_angles(mut self, x: Vec<f64>, y: Vec<f64>) -> Self {
        self.scan = Some(ScanAngles { x, y });
        self
    }

    pub fn with_projection(mut self, projection: Geostationary) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }
}

impl AbiSource for MemoryDataset {
    fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .fields
            .keys()
            .chain(self.scalars.keys())
            .cloned()
            .collect();
        if self.scan.is_some() {
            names.push("x".to_string());
            names.push("y".to_string());
        }
        if self.projection.is_some() {
            names.push("goes_imager_projection".to_string());
        }
        names
    }

    fn read_field(&self, name: &str) -> NetCdfResult<AbiField> {
        let field = self
            .fields
            .get(name)
            .ok_or_else(|| NetCdfError::MissingData(format!("{} variable", name)))?;
        if field.values.len() != field.rows * field.cols {
            return Err(NetCdfError::InvalidFormat(format!(
                "{} has {} values for shape {}x{}",
                name,
                field.values.len(),
                field.rows,
                field.cols
            )));
        }
        Ok(field.clone())
    }

    fn read_scalar(&self, name: &str) -> Option<f64> {
        self.scalars.get(name).copied().filter(|v| v.is_finite())
    }

    fn scan_angles(&self) -> NetCdfResult<ScanAngles> {
        self.scan
            .clone()
            .ok_or_else(|| NetCdfError::MissingData("x/y coordinates".to_string()))
    }

    fn projection(&self) -> NetCdfResult<Geostationary> {
        self.projection
            .clone()
            .ok_or_else(|| NetCdfError::MissingData("goes_imager_projection variable".to_string()))
    }

    fn global_attribute(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }
}
