use thiserror::Error;

pub type NetCdfResult<T> = Result<T, NetCdfError>;

/// Failures reading an ABI NetCDF file.
#[derive(Error, Debug)]
pub enum NetCdfError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A variable, dimension or attribute the reader requires is absent
    #[error("missing {0}")]
    MissingData(String),

    /// The bytes are not a readable NetCDF-4 file, or a variable has the wrong shape
    #[error("invalid NetCDF: {0}")]
    InvalidFormat(String),
}
