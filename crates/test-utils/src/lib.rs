//! Synthetic inputs for atmos tests, so nothing needs network access or
//! checked-in binary fixtures:
//! - Level II archive writer ([`level2`])
//! - ABI dataset generator ([`abi`])
//! - GRIB2 message writer ([`grib2`])
//! - Common sites and times ([`fixtures`])
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod abi;
pub mod fixtures;
pub mod grib2;
pub mod level2;

pub use fixtures::*;

/// Assert two numbers agree within a tolerance. Operands are widened to
/// `f64`, so mixed `f32`/`f64` arguments are fine.
///
/// ```ignore
/// assert_approx_eq!(grid.lat(0), 35.333, 1e-3);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($actual:expr, $expected:expr, $tol:expr) => {{
        let (actual, expected, tol) = ($actual as f64, $expected as f64, $tol as f64);
        assert!(
            (actual - expected).abs() <= tol,
            "values differ by more than {}: actual {}, expected {}",
            tol,
            actual,
            expected
        );
    }};
}
