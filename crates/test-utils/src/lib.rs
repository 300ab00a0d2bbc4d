//! Builders and fixtures for verification tests.
//!
//! Times are hours after 1985-01-01T00Z, see [`t`]. [`generators`] builds
//! observed, forecast and paired series at those hours. [`fixtures`] holds the
//! declarations and pools built from them, among them the regression pool
//! whose errors are all five. [`write_temp_file`] stages project and data
//! files for evaluator runs.
//!
//! ```ignore
//! use test_utils::{assert_approx_eq, create_pairs, single_valued_pool};
//!
//! let pool = single_valued_pool(vec![create_pairs(0, &[(1.0, 2.0)])], None);
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::*;
pub use generators::*;

use std::io::Write;

/// Write `contents` to a named temporary file that lives as long as the handle.
pub fn write_temp_file(suffix: &str, contents: &str) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f64, 1.0_f64, 0.001_f64);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if !(diff <= epsilon) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}
