//! Script evaluation: values, bindings and the two runtime styles
//!
//! A compiled script can run two ways:
//!
//! - [`DirectRuntime`] owns destination rasters and scans every pixel of
//!   the processing area, writing samples as it goes.
//! - [`IndirectRuntime`] computes one position per call and hands the
//!   values back to the caller, which owns the output storage.
//!
//! Both share the evaluation core in `eval`, which walks the AST per
//! pixel with a `Control` flow enum for loop breaks.

pub mod builtins;
pub mod direct;
mod eval;
pub mod indirect;

#[cfg(test)]
mod tests;

pub use direct::{DirectRuntime, ProgressListener, ScanResult};
pub use indirect::IndirectRuntime;

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::image::{SharedDestImage, SharedSourceImage};
use crate::transform::CoordinateTransform;

/// Default per-pixel cap on loop iterations
pub const DEFAULT_MAX_LOOP_ITERATIONS: u64 = 200_000;

/* ===================== Values ===================== */

/// A script value: every number is an `f64`, with NaN as the NoData
/// sentinel; lists hold numbers only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Val {
    Num(f64),
    List(Vec<f64>),
}

impl Val {
    /// The numeric value, if this is not a list
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Val::Num(v) => Some(*v),
            Val::List(_) => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Val::List(_))
    }
}

impl From<f64> for Val {
    fn from(v: f64) -> Self {
        Val::Num(v)
    }
}

/* ===================== Image Bindings ===================== */

/// A source raster together with the world-to-pixel transform used to
/// address it
#[derive(Clone)]
pub(crate) struct SourceBinding {
    pub image: SharedSourceImage,
    pub transform: CoordinateTransform,
}

/// A destination raster keyed by its script variable name
#[derive(Clone)]
pub(crate) struct DestBinding {
    pub name: String,
    pub image: SharedDestImage,
}

/// Lock a shared raster, recovering from a poisoned mutex. A panicking
/// writer leaves samples, not broken invariants, so the data stays usable.
pub(crate) fn lock_image<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
