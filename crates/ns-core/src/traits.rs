//! Core traits for NextStat renormalisation
//!
//! The yield engine (ns-renorm) never touches a file format directly; it
//! drives a [`DatasetAccessor`] and the storage backend (Parquet today, see
//! ns-ntuple) is plugged in at the call site.

use std::collections::BTreeMap;
use std::path::Path;

use crate::Result;

/// Named weight expressions evaluated together in one dataset pass.
pub type WeightExprs = BTreeMap<String, String>;

/// Per-name weighted sums returned by a dataset pass.
pub type WeightSums = BTreeMap<String, f64>;

/// Access to a tabular event dataset.
///
/// Implementations apply `selection` to every row of the dataset at `path`
/// and return, for every entry of `weights`, the sum of that expression over
/// the surviving rows. All weights are evaluated in a single pass; zero
/// surviving rows yields `0.0` for every name. An empty selection keeps
/// every row.
pub trait DatasetAccessor: Send + Sync {
    /// Sum every weight expression over the rows passing `selection`.
    fn sum_weighted(&self, path: &Path, selection: &str, weights: &WeightExprs)
    -> Result<WeightSums>;

    /// Backend name (e.g. "parquet")
    fn name(&self) -> &str;
}

impl<A: DatasetAccessor + ?Sized> DatasetAccessor for &A {
    fn sum_weighted(
        &self,
        path: &Path,
        selection: &str,
        weights: &WeightExprs,
    ) -> Result<WeightSums> {
        (**self).sum_weighted(path, selection, weights)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
