//! [`DatasetAccessor`] backed by Parquet event tables.

use std::path::{Path, PathBuf};

use ns_core::{DatasetAccessor, Error, Result, WeightExprs, WeightSums};

use crate::expr::ExprSet;
use crate::parquet::{DEFAULT_BATCH_SIZE, scan_parquet};

/// Extension of event-table files, without the leading dot.
pub const DATA_FILE_EXTENSION: &str = "parquet";

/// Append [`DATA_FILE_EXTENSION`] to `path` unless it already ends with it.
///
/// `ttbar.parquet` stays as is; `ttbar` and `ttbar.v2` become
/// `ttbar.parquet` and `ttbar.v2.parquet`.
pub fn with_data_extension(path: impl Into<PathBuf>) -> PathBuf {
    let path = path.into();
    if path.extension().is_some_and(|ext| ext == DATA_FILE_EXTENSION) {
        return path;
    }
    let mut raw = path.into_os_string();
    raw.push(".");
    raw.push(DATA_FILE_EXTENSION);
    PathBuf::from(raw)
}

/// Sums weights over flat Parquet event tables.
#[derive(Debug, Clone)]
pub struct ParquetAccessor {
    batch_size: usize,
}

impl ParquetAccessor {
    /// Accessor with the default batch size.
    pub fn new() -> Self {
        Self { batch_size: DEFAULT_BATCH_SIZE }
    }

    /// Set the number of rows decoded per batch.
    pub fn batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows.max(1);
        self
    }
}

impl Default for ParquetAccessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetAccessor for ParquetAccessor {
    fn sum_weighted(
        &self,
        path: &Path,
        selection: &str,
        weights: &WeightExprs,
    ) -> Result<WeightSums> {
        let exprs = ExprSet::compile(selection, weights).map_err(|e| {
            Error::Dataset(format!("compiling expressions for {}: {}", path.display(), e))
        })?;

        let summary = scan_parquet(path, &exprs, self.batch_size)
            .map_err(|e| Error::Dataset(format!("reading {}: {}", path.display(), e)))?;

        tracing::debug!(
            path = %path.display(),
            rows = summary.rows,
            selected = summary.selected,
            weights = exprs.n_weights(),
            "event table scanned"
        );

        Ok(exprs.weight_names().map(str::to_string).zip(summary.sums).collect())
    }

    fn name(&self) -> &str {
        "parquet"
    }
}
