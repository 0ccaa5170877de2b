//! # ns-ntuple
//!
//! Flat event tables for NextStat.
//!
//! Evaluates selection and weight expressions over columnar event data
//! stored as Parquet and exposes the result through
//! [`ns_core::DatasetAccessor`]. One call reads each file once, however many
//! weights are requested.
//!
//! ## Converting ROOT ntuples
//!
//! ROOT files are not read directly; each TTree (for instance `nominal_Loose`)
//! is converted once into one flat Parquet table per input file, keeping the
//! branches the selections and weights use. Any converter that writes plain
//! numeric columns works, e.g. with uproot and pyarrow:
//!
//! ```text
//! import uproot, pyarrow as pa, pyarrow.parquet as pq
//! tree = uproot.open("1l_resolved/ttbar_PhPy8.root")["nominal_Loose"]
//! pq.write_table(pa.table(tree.arrays(library="np")), "1l_resolved/ttbar_PhPy8.parquet")
//! ```
//!
//! or `ROOT::RDataFrame("nominal_Loose", path).Snapshot(...)` to Parquet via
//! an Arrow bridge. Jagged branches must be reduced to scalars first; list
//! columns are rejected. The output keeps the `<base>/<partition>/<file>`
//! layout so configured file names resolve unchanged.
//!
//! ## Example
//!
//! ```no_run
//! use ns_core::{DatasetAccessor, WeightExprs};
//! use ns_ntuple::ParquetAccessor;
//!
//! let weights = WeightExprs::from([("nominal".to_string(), "weight_mc".to_string())]);
//! let sums = ParquetAccessor::new()
//!     .sum_weighted(std::path::Path::new("ttbar.parquet"), "nJets >= 4", &weights)
//!     .unwrap();
//! println!("yield: {}", sums["nominal"]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accessor;
pub mod error;
pub mod expr;
pub mod parquet;

pub use accessor::{DATA_FILE_EXTENSION, ParquetAccessor, with_data_extension};
pub use error::{NtupleError, Result};
pub use expr::{CompiledExpr, ExprSet, referenced_columns};
pub use parquet::{
    DEFAULT_BATCH_SIZE, ScanSummary, scan_parquet, write_batches, write_event_table,
};
