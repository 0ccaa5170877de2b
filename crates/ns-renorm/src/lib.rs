//! # ns-renorm
//!
//! Template renormalisation for systematic variations.
//!
//! For every flavour of a [`RenormConfig`] the nominal yield and the yield of
//! each systematic variation are summed over all partitions and files; the
//! factor `nominal / varied` then restores the nominal normalisation of the
//! varied template. Weight-based variations share the nominal pass, sample-based
//! variations read their own files.
//!
//! ```no_run
//! use ns_ntuple::ParquetAccessor;
//! use ns_renorm::{RunOptions, read_config, run};
//!
//! let config = read_config(std::path::Path::new("renorm.yaml")).unwrap();
//! let result = run(&ParquetAccessor::new(), &config, RunOptions::parallel(4)).unwrap();
//! ns_renorm::report::write_csv(std::io::stdout(), &result).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod flavour;
pub mod report;
pub mod run;
pub mod selection;
pub mod systematics;

#[cfg(test)]
mod test_support;

pub use config::{
    FlavourSpec, RenormConfig, SampleSystematic, Systematic, WeightSystematic, read_config,
};
pub use flavour::{FlavourYields, RunInputs, process_flavour};
pub use run::{RunOptions, compute_flavour, run};
pub use selection::{PartitionRule, SelectionComposer};
