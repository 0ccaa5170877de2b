//! # ns-core
//!
//! Core types for NextStat yield renormalisation.
//!
//! This crate holds what every other crate of the workspace agrees on: the
//! [`Error`] type, the [`DatasetAccessor`] trait that separates the yield
//! engine from storage backends, and the mergeable [`YieldAccumulator`]
//! together with the per-flavour and per-run result types.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{DatasetAccessor, WeightExprs, WeightSums};
pub use types::{
    Direction, FlavourResult, NOMINAL_KEY, Renormalisation, RunResult, YieldAccumulator,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
