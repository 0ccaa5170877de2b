//! Run controller: dispatches flavours (sequentially or on a rayon pool) and
//! derives the renormalisation factors.

use std::time::Instant;

use ns_core::{DatasetAccessor, Error, FlavourResult, Result, RunResult};
use rayon::prelude::*;

use crate::config::{FlavourSpec, RenormConfig};
use crate::flavour::{RunInputs, process_flavour};

/// Execution options of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Process flavours concurrently.
    pub parallel: bool,
    /// Worker threads when `parallel` (`0` = rayon default).
    pub threads: usize,
}

impl RunOptions {
    /// Sequential execution.
    pub fn sequential() -> Self {
        Self::default()
    }

    /// Concurrent execution on `threads` workers.
    pub fn parallel(threads: usize) -> Self {
        Self { parallel: true, threads }
    }
}

/// Compute every flavour of `config`.
///
/// A flavour whose computation fails is recorded in
/// [`RunResult::failures`]; the other flavours are unaffected. Only failing to
/// set up the worker pool is an error of the run itself.
pub fn run(
    accessor: &dyn DatasetAccessor,
    config: &RenormConfig,
    options: RunOptions,
) -> Result<RunResult> {
    let inputs = RunInputs::from_config(config);
    let jobs: Vec<(&String, &FlavourSpec)> = config.flavours.iter().collect();
    let start = Instant::now();

    tracing::info!(
        flavours = jobs.len(),
        partitions = inputs.partitions.len(),
        parallel = options.parallel,
        accessor = accessor.name(),
        "starting run"
    );

    let job = |(name, spec): &(&String, &FlavourSpec)| {
        ((*name).clone(), compute_flavour(accessor, &inputs, name, spec))
    };
    let outcomes: Vec<(String, Result<FlavourResult>)> = if options.parallel {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .thread_name(|i| format!("renorm-{i}"))
            .build()
            .map_err(|e| Error::Computation(format!("building worker pool: {e}")))?;
        pool.install(|| jobs.par_iter().map(job).collect())
    } else {
        jobs.iter().map(job).collect()
    };

    let mut result = RunResult::default();
    for (name, outcome) in outcomes {
        match outcome {
            Ok(r) => {
                result.flavours.insert(name, r);
            }
            Err(e) => {
                let e = e.in_flavour(&name);
                tracing::error!("{e}");
                result.failures.insert(name, e.to_string());
            }
        }
    }

    tracing::info!(
        completed = result.flavours.len(),
        failed = result.failures.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "run finished"
    );
    Ok(result)
}

/// Yields and renormalisation factors of one flavour.
pub fn compute_flavour(
    accessor: &dyn DatasetAccessor,
    inputs: &RunInputs,
    name: &str,
    spec: &FlavourSpec,
) -> Result<FlavourResult> {
    let yields = process_flavour(accessor, inputs, name, spec)?;
    if yields.nominal == 0.0 && !yields.systematics.is_empty() {
        tracing::info!(flavour = name, "nominal yield is zero; all factors set to 0");
    }
    let result = FlavourResult::new(yields.nominal, yields.systematics);
    for (key, renorm) in &result.renormalisations {
        if renorm.factor().is_none() {
            tracing::info!(flavour = name, variation = %key, "varied yield is zero; no factor");
        }
    }
    tracing::info!(
        flavour = name,
        nominal = result.nominal,
        variations = result.systematic_yields.len(),
        "flavour done"
    );
    Ok(result)
}
