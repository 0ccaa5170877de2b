//! Scripted in-memory accessor for unit tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ns_core::{DatasetAccessor, Result, WeightExprs, WeightSums};

/// One recorded `sum_weighted` call.
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub path: PathBuf,
    pub selection: String,
    /// `(name, expression)` pairs in key order.
    pub weights: Vec<(String, String)>,
}

/// Answers every weight with `respond(path, selection, weight_name, weight_expr)`
/// and records the calls.
pub(crate) struct ScriptedAccessor<F> {
    respond: F,
    calls: Mutex<Vec<Call>>,
}

impl<F> ScriptedAccessor<F>
where
    F: Fn(&Path, &str, &str, &str) -> Result<f64> + Send + Sync,
{
    pub fn new(respond: F) -> Self {
        Self { respond, calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl<F> DatasetAccessor for ScriptedAccessor<F>
where
    F: Fn(&Path, &str, &str, &str) -> Result<f64> + Send + Sync,
{
    fn sum_weighted(
        &self,
        path: &Path,
        selection: &str,
        weights: &WeightExprs,
    ) -> Result<WeightSums> {
        self.calls.lock().unwrap().push(Call {
            path: path.to_path_buf(),
            selection: selection.to_string(),
            weights: weights.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        });
        weights
            .iter()
            .map(|(name, expr)| Ok((name.clone(), (self.respond)(path, selection, name, expr)?)))
            .collect()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
