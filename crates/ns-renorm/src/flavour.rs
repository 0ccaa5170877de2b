//! Per-flavour yield aggregation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ns_core::{DatasetAccessor, Error, NOMINAL_KEY, Result, YieldAccumulator};
use ns_ntuple::with_data_extension;

use crate::config::{FlavourSpec, RenormConfig, Systematic};
use crate::selection::SelectionComposer;
use crate::systematics::{process_sample, weight_set};

/// Read-only snapshot of the run-wide settings shared by every flavour task.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInputs {
    /// Dataset root.
    pub base_path: PathBuf,
    /// Partition names, in processing order.
    pub partitions: Vec<String>,
    /// Nominal event weight expression.
    pub nominal_weight: String,
    /// Partition-dependent selection builder.
    pub composer: SelectionComposer,
}

impl RunInputs {
    /// Snapshot of `config`.
    pub fn from_config(config: &RenormConfig) -> Self {
        Self {
            base_path: config.base_path.clone(),
            partitions: config.folders.clone(),
            nominal_weight: config.nominal_weight.clone(),
            composer: SelectionComposer::from_config(config),
        }
    }

    /// `<base>/<partition>/<file>` with the data-file extension ensured.
    pub fn data_path(&self, partition: &str, file: &str) -> PathBuf {
        with_data_extension(self.base_path.join(partition).join(file))
    }
}

/// Raw yields of one flavour.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlavourYields {
    /// Nominal yield summed over partitions and files.
    pub nominal: f64,
    /// Variation key (`<name>_up` / `<name>_down`) → yield.
    pub systematics: BTreeMap<String, f64>,
}

/// Compute the nominal and every systematic yield of one flavour.
///
/// The nominal weight and all weight-based variations are evaluated in one
/// accessor call per (partition, file). Sample-based variations then read
/// their own files.
pub fn process_flavour(
    accessor: &dyn DatasetAccessor,
    inputs: &RunInputs,
    name: &str,
    spec: &FlavourSpec,
) -> Result<FlavourYields> {
    let weights = weight_set(&inputs.nominal_weight, &spec.systematics);

    let mut acc = YieldAccumulator::empty();
    for partition in &inputs.partitions {
        let selection = inputs.composer.nominal(&spec.selection, partition);
        for file in &spec.files {
            let path = inputs.data_path(partition, file);
            tracing::debug!(
                flavour = name,
                path = %path.display(),
                n_weights = weights.len(),
                "summing"
            );
            let sums = accessor.sum_weighted(&path, &selection, &weights)?;
            acc.merge_sums(&sums);
        }
    }

    let mut systematics = acc.into_totals();
    let nominal = systematics.remove(NOMINAL_KEY).ok_or_else(|| {
        Error::Computation(format!("{} returned no '{NOMINAL_KEY}' sum", accessor.name()))
    })?;

    let mut samples = YieldAccumulator::empty();
    for sys in &spec.systematics {
        if let Systematic::Sample(s) = sys {
            process_sample(accessor, inputs, &spec.selection, s, &mut samples)?;
        }
    }
    systematics.extend(samples.into_totals());

    Ok(FlavourYields { nominal, systematics })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use ns_core::{WeightExprs, WeightSums};

    use super::*;
    use crate::config::{SampleSystematic, WeightSystematic};
    use crate::selection::PartitionRule;
    use crate::test_support::ScriptedAccessor;

    fn inputs(partitions: &[&str]) -> RunInputs {
        RunInputs {
            base_path: PathBuf::from("/data"),
            partitions: partitions.iter().map(|p| p.to_string()).collect(),
            nominal_weight: "w".into(),
            composer: SelectionComposer::new("&&nJets>=5", PartitionRule::Standard),
        }
    }

    fn jes() -> Systematic {
        Systematic::Weight(WeightSystematic {
            name: "jes".into(),
            up_weight: "jes_up_sf".into(),
            down_weight: "jes_down_sf".into(),
        })
    }

    fn spec(files: &[&str], systematics: Vec<Systematic>) -> FlavourSpec {
        FlavourSpec {
            selection: "HF==1".into(),
            files: files.iter().map(|f| f.to_string()).collect(),
            systematics,
        }
    }

    #[test]
    fn data_path_appends_extension_once() {
        let i = inputs(&["p"]);
        assert_eq!(i.data_path("p", "ttbar"), PathBuf::from("/data/p/ttbar.parquet"));
        assert_eq!(i.data_path("p", "ttbar.parquet"), PathBuf::from("/data/p/ttbar.parquet"));
    }

    #[test]
    fn weight_yields_sum_over_partitions_and_files() {
        // value depends on partition and file so the sum is checkable
        let accessor = ScriptedAccessor::new(|path: &Path, _: &str, name: &str, _: &str| {
            let base = if path.starts_with("/data/1l_boosted") { 10.0 } else { 1.0 };
            let file = if path.ends_with("b.parquet") { 2.0 } else { 1.0 };
            let w = match name {
                "nominal" => 1.0,
                "jes_up" => 1.1,
                _ => 0.9,
            };
            Ok(base * file * w)
        });
        let i = inputs(&["1l_resolved", "1l_boosted"]);
        let y = process_flavour(&accessor, &i, "ttbb", &spec(&["a", "b"], vec![jes()])).unwrap();

        // (1 + 10) * (1 + 2) = 33
        approx::assert_relative_eq!(y.nominal, 33.0, epsilon = 1e-12);
        approx::assert_relative_eq!(y.systematics["jes_up"], 36.3, epsilon = 1e-9);
        approx::assert_relative_eq!(y.systematics["jes_down"], 29.7, epsilon = 1e-9);
        assert_eq!(y.systematics.len(), 2);
        assert!(!y.systematics.contains_key("nominal"));

        // one call per (partition, file), every weight in that call
        let calls = accessor.calls();
        assert_eq!(calls.len(), 4);
        assert!(calls.iter().all(|c| c.weights.len() == 3));
        assert_eq!(calls[0].path, PathBuf::from("/data/1l_resolved/a.parquet"));
        assert_eq!(calls[1].path, PathBuf::from("/data/1l_resolved/b.parquet"));
        assert_eq!(calls[0].selection, "HF==1&&nJets>=5");
        assert_eq!(calls[2].selection, "HF==1");
    }

    #[test]
    fn no_systematics_gives_empty_map() {
        let accessor = ScriptedAccessor::new(|_, _, _, _| Ok(7.0));
        let y = process_flavour(&accessor, &inputs(&["1l_resolved"]), "f", &spec(&["a"], vec![]))
            .unwrap();
        assert_eq!(y.nominal, 7.0);
        assert!(y.systematics.is_empty());
    }

    #[test]
    fn sample_variations_are_added_after_nominal_pass() {
        let accessor = ScriptedAccessor::new(|path: &Path, _: &str, _: &str, _: &str| {
            Ok(if path.ends_with("alt.parquet") { 4.0 } else { 5.0 })
        });
        let ps = Systematic::Sample(SampleSystematic {
            name: "ps".into(),
            up_files: None,
            down_files: Some(vec!["alt".into()]),
            up_weight: None,
            down_weight: None,
        });
        let i = inputs(&["1l_resolved", "2l_x"]);
        let y = process_flavour(&accessor, &i, "f", &spec(&["a"], vec![jes(), ps])).unwrap();
        assert_eq!(y.nominal, 10.0);
        assert_eq!(y.systematics["ps_down"], 8.0);
        assert!(!y.systematics.contains_key("ps_up"));
        assert_eq!(y.systematics.len(), 3);

        // 2 nominal-pass calls, then 2 sample calls with a single weight
        let calls = accessor.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[2].weights.len(), 1);
    }

    #[test]
    fn dataset_error_aborts_flavour() {
        let accessor = ScriptedAccessor::new(|path: &Path, _: &str, _: &str, _: &str| {
            if path.starts_with("/data/broken") {
                Err(Error::Dataset("no such file".into()))
            } else {
                Ok(1.0)
            }
        });
        let err = process_flavour(&accessor, &inputs(&["ok", "broken"]), "f", &spec(&["a"], vec![]))
            .unwrap_err();
        assert!(err.to_string().contains("no such file"));
    }

    /// Answers every weight except the nominal one.
    struct NoNominal;

    impl DatasetAccessor for NoNominal {
        fn sum_weighted(&self, _: &Path, _: &str, weights: &WeightExprs) -> Result<WeightSums> {
            Ok(weights.keys().filter(|k| *k != NOMINAL_KEY).map(|k| (k.clone(), 1.0)).collect())
        }

        fn name(&self) -> &str {
            "no-nominal"
        }
    }

    #[test]
    fn missing_nominal_sum_is_an_error() {
        let i = inputs(&["1l_resolved"]);
        let err = process_flavour(&NoNominal, &i, "f", &spec(&["a"], vec![jes()])).unwrap_err();
        assert!(matches!(err, Error::Computation(_)), "{err}");
        assert!(err.to_string().contains("no-nominal"), "{err}");
    }
}
