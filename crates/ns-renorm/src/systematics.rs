//! Weight-based and sample-based systematic processors.

use std::collections::BTreeMap;

use ns_core::{
    DatasetAccessor, Direction, Error, NOMINAL_KEY, Result, WeightExprs, YieldAccumulator,
};

use crate::config::{SampleSystematic, Systematic, WeightSystematic};
use crate::flavour::RunInputs;

/// `nominal × factor`, each side parenthesised.
pub fn combine_weights(nominal: &str, factor: &str) -> String {
    format!("({nominal})*({factor})")
}

impl WeightSystematic {
    /// `(<name>_up, expr)` and `(<name>_down, expr)` on top of `nominal`.
    pub fn weight_exprs(&self, nominal: &str) -> [(String, String); 2] {
        [
            (Direction::Up.key(&self.name), combine_weights(nominal, &self.up_weight)),
            (Direction::Down.key(&self.name), combine_weights(nominal, &self.down_weight)),
        ]
    }
}

/// Weight set evaluated in the nominal pass: the nominal weight plus every
/// weight-based variation.
pub fn weight_set(nominal: &str, systematics: &[Systematic]) -> WeightExprs {
    let mut weights = BTreeMap::from([(NOMINAL_KEY.to_string(), nominal.to_string())]);
    for sys in systematics {
        if let Systematic::Weight(w) = sys {
            weights.extend(w.weight_exprs(nominal));
        }
    }
    weights
}

impl SampleSystematic {
    /// Files of one direction, `None` when the direction is not configured.
    pub fn files(&self, direction: Direction) -> Option<&[String]> {
        match direction {
            Direction::Up => self.up_files.as_deref(),
            Direction::Down => self.down_files.as_deref(),
        }
    }

    /// Extra weight factor of one direction (`"1"` when unset).
    pub fn extra_weight(&self, direction: Direction) -> &str {
        let w = match direction {
            Direction::Up => self.up_weight.as_deref(),
            Direction::Down => self.down_weight.as_deref(),
        };
        w.unwrap_or("1")
    }
}

/// Sum every configured direction of a sample systematic over its files and
/// all partitions, storing each total with [`YieldAccumulator::set`].
///
/// Files are the outer loop and partitions the inner one. A direction without
/// files is skipped and leaves no key.
pub fn process_sample(
    accessor: &dyn DatasetAccessor,
    inputs: &RunInputs,
    base_selection: &str,
    sys: &SampleSystematic,
    acc: &mut YieldAccumulator,
) -> Result<()> {
    for direction in Direction::ALL {
        let Some(files) = sys.files(direction) else {
            tracing::info!(
                systematic = %sys.name,
                %direction,
                "no files configured, skipping direction"
            );
            continue;
        };

        let key = direction.key(&sys.name);
        let weights: WeightExprs = BTreeMap::from([(
            key.clone(),
            combine_weights(&inputs.nominal_weight, sys.extra_weight(direction)),
        )]);

        let mut total = 0.0;
        for file in files {
            for partition in &inputs.partitions {
                let path = inputs.data_path(partition, file);
                let selection = inputs.composer.sample(base_selection, partition);
                let sums = accessor.sum_weighted(&path, &selection, &weights)?;
                total += sums.get(&key).copied().ok_or_else(|| {
                    Error::Computation(format!(
                        "{} returned no sum for '{key}' ({})",
                        accessor.name(),
                        path.display()
                    ))
                })?;
            }
        }
        tracing::debug!(key = %key, total, "sample variation summed");
        acc.set(key, total);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::selection::{PartitionRule, SelectionComposer};
    use crate::test_support::ScriptedAccessor;

    fn inputs(rule: PartitionRule) -> RunInputs {
        RunInputs {
            base_path: PathBuf::from("/data"),
            partitions: vec!["1l_resolved".into(), "2l_inclusive".into()],
            nominal_weight: "w".into(),
            composer: SelectionComposer::new("&&nJets>=5", rule),
        }
    }

    fn up_only(name: &str) -> SampleSystematic {
        SampleSystematic {
            name: name.into(),
            up_files: Some(vec!["alt_a".into(), "alt_b.parquet".into()]),
            down_files: None,
            up_weight: None,
            down_weight: None,
        }
    }

    #[test]
    fn weight_set_wraps_factors() {
        let sys = vec![
            Systematic::Weight(WeightSystematic {
                name: "jes".into(),
                up_weight: "a+b".into(),
                down_weight: "c".into(),
            }),
            Systematic::Sample(up_only("ps")),
        ];
        let set = weight_set("w1*w2", &sys);
        assert_eq!(set.len(), 3);
        assert_eq!(set["nominal"], "w1*w2");
        assert_eq!(set["jes_up"], "(w1*w2)*(a+b)");
        assert_eq!(set["jes_down"], "(w1*w2)*(c)");
    }

    #[test]
    fn sample_direction_defaults_to_unit_factor() {
        let s = up_only("ps");
        assert_eq!(s.extra_weight(Direction::Up), "1");
        assert!(s.files(Direction::Down).is_none());
        assert_eq!(s.files(Direction::Up).map(<[String]>::len), Some(2));
    }

    #[test]
    fn files_outer_partitions_inner_and_set_once() {
        let accessor = ScriptedAccessor::new(|_, _, _, _| Ok(2.5));
        let mut acc = YieldAccumulator::empty();
        acc.set("ps_up", 1000.0);
        let i = inputs(PartitionRule::Standard);
        process_sample(&accessor, &i, "HF==1", &up_only("ps"), &mut acc).unwrap();

        // set overwrites the stale value; 2 files x 2 partitions x 2.5
        assert_eq!(acc.get("ps_up"), Some(10.0));
        assert!(!acc.contains("ps_down"));

        let calls = accessor.calls();
        let order: Vec<_> = calls.iter().map(|c| c.path.clone()).collect();
        assert_eq!(
            order,
            vec![
                PathBuf::from("/data/1l_resolved/alt_a.parquet"),
                PathBuf::from("/data/2l_inclusive/alt_a.parquet"),
                PathBuf::from("/data/1l_resolved/alt_b.parquet"),
                PathBuf::from("/data/2l_inclusive/alt_b.parquet"),
            ]
        );
        let expected = vec![("ps_up".to_string(), "(w)*(1)".to_string())];
        assert!(calls.iter().all(|c| c.weights == expected));
        assert_eq!(calls[0].selection, "HF==1&&nJets>=5");
        assert_eq!(calls[1].selection, "HF==1");
    }

    #[test]
    fn boosted_only_rule_changes_dilepton_selection() {
        let accessor = ScriptedAccessor::new(|_, _, _, _| Ok(1.0));
        let mut acc = YieldAccumulator::empty();
        let i = inputs(PartitionRule::BoostedOnly);
        process_sample(&accessor, &i, "HF==1", &up_only("ps"), &mut acc).unwrap();
        let calls = accessor.calls();
        assert_eq!(calls[1].path, PathBuf::from("/data/2l_inclusive/alt_a.parquet"));
        assert_eq!(calls[1].selection, "HF==1&&nJets>=5");
    }

    #[test]
    fn extra_weight_is_applied_per_direction() {
        let sys = SampleSystematic {
            name: "gen".into(),
            up_files: Some(vec!["u".into()]),
            down_files: Some(vec!["d".into()]),
            up_weight: Some("1.1".into()),
            down_weight: None,
        };
        let accessor = ScriptedAccessor::new(|_, _, _, _| Ok(1.0));
        let mut acc = YieldAccumulator::empty();
        process_sample(&accessor, &inputs(PartitionRule::Standard), "", &sys, &mut acc).unwrap();
        let calls = accessor.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0].weights[0].1, "(w)*(1.1)");
        assert_eq!(calls[2].weights[0].1, "(w)*(1)");
        assert_eq!(acc.get("gen_up"), Some(2.0));
        assert_eq!(acc.get("gen_down"), Some(2.0));
    }

    #[test]
    fn accessor_failure_propagates() {
        let accessor = ScriptedAccessor::new(|path, _, _, _| {
            if path.ends_with("alt_b.parquet") {
                Err(Error::Dataset("corrupt".into()))
            } else {
                Ok(1.0)
            }
        });
        let mut acc = YieldAccumulator::empty();
        let i = inputs(PartitionRule::Standard);
        let err = process_sample(&accessor, &i, "", &up_only("ps"), &mut acc).unwrap_err();
        assert!(matches!(err, Error::Dataset(_)));
        assert!(!acc.contains("ps_up"));
    }
}
