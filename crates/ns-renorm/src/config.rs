//! Run configuration (YAML/JSON) parsing, semantic validation and pre-run
//! filtering.
//!
//! ```yaml
//! base_path: /data/ntuples/v2.5
//! folders: [1l_resolved, 1l_boosted, 2l_inclusive]
//! nominal_weight: weight_mc*weight_pileup
//! extra_selections:
//!   resolved: "&&nJets>=5"
//! flavours:
//!   ttbb:
//!     selection: HF_class==1
//!     files: [ttbar_PhPy8]
//!     systematics:
//!       - { name: jes, type: weight, up_weight: jes_up_sf, down_weight: jes_down_sf }
//!       - { name: ps, type: sample, up_files: [ttbar_PhH7] }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use ns_core::{Error, Result};
use ns_ntuple::with_data_extension;
use serde::{Deserialize, Serialize};

use crate::selection::{PartitionRule, RESOLVED_CATEGORY};

/// Top-level configuration of a renormalisation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenormConfig {
    /// Directory holding one sub-directory per partition.
    pub base_path: PathBuf,
    /// Partition ("folder") names, in processing order.
    pub folders: Vec<String>,
    /// Nominal event weight expression.
    pub nominal_weight: String,
    /// Extra selection clauses by category (`resolved` is the one applied).
    #[serde(default)]
    pub extra_selections: BTreeMap<String, String>,
    /// Partition rule used on the sample-based systematic path.
    #[serde(default)]
    pub sample_selection: PartitionRule,
    /// Flavour name → flavour definition.
    pub flavours: BTreeMap<String, FlavourSpec>,
}

/// One event category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlavourSpec {
    /// Selection before partition adjustment.
    pub selection: String,
    /// Relative paths of the flavour's files inside every partition.
    pub files: Vec<String>,
    /// Systematic variations evaluated for this flavour.
    #[serde(default)]
    pub systematics: Vec<Systematic>,
}

/// A systematic variation, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Systematic {
    /// Reweighting of the nominal events.
    Weight(WeightSystematic),
    /// Alternate samples replacing the nominal files.
    Sample(SampleSystematic),
}

/// Weight-based variation: `nominal × up` / `nominal × down`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSystematic {
    /// Systematic name.
    pub name: String,
    /// Up factor, multiplied with the nominal weight.
    pub up_weight: String,
    /// Down factor, multiplied with the nominal weight.
    pub down_weight: String,
}

/// Sample-based variation read from alternate files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSystematic {
    /// Systematic name.
    pub name: String,
    /// Files of the up variation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_files: Option<Vec<String>>,
    /// Files of the down variation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down_files: Option<Vec<String>>,
    /// Extra factor on the nominal weight for the up files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_weight: Option<String>,
    /// Extra factor on the nominal weight for the down files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down_weight: Option<String>,
}

impl Systematic {
    /// Systematic name.
    pub fn name(&self) -> &str {
        match self {
            Systematic::Weight(w) => &w.name,
            Systematic::Sample(s) => &s.name,
        }
    }

    /// `"weight"` or `"sample"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Systematic::Weight(_) => "weight",
            Systematic::Sample(_) => "sample",
        }
    }
}

/// Read and validate a configuration file.
///
/// `.json` files are parsed as JSON, everything else as YAML.
pub fn read_config(path: &Path) -> Result<RenormConfig> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("reading {}: {}", path.display(), e)))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let cfg = if ext == "json" {
        RenormConfig::from_json_str(&text)
    } else {
        RenormConfig::from_yaml_str(&text)
    };
    cfg.map_err(|e| match e {
        Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

impl RenormConfig {
    /// Parse and validate YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let probe: serde_yaml_ng::Value =
            serde_yaml_ng::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        if probe.is_null() {
            return Err(Error::Config("empty configuration".into()));
        }
        let cfg: RenormConfig =
            serde_yaml_ng::from_value(probe).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(Error::Config("empty configuration".into()));
        }
        let cfg: RenormConfig =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// The `resolved` extra-selection clause, if configured.
    pub fn resolved_clause(&self) -> Option<&str> {
        self.extra_selections.get(RESOLVED_CATEGORY).map(String::as_str)
    }

    /// Semantic checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.folders.is_empty() {
            return Err(Error::Config("'folders' must list at least one partition".into()));
        }
        if self.nominal_weight.trim().is_empty() {
            return Err(Error::Config("'nominal_weight' must not be empty".into()));
        }
        if self.flavours.is_empty() {
            return Err(Error::Config("'flavours' must define at least one flavour".into()));
        }

        let resolved: Vec<&String> =
            self.folders.iter().filter(|f| self.gets_resolved_clause(f)).collect();
        if !resolved.is_empty() && self.resolved_clause().is_none() {
            return Err(Error::Config(format!(
                "partitions {resolved:?} need 'extra_selections.{RESOLVED_CATEGORY}'"
            )));
        }

        for (name, flavour) in &self.flavours {
            let in_flavour = |msg: String| Error::Config(format!("flavour '{name}': {msg}"));
            flavour.validate().map_err(in_flavour)?;
            // the clause is appended verbatim and cannot stand on its own
            if !resolved.is_empty() && flavour.selection.trim().is_empty() {
                return Err(in_flavour(format!(
                    "empty 'selection' cannot take the '{RESOLVED_CATEGORY}' clause of {resolved:?}"
                )));
            }
        }
        Ok(())
    }

    /// Whether either selection path appends the `resolved` clause in `partition`.
    fn gets_resolved_clause(&self, partition: &str) -> bool {
        PartitionRule::Standard.needs_resolved_clause(partition)
            || self.sample_selection.needs_resolved_clause(partition)
    }

    /// Keep only the flavours in `names`. An empty list keeps everything.
    pub fn retain_flavours(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        if let Some(unknown) = names.iter().find(|n| !self.flavours.contains_key(*n)) {
            return Err(Error::Config(format!("unknown flavour '{unknown}'")));
        }
        self.flavours.retain(|name, _| names.contains(name));
        Ok(())
    }

    /// Keep only the systematics named in `names`, in every flavour. An empty
    /// list keeps everything.
    pub fn retain_systematics(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let known: HashSet<&str> = self
            .flavours
            .values()
            .flat_map(|f| f.systematics.iter().map(Systematic::name))
            .collect();
        if let Some(unknown) = names.iter().find(|n| !known.contains(n.as_str())) {
            return Err(Error::Config(format!("unknown systematic '{unknown}'")));
        }
        for flavour in self.flavours.values_mut() {
            flavour.systematics.retain(|s| names.iter().any(|n| n == s.name()));
        }
        Ok(())
    }

    /// Every data file a run reads, resolved against `base_path` and deduplicated.
    pub fn data_files(&self) -> BTreeSet<PathBuf> {
        let mut files = BTreeSet::new();
        for flavour in self.flavours.values() {
            let samples = flavour.systematics.iter().filter_map(|s| match s {
                Systematic::Sample(s) => Some(s),
                Systematic::Weight(_) => None,
            });
            let names = flavour.files.iter().chain(
                samples.flat_map(|s| [&s.up_files, &s.down_files].into_iter().flatten().flatten()),
            );
            for name in names {
                for partition in &self.folders {
                    files.insert(with_data_extension(self.base_path.join(partition).join(name)));
                }
            }
        }
        files
    }

    /// Compile every expression the run will evaluate and return the columns
    /// they read.
    ///
    /// Selections are checked as composed for each partition, so a malformed
    /// extra-selection clause is reported here rather than mid-run.
    pub fn check_expressions(&self) -> Result<BTreeSet<String>> {
        let composer = crate::selection::SelectionComposer::from_config(self);
        let mut columns = BTreeSet::new();

        collect_columns(&mut columns, "nominal_weight", &self.nominal_weight)?;
        for (name, flavour) in &self.flavours {
            for partition in &self.folders {
                let selections = [
                    composer.nominal(&flavour.selection, partition),
                    composer.sample(&flavour.selection, partition),
                ];
                let what = format!("flavour '{name}' selection in '{partition}'");
                for sel in selections.iter().filter(|s| !s.trim().is_empty()) {
                    collect_columns(&mut columns, &what, sel.as_ref())?;
                }
            }
            for sys in &flavour.systematics {
                let what = format!("flavour '{name}' systematic '{}'", sys.name());
                match sys {
                    Systematic::Weight(w) => {
                        collect_columns(&mut columns, &what, &w.up_weight)?;
                        collect_columns(&mut columns, &what, &w.down_weight)?;
                    }
                    Systematic::Sample(s) => {
                        for w in [&s.up_weight, &s.down_weight].into_iter().flatten() {
                            collect_columns(&mut columns, &what, w)?;
                        }
                    }
                }
            }
        }
        Ok(columns)
    }
}

fn collect_columns(columns: &mut BTreeSet<String>, what: &str, expr: &str) -> Result<()> {
    let cols = ns_ntuple::referenced_columns(expr)
        .map_err(|e| Error::Validation(format!("{what}: {e}")))?;
    columns.extend(cols);
    Ok(())
}

impl FlavourSpec {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.files.is_empty() {
            return Err("'files' must list at least one file".into());
        }
        let mut seen = HashSet::new();
        for sys in &self.systematics {
            let name = sys.name();
            if name.trim().is_empty() {
                return Err("systematic with empty name".into());
            }
            if !seen.insert(name) {
                return Err(format!("duplicate systematic '{name}'"));
            }
            match sys {
                Systematic::Weight(w) => {
                    if w.up_weight.trim().is_empty() || w.down_weight.trim().is_empty() {
                        return Err(format!(
                            "weight systematic '{name}' needs up_weight and down_weight"
                        ));
                    }
                }
                Systematic::Sample(s) => {
                    if s.up_files.is_none() && s.down_files.is_none() {
                        return Err(format!(
                            "sample systematic '{name}' needs up_files and/or down_files"
                        ));
                    }
                    if [&s.up_files, &s.down_files].into_iter().flatten().any(Vec::is_empty) {
                        return Err(format!(
                            "sample systematic '{name}' has an empty file list; \
                             omit the direction instead"
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
