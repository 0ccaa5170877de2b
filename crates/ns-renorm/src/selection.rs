//! Partition-dependent selection composition.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::config::RenormConfig;

/// Partition names containing this marker never get the resolved clause.
pub const BOOSTED_MARKER: &str = "boosted";
/// Dilepton partitions (skipped under [`PartitionRule::Standard`]).
pub const DILEPTON_MARKER: &str = "2l_";
/// Key of the clause in `extra_selections` appended to resolved partitions.
pub const RESOLVED_CATEGORY: &str = "resolved";

/// Which partitions count as "resolved".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionRule {
    /// Resolved unless the name contains `boosted` or `2l_`.
    #[default]
    Standard,
    /// Resolved unless the name contains `boosted`.
    BoostedOnly,
}

impl PartitionRule {
    /// Whether `partition` gets the resolved clause under this rule.
    pub fn needs_resolved_clause(self, partition: &str) -> bool {
        match self {
            PartitionRule::Standard => {
                !partition.contains(BOOSTED_MARKER) && !partition.contains(DILEPTON_MARKER)
            }
            PartitionRule::BoostedOnly => !partition.contains(BOOSTED_MARKER),
        }
    }
}

/// Builds effective per-partition selections.
///
/// The clause is appended by plain concatenation; it carries its own
/// connective (`&&nJets>=5`).
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionComposer {
    resolved_clause: String,
    sample_rule: PartitionRule,
}

impl SelectionComposer {
    /// Composer with an explicit clause and sample-path rule.
    pub fn new(resolved_clause: impl Into<String>, sample_rule: PartitionRule) -> Self {
        Self { resolved_clause: resolved_clause.into(), sample_rule }
    }

    /// Composer for a validated configuration.
    pub fn from_config(config: &RenormConfig) -> Self {
        Self::new(config.resolved_clause().unwrap_or_default(), config.sample_selection)
    }

    /// Rule applied on the sample-based path.
    pub fn sample_rule(&self) -> PartitionRule {
        self.sample_rule
    }

    /// Effective selection of `base` in `partition` under `rule`.
    pub fn compose<'a>(&self, base: &'a str, partition: &str, rule: PartitionRule) -> Cow<'a, str> {
        if rule.needs_resolved_clause(partition) {
            Cow::Owned(format!("{base}{}", self.resolved_clause))
        } else {
            Cow::Borrowed(base)
        }
    }

    /// Selection used for the nominal and weight-based yields.
    pub fn nominal<'a>(&self, base: &'a str, partition: &str) -> Cow<'a, str> {
        self.compose(base, partition, PartitionRule::Standard)
    }

    /// Selection used for sample-based variations.
    pub fn sample<'a>(&self, base: &'a str, partition: &str) -> Cow<'a, str> {
        self.compose(base, partition, self.sample_rule)
    }
}
