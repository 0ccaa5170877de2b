//! Yield and renormalisation data types

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Accumulator key of the nominal yield.
pub const NOMINAL_KEY: &str = "nominal";

/// Direction of a systematic variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// +1σ variation
    Up,
    /// −1σ variation
    Down,
}

impl Direction {
    /// Both directions, up first.
    pub const ALL: [Direction; 2] = [Direction::Up, Direction::Down];

    /// Lowercase label (`"up"` / `"down"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    /// Variation key for systematic `name` in this direction (`"<name>_up"`).
    pub fn key(self, name: &str) -> String {
        format!("{}_{}", name, self.as_str())
    }

    /// Split a variation key into its systematic name and direction.
    pub fn split_key(key: &str) -> Option<(&str, Direction)> {
        if let Some(name) = key.strip_suffix("_up") {
            Some((name, Direction::Up))
        } else {
            key.strip_suffix("_down").map(|name| (name, Direction::Down))
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mergeable map of variation key → running yield total.
///
/// Forms a commutative monoid under [`YieldAccumulator::merge`]: the empty
/// accumulator is the identity and a key missing on one side counts as `0`.
/// Keys are never removed; [`YieldAccumulator::into_totals`] consumes the
/// accumulator when the totals are handed on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct YieldAccumulator {
    totals: BTreeMap<String, f64>,
}

impl YieldAccumulator {
    /// Empty accumulator (merge identity).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add `value` to `key`, creating it at `0` first.
    pub fn add(&mut self, key: impl Into<String>, value: f64) {
        *self.totals.entry(key.into()).or_insert(0.0) += value;
    }

    /// Store `value` under `key`, replacing any previous total.
    ///
    /// Used for totals that are computed exactly once (sample-based
    /// variations) rather than accumulated pass by pass.
    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.totals.insert(key.into(), value);
    }

    /// Pointwise sum of two accumulators.
    pub fn merge(mut self, other: YieldAccumulator) -> Self {
        self.merge_from(&other);
        self
    }

    /// In-place pointwise sum.
    pub fn merge_from(&mut self, other: &YieldAccumulator) {
        for (key, value) in &other.totals {
            self.add(key.as_str(), *value);
        }
    }

    /// Add every `(key, value)` pair of a dataset pass.
    pub fn merge_sums<'a, I>(&mut self, sums: I)
    where
        I: IntoIterator<Item = (&'a String, &'a f64)>,
    {
        for (key, value) in sums {
            self.add(key.as_str(), *value);
        }
    }

    /// Current total for `key`, if present.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.totals.get(key).copied()
    }

    /// Whether `key` has been written.
    pub fn contains(&self, key: &str) -> bool {
        self.totals.contains_key(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.totals.len()
    }

    /// True if no key has been written.
    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// Iterate over `(key, total)` in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, f64> {
        self.totals.iter()
    }

    /// Consume the accumulator, returning the totals.
    pub fn into_totals(self) -> BTreeMap<String, f64> {
        self.totals
    }
}

impl FromIterator<(String, f64)> for YieldAccumulator {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        let mut acc = YieldAccumulator::empty();
        for (key, value) in iter {
            acc.add(key, value);
        }
        acc
    }
}

impl std::iter::Sum for YieldAccumulator {
    fn sum<I: Iterator<Item = YieldAccumulator>>(iter: I) -> Self {
        iter.fold(YieldAccumulator::empty(), YieldAccumulator::merge)
    }
}

/// Renormalisation factor of one systematic variation.
///
/// Serialises as a number, or `null` when not applicable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Renormalisation {
    /// Multiplicative correction `nominal / varied`.
    Factor(f64),
    /// No factor can be given (varied yield is zero, or the variation is absent).
    NotApplicable,
}

impl Renormalisation {
    /// Compute `nominal / varied`.
    ///
    /// Zero nominal yield maps to `Factor(0.0)`; a zero varied yield with a
    /// non-zero nominal, or any non-finite quotient, is `NotApplicable`.
    pub fn compute(nominal: f64, varied: f64) -> Self {
        if nominal == 0.0 {
            return Renormalisation::Factor(0.0);
        }
        if varied == 0.0 {
            return Renormalisation::NotApplicable;
        }
        let factor = nominal / varied;
        if factor.is_finite() {
            Renormalisation::Factor(factor)
        } else {
            Renormalisation::NotApplicable
        }
    }

    /// Factor value, if applicable.
    pub fn factor(self) -> Option<f64> {
        match self {
            Renormalisation::Factor(f) => Some(f),
            Renormalisation::NotApplicable => None,
        }
    }
}

/// Nominal and systematic yields of one flavour together with the
/// renormalisation factor of every variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlavourResult {
    /// Nominal yield.
    pub nominal: f64,
    /// Variation key → yield.
    pub systematic_yields: BTreeMap<String, f64>,
    /// Variation key → renormalisation factor.
    pub renormalisations: BTreeMap<String, Renormalisation>,
}

impl FlavourResult {
    /// Build the result, deriving one factor per systematic yield.
    pub fn new(nominal: f64, systematic_yields: BTreeMap<String, f64>) -> Self {
        let renormalisations = systematic_yields
            .iter()
            .map(|(key, &varied)| (key.clone(), Renormalisation::compute(nominal, varied)))
            .collect();
        Self { nominal, systematic_yields, renormalisations }
    }

    /// Yield of `name` in `direction`, if that variation was computed.
    pub fn yield_of(&self, name: &str, direction: Direction) -> Option<f64> {
        self.systematic_yields.get(&direction.key(name)).copied()
    }

    /// Renormalisation of `name` in `direction`; absent variations are
    /// `NotApplicable`.
    pub fn renormalisation_of(&self, name: &str, direction: Direction) -> Renormalisation {
        self.renormalisations
            .get(&direction.key(name))
            .copied()
            .unwrap_or(Renormalisation::NotApplicable)
    }

    /// Distinct systematic names present in this result, sorted.
    pub fn systematic_names(&self) -> Vec<&str> {
        let names: BTreeSet<&str> = self
            .systematic_yields
            .keys()
            .filter_map(|k| Direction::split_key(k).map(|(name, _)| name))
            .collect();
        names.into_iter().collect()
    }
}

/// Outcome of a full run: one result per successful flavour, one diagnostic
/// per failed flavour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Flavour name → result.
    pub flavours: BTreeMap<String, FlavourResult>,
    /// Flavour name → error message, for flavours whose computation failed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, String>,
}

impl RunResult {
    /// True if every flavour completed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
