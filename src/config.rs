// src/config.rs

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::comparators::{Compare, ExactMatch};
use crate::error::{DedupeError, Result};

/// How a lookup property's tokens contribute to the compound candidate
/// query: `Required` tokens are joined conjunctively (all must match),
/// `Optional` tokens disjunctively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    Required,
    Optional,
}

/// Describes one named field of the configuration: its role in candidate
/// generation, the comparator used to score it, and the probability range
/// the raw comparator score is remapped onto.
#[derive(Clone)]
pub struct Property {
    name: String,
    identity: bool,
    lookup: Option<Lookup>,
    comparator: Arc<dyn Compare>,
    high_probability: f64,
    low_probability: f64,
}

impl Property {
    /// An identity property. Its values globally identify a record instance;
    /// it is excluded from scoring and indexed unanalyzed so exact lookup
    /// succeeds.
    pub fn id(name: &str) -> Self {
        Property {
            name: name.to_string(),
            identity: true,
            lookup: None,
            comparator: Arc::new(ExactMatch),
            high_probability: 1.0,
            low_probability: 0.0,
        }
    }

    /// A scored property. Participates in candidate generation disjunctively
    /// unless reconfigured with [`Property::with_lookup`] or demoted with
    /// [`Property::compare_only`].
    pub fn new(name: &str, comparator: Arc<dyn Compare>, low: f64, high: f64) -> Self {
        Property {
            name: name.to_string(),
            identity: false,
            lookup: Some(Lookup::Optional),
            comparator,
            high_probability: high,
            low_probability: low,
        }
    }

    pub fn with_lookup(mut self, lookup: Lookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Keeps the property out of candidate generation; it still contributes
    /// evidence when scoring a pair.
    pub fn compare_only(mut self) -> Self {
        self.lookup = None;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    pub fn lookup(&self) -> Option<Lookup> {
        self.lookup
    }

    pub fn comparator(&self) -> &Arc<dyn Compare> {
        &self.comparator
    }

    pub fn high_probability(&self) -> f64 {
        self.high_probability
    }

    pub fn low_probability(&self) -> f64 {
        self.low_probability
    }

    /// Scores one value pair: the raw comparator score remapped linearly
    /// onto `[low, high]`. Scores above 1.0 or NaN violate the comparator
    /// contract and are fatal. Raw scores below zero (the weighted
    /// Levenshtein edge case) pass through; the best-of-pairs fold discards
    /// them against its 0.0 floor.
    pub fn compare_values(&self, v1: &str, v2: &str) -> Result<f64> {
        let raw = self.comparator.compare(v1, v2);
        if raw.is_nan() || raw > 1.0 {
            return Err(DedupeError::Comparator {
                value1: v1.to_string(),
                value2: v2.to_string(),
                reason: format!("comparator returned {} which is outside [0, 1]", raw),
            });
        }
        Ok(self.low_probability + raw * (self.high_probability - self.low_probability))
    }

    fn validate(&self) -> Result<()> {
        for (label, p) in [
            ("lowProbability", self.low_probability),
            ("highProbability", self.high_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(DedupeError::Config(format!(
                    "property '{}' has {} = {} outside [0, 1]",
                    self.name, label, p
                )));
            }
        }
        if self.low_probability > self.high_probability {
            return Err(DedupeError::Config(format!(
                "property '{}' has lowProbability {} above highProbability {}",
                self.name, self.low_probability, self.high_probability
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("identity", &self.identity)
            .field("lookup", &self.lookup)
            .field("low", &self.low_probability)
            .field("high", &self.high_probability)
            .finish()
    }
}

/// An ordered set of properties plus the two classification thresholds.
#[derive(Clone, Debug)]
pub struct Configuration {
    properties: Vec<Property>,
    threshold: f64,
    maybe_threshold: f64,
}

impl Configuration {
    pub fn new(properties: Vec<Property>, threshold: f64, maybe_threshold: f64) -> Result<Self> {
        let config = Configuration {
            properties,
            threshold,
            maybe_threshold,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.5 && self.threshold <= 1.0) {
            return Err(DedupeError::Config(format!(
                "threshold {} must be in (0.5, 1]",
                self.threshold
            )));
        }
        if !(self.maybe_threshold > 0.5 && self.maybe_threshold <= self.threshold) {
            return Err(DedupeError::Config(format!(
                "maybeThreshold {} must be in (0.5, threshold {}]",
                self.maybe_threshold, self.threshold
            )));
        }
        let mut seen = HashSet::new();
        for property in &self.properties {
            if !seen.insert(property.name()) {
                return Err(DedupeError::Config(format!(
                    "property '{}' is declared twice",
                    property.name()
                )));
            }
            property.validate()?;
        }
        Ok(())
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Properties participating in candidate generation.
    pub fn lookup_properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter().filter(|p| p.lookup().is_some())
    }

    /// Properties whose values globally identify a record instance.
    pub fn identity_properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter().filter(|p| p.is_identity())
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn maybe_threshold(&self) -> f64 {
        self.maybe_threshold
    }
}

/// Tuning knobs for an index instance.
#[derive(Clone, Debug)]
pub struct IndexOptions {
    /// Filesystem location for the on-disk index. When absent the index
    /// lives in memory only.
    pub path: Option<PathBuf>,
    /// Hard ceiling on retrieval depth per query.
    pub max_search_hits: usize,
    /// Hits whose native relevance score falls below this are dropped.
    pub min_relevance: f32,
}

impl Default for IndexOptions {
    fn default() -> Self {
        IndexOptions {
            path: None,
            max_search_hits: 1_000_000,
            min_relevance: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparators::WeightedLevenshtein;

    fn name_property() -> Property {
        Property::new("name", Arc::new(WeightedLevenshtein::new()), 0.3, 0.9)
    }

    #[test]
    fn thresholds_must_be_ordered_and_above_half() {
        assert!(Configuration::new(vec![name_property()], 0.85, 0.7).is_ok());
        assert!(Configuration::new(vec![name_property()], 0.5, 0.5).is_err());
        assert!(Configuration::new(vec![name_property()], 0.7, 0.85).is_err());
        assert!(Configuration::new(vec![name_property()], 1.2, 0.7).is_err());
    }

    #[test]
    fn duplicate_property_names_are_rejected() {
        let err = Configuration::new(vec![name_property(), name_property()], 0.85, 0.7);
        assert!(matches!(err, Err(DedupeError::Config(_))));
    }

    #[test]
    fn probability_range_is_validated() {
        let bad = Property::new("name", Arc::new(WeightedLevenshtein::new()), 0.9, 0.3);
        assert!(Configuration::new(vec![bad], 0.85, 0.7).is_err());

        let out_of_range = Property::new("name", Arc::new(WeightedLevenshtein::new()), 0.3, 1.5);
        assert!(Configuration::new(vec![out_of_range], 0.85, 0.7).is_err());
    }

    #[test]
    fn compare_values_applies_linear_remap() {
        let property = name_property();
        // identical values score 1.0 raw and land on highProbability
        assert!((property.compare_values("smith", "smith").unwrap() - 0.9).abs() < 1e-9);
        // one letter substitution scores 0.8 raw
        let scored = property.compare_values("smith", "smyth").unwrap();
        assert!((scored - (0.3 + 0.8 * 0.6)).abs() < 1e-9);
    }

    #[test]
    fn out_of_contract_comparator_score_is_fatal() {
        struct Broken;
        impl Compare for Broken {
            fn compare(&self, _: &str, _: &str) -> f64 {
                1.5
            }
            fn is_tokenized(&self) -> bool {
                false
            }
        }
        let property = Property::new("name", Arc::new(Broken), 0.0, 1.0);
        let err = property.compare_values("a", "b").unwrap_err();
        match err {
            DedupeError::Comparator { value1, value2, .. } => {
                assert_eq!(value1, "a");
                assert_eq!(value2, "b");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn role_accessors() {
        let config = Configuration::new(
            vec![
                Property::id("id"),
                name_property().with_lookup(Lookup::Required),
                Property::new("comment", Arc::new(WeightedLevenshtein::new()), 0.4, 0.6)
                    .compare_only(),
            ],
            0.85,
            0.7,
        )
        .unwrap();

        assert_eq!(config.lookup_properties().count(), 1);
        assert_eq!(config.identity_properties().count(), 1);
        assert!(config.property("comment").unwrap().lookup().is_none());
        assert_eq!(
            config.property("name").unwrap().lookup(),
            Some(Lookup::Required)
        );
    }
}
