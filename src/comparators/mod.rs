// src/comparators/mod.rs

use std::collections::HashMap;
use std::sync::Arc;

mod weighted_levenshtein;

pub use weighted_levenshtein::{distance, optimized_distance, WeightEstimator, WeightedLevenshtein};

/// A string similarity measure mapping a pair of values to `[0, 1]`.
///
/// Implementations must be reflexive (`compare(s, s) == 1.0`) and symmetric.
/// Values above 1.0 (or NaN) are a programming error and abort the run; the
/// weighted Levenshtein comparator is documented to produce raw values below
/// zero for inputs of very different lengths, so negatives are tolerated and
/// folded away by the scoring engine.
pub trait Compare: Send + Sync {
    fn compare(&self, v1: &str, v2: &str) -> f64;

    /// Whether the comparator expects tokenized (analyzed) text rather than
    /// verbatim stored values.
    fn is_tokenized(&self) -> bool;
}

/// Exact equality. 1.0 on equal values, 0.0 otherwise.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExactMatch;

impl Compare for ExactMatch {
    fn compare(&self, v1: &str, v2: &str) -> f64 {
        if v1 == v2 {
            1.0
        } else {
            0.0
        }
    }

    fn is_tokenized(&self) -> bool {
        false
    }
}

/// Unit-cost Levenshtein similarity on top of the early-termination kernel.
///
/// Because the kernel may return a lower bound once the distance provably
/// exceeds half the shorter input, scores from this comparator below 0.5 only
/// mean "too far", which is all the candidate filter needs.
#[derive(Clone, Copy, Debug, Default)]
pub struct Levenshtein;

impl Compare for Levenshtein {
    fn compare(&self, v1: &str, v2: &str) -> f64 {
        if v1 == v2 {
            return 1.0;
        }
        let len = v1.chars().count().min(v2.chars().count());
        if len == 0 {
            return 0.0;
        }
        let dist = optimized_distance(v1, v2);
        (1.0 - dist as f64 / len as f64).max(0.0)
    }

    fn is_tokenized(&self) -> bool {
        true
    }
}

/// Jaro-Winkler similarity, which favors strings sharing a common prefix.
#[derive(Clone, Copy, Debug, Default)]
pub struct JaroWinkler;

impl Compare for JaroWinkler {
    fn compare(&self, v1: &str, v2: &str) -> f64 {
        strsim::jaro_winkler(v1, v2)
    }

    fn is_tokenized(&self) -> bool {
        true
    }
}

/// Sorensen-Dice coefficient over character bigrams.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiceCoefficient;

impl Compare for DiceCoefficient {
    fn compare(&self, v1: &str, v2: &str) -> f64 {
        strsim::sorensen_dice(v1, v2)
    }

    fn is_tokenized(&self) -> bool {
        true
    }
}

/// Name-to-comparator dispatch. Pre-seeded with the built-in comparators and
/// open to user-supplied implementations.
pub struct ComparatorRegistry {
    by_name: HashMap<String, Arc<dyn Compare>>,
}

impl ComparatorRegistry {
    pub fn with_builtins() -> Self {
        let mut registry = ComparatorRegistry {
            by_name: HashMap::new(),
        };
        registry.register("exact", Arc::new(ExactMatch));
        registry.register("levenshtein", Arc::new(Levenshtein));
        registry.register("weighted-levenshtein", Arc::new(WeightedLevenshtein::new()));
        registry.register("jaro-winkler", Arc::new(JaroWinkler));
        registry.register("dice-coefficient", Arc::new(DiceCoefficient));
        registry
    }

    pub fn register(&mut self, name: &str, comparator: Arc<dyn Compare>) {
        self.by_name.insert(name.to_string(), comparator);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Compare>> {
        self.by_name.get(name).cloned()
    }
}

impl Default for ComparatorRegistry {
    fn default() -> Self {
        ComparatorRegistry::with_builtins()
    }
}
