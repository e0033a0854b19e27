// src/lib.rs

//! Probabilistic record deduplication and record linkage.
//!
//! Records arrive as bags of named multi-valued string fields. A batch is
//! first indexed into an inverted index, then each record is re-queried to
//! generate a candidate set, every candidate pair is scored per property,
//! and the per-property evidence is folded into one match probability by a
//! naive-Bayes combination rule. Verdicts above the configured thresholds
//! are routed to match / maybe sinks; confirmed matches can be appended to
//! an equivalence-class store that maintains the transitive closure of the
//! match relation.

pub mod classes;
pub mod comparators;
pub mod config;
pub mod error;
pub mod index;
pub mod matching;
pub mod record;
pub mod utils;

pub use classes::{EquivalenceClassStore, MemoryClassStore, PostgresClassStore};
pub use comparators::{Compare, ComparatorRegistry};
pub use config::{Configuration, IndexOptions, Lookup, Property};
pub use error::{DedupeError, Result};
pub use index::{MemoryIndex, RecordIndex, SearchHit};
pub use matching::{Deduplicator, EquivalenceSink, LogSink, MatchSink, ProcessingStats};
pub use record::Record;
