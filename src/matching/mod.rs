// src/matching/mod.rs

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::classes::EquivalenceClassStore;
use crate::config::Configuration;
use crate::error::{DedupeError, Result};
use crate::record::Record;

mod engine;

pub use engine::{Deduplicator, ProcessingStats};

/// Receives verdicts as the engine scores a batch. Probabilities are in
/// `(0.5, 1]`. Sink failures abort the run; partial-batch progress is
/// whatever the sink has already seen.
#[async_trait]
pub trait MatchSink {
    /// The pair cleared the match threshold.
    async fn on_match(&mut self, r1: &Record, r2: &Record, probability: f64) -> Result<()>;

    /// The pair landed between the maybe threshold and the match threshold
    /// and is flagged for manual review.
    async fn on_maybe(&mut self, r1: &Record, r2: &Record, probability: f64) -> Result<()>;

    /// The record produced no verdict at all.
    async fn on_no_match(&mut self, record: &Record) -> Result<()>;
}

/// Reports every verdict through the log facade. Useful as an outermost
/// sink while wiring up a pipeline.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl MatchSink for LogSink {
    async fn on_match(&mut self, r1: &Record, r2: &Record, probability: f64) -> Result<()> {
        info!("match {:.4}: {:?} <-> {:?}", probability, r1, r2);
        Ok(())
    }

    async fn on_maybe(&mut self, r1: &Record, r2: &Record, probability: f64) -> Result<()> {
        info!("maybe {:.4}: {:?} <-> {:?}", probability, r1, r2);
        Ok(())
    }

    async fn on_no_match(&mut self, record: &Record) -> Result<()> {
        debug!("no match for {:?}", record);
        Ok(())
    }
}

/// Appends confirmed matches to an equivalence-class store, keyed by the
/// configured identity property. Maybes and no-matches are ignored; only
/// confirmed matches grow the transitive closure.
pub struct EquivalenceSink<S> {
    store: S,
    id_property: String,
}

impl<S: EquivalenceClassStore + Send> EquivalenceSink<S> {
    pub fn new(config: &Configuration, store: S) -> Result<Self> {
        let id_property = config
            .identity_properties()
            .next()
            .ok_or_else(|| {
                DedupeError::Config(
                    "equivalence sink requires an identity property in the configuration"
                        .to_string(),
                )
            })?
            .name()
            .to_string();
        Ok(EquivalenceSink { store, id_property })
    }

    /// Hands the store back, typically to commit it.
    pub fn into_inner(self) -> S {
        self.store
    }
}

#[async_trait]
impl<S: EquivalenceClassStore + Send> MatchSink for EquivalenceSink<S> {
    async fn on_match(&mut self, r1: &Record, r2: &Record, probability: f64) -> Result<()> {
        let (Some(id1), Some(id2)) = (r1.value(&self.id_property), r2.value(&self.id_property))
        else {
            warn!(
                "match at {:.4} dropped: a record lacks the '{}' identity value",
                probability, self.id_property
            );
            return Ok(());
        };
        debug!("linking {} <-> {} at {:.4}", id1, id2, probability);
        self.store.add_link(id1, id2).await
    }

    async fn on_maybe(&mut self, _r1: &Record, _r2: &Record, _probability: f64) -> Result<()> {
        Ok(())
    }

    async fn on_no_match(&mut self, _record: &Record) -> Result<()> {
        Ok(())
    }
}
