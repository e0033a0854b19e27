// src/matching/engine.rs

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use super::MatchSink;
use crate::config::{Configuration, Property};
use crate::error::{DedupeError, Result};
use crate::index::RecordIndex;
use crate::record::Record;
use crate::utils::compute_bayes;

/// Consecutive useless hits tolerated per lookup property before candidate
/// iteration gives up. The index returns candidates in decreasing relevance,
/// so a dry stretch this long means no more good ones are coming.
// TODO: make the cutoff configurable per matcher
const CANDIDATE_CUTOFF: usize = 10;

/// Batches below this size are processed without a progress bar.
const PROGRESS_MIN_BATCH: usize = 1_000;

/// Counters for one processed batch.
#[derive(Clone, Debug, Default)]
pub struct ProcessingStats {
    pub records_indexed: usize,
    pub pairs_scored: usize,
    pub matches: usize,
    pub maybes: usize,
    pub no_matches: usize,
    pub elapsed: Duration,
}

/// The matching engine: a two-phase blocking-then-scoring pipeline over an
/// inverted index.
///
/// In deduplication mode a whole batch is indexed and committed before any
/// record is scored, so self-matches inside the batch are visible. In
/// record-linkage mode probes are scored against a previously indexed
/// reference corpus without being inserted themselves.
pub struct Deduplicator<I> {
    config: Arc<Configuration>,
    index: I,
}

impl<I: RecordIndex + Send> Deduplicator<I> {
    pub fn new(config: Arc<Configuration>, index: I) -> Self {
        Deduplicator { config, index }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Indexes a reference batch without scoring it. Record-linkage setups
    /// use this to load the corpus the probes are matched against.
    pub async fn index_batch(&mut self, records: &[Record]) -> Result<()> {
        info!("indexing reference corpus of {} records", records.len());
        for record in records {
            self.index.index(record).await?;
        }
        self.index.commit().await?;
        Ok(())
    }

    /// Deduplication mode. Processes a newly arrived batch of records,
    /// which may contain records seen in earlier batches.
    pub async fn process<S: MatchSink + Send>(
        &mut self,
        records: &[Record],
        sink: &mut S,
    ) -> Result<ProcessingStats> {
        let start = Instant::now();
        let mut stats = ProcessingStats::default();

        info!("indexing batch of {} records", records.len());
        for record in records {
            self.index.index(record).await?;
            stats.records_indexed += 1;
        }
        // every record must be searchable before any record is scored, or
        // self-matches inside the batch are lost
        self.index.commit().await?;

        let progress = if records.len() >= PROGRESS_MIN_BATCH {
            let pb = ProgressBar::new(records.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "  {spinner:.blue} [{elapsed_precise}] {bar:30.green/blue} {pos}/{len} {msg}",
                    )
                    .unwrap()
                    .progress_chars("█▉▊▋▌▍▎▏  "),
            );
            pb.set_message("Scoring records...");
            Some(pb)
        } else {
            None
        };

        for record in records {
            self.match_record(record, sink, &mut stats).await?;
            if let Some(pb) = &progress {
                pb.inc(1);
            }
        }
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        stats.elapsed = start.elapsed();
        info!(
            "batch done: {} pairs scored, {} matches, {} maybes, {} records without a verdict in {:.1?}",
            stats.pairs_scored, stats.matches, stats.maybes, stats.no_matches, stats.elapsed
        );
        Ok(stats)
    }

    async fn match_record<S: MatchSink + Send>(
        &mut self,
        record: &Record,
        sink: &mut S,
        stats: &mut ProcessingStats,
    ) -> Result<()> {
        let config = self.config.clone();

        let mut candidates: HashMap<u32, Record> = HashMap::new();
        for property in config.lookup_properties() {
            let values = record.values(property.name());
            if values.is_empty() {
                continue;
            }
            let hits = self.index.lookup(property, values).await?;

            let mut ix: usize = 0;
            let mut lastmatch: usize = 0;
            for hit in hits {
                if candidates.contains_key(&hit.doc_id) {
                    // a good one, but we already have it
                    lastmatch = ix;
                    continue;
                }
                if self.compare_property(property, record, &hit.record)? > 0.5 {
                    lastmatch = ix;
                }
                // we cut off here since we assume no more good values are coming
                if ix - lastmatch > CANDIDATE_CUTOFF {
                    break;
                }
                candidates.insert(hit.doc_id, hit.record);
                ix += 1;
            }
        }
        debug!("{} candidates accumulated", candidates.len());

        let mut reported = false;
        for candidate in candidates.values() {
            if self.is_same_as(record, candidate) {
                continue;
            }
            let probability = self.compare(record, candidate)?;
            stats.pairs_scored += 1;
            if probability > config.threshold() {
                sink.on_match(record, candidate, probability).await?;
                stats.matches += 1;
                reported = true;
            } else if probability > config.maybe_threshold() {
                sink.on_maybe(record, candidate, probability).await?;
                stats.maybes += 1;
                reported = true;
            }
        }
        if !reported {
            sink.on_no_match(record).await?;
            stats.no_matches += 1;
        }
        Ok(())
    }

    /// Record-linkage mode. Matches a probe against the already-indexed
    /// reference corpus, emitting at most one verdict for the single best
    /// candidate. Returns true iff a confirmed match was found.
    pub async fn link<S: MatchSink + Send>(&mut self, probe: &Record, sink: &mut S) -> Result<bool> {
        let config = self.config.clone();

        let mut candidates: HashMap<u32, Record> = HashMap::new();
        for property in config.lookup_properties() {
            let values = probe.values(property.name());
            if values.is_empty() {
                continue;
            }
            for hit in self.index.lookup(property, values).await? {
                candidates.entry(hit.doc_id).or_insert(hit.record);
            }
        }

        let mut best: Option<(f64, Record)> = None;
        for candidate in candidates.into_values() {
            if self.is_same_as(probe, &candidate) {
                continue;
            }
            let probability = self.compare(probe, &candidate)?;
            if best.as_ref().map_or(true, |(max, _)| probability > *max) {
                best = Some((probability, candidate));
            }
        }

        match best {
            Some((probability, candidate)) if probability > config.threshold() => {
                sink.on_match(probe, &candidate, probability).await?;
                Ok(true)
            }
            Some((probability, candidate)) if probability > config.maybe_threshold() => {
                sink.on_maybe(probe, &candidate, probability).await?;
                Ok(false)
            }
            _ => {
                sink.on_no_match(probe).await?;
                Ok(false)
            }
        }
    }

    /// Combined match probability for a record pair: per-property evidence
    /// folded through the odds form of Bayes from a 0.5 prior. Identity
    /// properties and properties missing on either side carry no evidence.
    pub fn compare(&self, r1: &Record, r2: &Record) -> Result<f64> {
        let mut probability = 0.5;
        for field in r1.fields() {
            let property = self.config.property(field).ok_or_else(|| {
                DedupeError::Config(format!(
                    "record has property '{}' for which there is no configuration",
                    field
                ))
            })?;
            if property.is_identity() {
                continue;
            }
            if r1.values(field).is_empty() || r2.values(field).is_empty() {
                continue;
            }
            let score = self.compare_property(property, r1, r2)?;
            probability = compute_bayes(probability, score);
        }
        Ok(probability)
    }

    /// Best-of-pairs property score: the maximum remapped comparator score
    /// over the cross product of both records' values. The 0.0 floor
    /// discards negative raw scores from the weighted comparator.
    fn compare_property(&self, property: &Property, r1: &Record, r2: &Record) -> Result<f64> {
        let mut high = 0.0f64;
        for v1 in r1.values(property.name()) {
            for v2 in r2.values(property.name()) {
                let score = property.compare_values(v1, v2)?;
                if score > high {
                    high = score;
                }
            }
        }
        Ok(high)
    }

    /// Two records are "the same" when they share a value on any identity
    /// property. Distinct from similarity; this suppresses matching a record
    /// against its own previously indexed copy.
    fn is_same_as(&self, r1: &Record, r2: &Record) -> bool {
        for idprop in self.config.identity_properties() {
            let vs2 = r2.values(idprop.name());
            for v1 in r1.values(idprop.name()) {
                if vs2.contains(v1) {
                    return true;
                }
            }
        }
        false
    }

    /// Releases the index and its underlying resources.
    pub async fn close(mut self) -> Result<()> {
        self.index.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparators::WeightedLevenshtein;
    use crate::config::IndexOptions;
    use crate::index::MemoryIndex;

    fn engine() -> Deduplicator<MemoryIndex> {
        let config = Arc::new(
            Configuration::new(
                vec![
                    Property::id("id"),
                    Property::new("name", Arc::new(WeightedLevenshtein::new()), 0.3, 0.9),
                    Property::new("city", Arc::new(WeightedLevenshtein::new()), 0.4, 0.8),
                ],
                0.85,
                0.7,
            )
            .unwrap(),
        );
        let index = MemoryIndex::open(config.clone(), IndexOptions::default()).unwrap();
        Deduplicator::new(config, index)
    }

    fn record(id: &str, name: &str, city: &str) -> Record {
        Record::from_values([("id", id), ("name", name), ("city", city)])
    }

    #[test]
    fn compare_folds_property_evidence() {
        let engine = engine();
        let r1 = record("1", "john smith", "oslo");
        let r2 = record("2", "john smith", "osln");

        // name: raw 1.0 -> 0.9; city: raw 0.75 -> 0.7
        // bayes(bayes(0.5, 0.9), 0.7) = 0.63 / 0.66
        let probability = engine.compare(&r1, &r2).unwrap();
        assert!((probability - 0.63 / 0.66).abs() < 1e-9);
    }

    #[test]
    fn compare_skips_fields_missing_on_either_side() {
        let engine = engine();
        let r1 = record("1", "john smith", "oslo");
        let r2 = Record::from_values([("id", "2"), ("name", "john smith")]);

        // only the name contributes: bayes(0.5, 0.9) = 0.9
        let probability = engine.compare(&r1, &r2).unwrap();
        assert!((probability - 0.9).abs() < 1e-9);
    }

    #[test]
    fn undeclared_field_fails_the_comparison() {
        let engine = engine();
        let r1 = Record::from_values([("surname", "smith")]);
        let r2 = record("2", "john smith", "oslo");
        assert!(matches!(
            engine.compare(&r1, &r2),
            Err(DedupeError::Config(_))
        ));
    }

    #[test]
    fn shared_identity_value_means_same_record() {
        let engine = engine();
        let r1 = record("1", "john smith", "oslo");
        let r2 = record("1", "completely different", "bergen");
        let r3 = record("2", "john smith", "oslo");

        assert!(engine.is_same_as(&r1, &r2));
        assert!(!engine.is_same_as(&r1, &r3));
    }
}
