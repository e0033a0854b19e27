// src/index/tracker.rs

use super::SearchHit;

/// Going deeper multiplies the cost of every query; staying shallow misses
/// matches outright.
const INITIAL_LIMIT: usize = 100;
const SEARCH_EXPANSION_FACTOR: f64 = 1.0;
const RING_SIZE: usize = 10;

/// Estimates the retrieval depth to ask the underlying search for. This
/// parameter is the single biggest influence on matching performance, but
/// setting it too low causes matches to be missed, so the estimate adapts to
/// the observed result sizes.
///
/// Not safe for concurrent use; each matcher owns its own tracker through
/// its index instance.
#[derive(Debug)]
pub struct QueryResultTracker {
    limit: usize,
    /// Ring of the last result sizes, excluding searches that found nothing.
    prevsizes: [usize; RING_SIZE],
    sizeix: usize,
    max_search_hits: usize,
    min_relevance: f32,
}

impl QueryResultTracker {
    pub fn new(max_search_hits: usize, min_relevance: f32) -> Self {
        QueryResultTracker {
            limit: INITIAL_LIMIT,
            prevsizes: [0; RING_SIZE],
            sizeix: 0,
            max_search_hits,
            min_relevance,
        }
    }

    /// The retrieval limit the next query will start from.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Runs one query through the adaptive loop. `search` receives the limit
    /// and must return hits in descending relevance order.
    ///
    /// The query is retried with five times the limit whenever the result
    /// saturates it, capped at `max_search_hits`. Hits below `min_relevance`
    /// are dropped (a prefix cut, since hits arrive ordered). The post-filter
    /// size feeds the ring buffer; each time the ring wraps, the limit grows
    /// to the observed mean times the expansion factor if that is larger.
    pub fn run<F>(&mut self, mut search: F) -> Vec<SearchHit>
    where
        F: FnMut(usize) -> Vec<SearchHit>,
    {
        let mut thislimit = self.limit.min(self.max_search_hits);
        let mut hits;
        loop {
            hits = search(thislimit);
            if hits.len() < thislimit || thislimit >= self.max_search_hits {
                break;
            }
            thislimit = (thislimit * 5).min(self.max_search_hits);
        }

        let raw_count = hits.len();
        let min_relevance = self.min_relevance;
        let matches: Vec<SearchHit> = hits
            .into_iter()
            .take_while(|hit| hit.score >= min_relevance)
            .collect();

        if raw_count > 0 {
            self.prevsizes[self.sizeix] = matches.len();
            self.sizeix += 1;
            if self.sizeix == RING_SIZE {
                self.sizeix = 0;
                if let Some(average) = self.average() {
                    self.limit = self
                        .limit
                        .max((average * SEARCH_EXPANSION_FACTOR) as usize);
                }
            }
        }

        matches
    }

    /// Mean of the non-zero ring entries, if any.
    fn average(&self) -> Option<f64> {
        let mut sum = 0usize;
        let mut count = 0usize;
        for &size in &self.prevsizes {
            if size != 0 {
                sum += size;
                count += 1;
            }
        }
        if count == 0 {
            None
        } else {
            Some(sum as f64 / count as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use std::cell::RefCell;

    fn hits(n: usize, score: f32) -> Vec<SearchHit> {
        (0..n)
            .map(|i| SearchHit {
                doc_id: i as u32,
                score,
                record: Record::new(),
            })
            .collect()
    }

    #[test]
    fn saturated_results_retry_with_five_times_the_limit() {
        let mut tracker = QueryResultTracker::new(10_000, 0.0);
        let limits = RefCell::new(Vec::new());

        let result = tracker.run(|limit| {
            limits.borrow_mut().push(limit);
            hits(limit, 1.0)
        });

        // every attempt saturates, so the loop walks up to the ceiling
        assert_eq!(*limits.borrow(), vec![100, 500, 2500, 10_000]);
        assert_eq!(result.len(), 10_000);
    }

    #[test]
    fn retry_stops_once_the_result_fits() {
        let mut tracker = QueryResultTracker::new(10_000, 0.0);
        let limits = RefCell::new(Vec::new());

        let result = tracker.run(|limit| {
            limits.borrow_mut().push(limit);
            hits(limit.min(320), 1.0)
        });

        assert_eq!(*limits.borrow(), vec![100, 500]);
        assert_eq!(result.len(), 320);
    }

    #[test]
    fn low_relevance_hits_are_filtered() {
        let mut tracker = QueryResultTracker::new(100, 0.5);
        let result = tracker.run(|_| {
            vec![
                SearchHit {
                    doc_id: 0,
                    score: 1.0,
                    record: Record::new(),
                },
                SearchHit {
                    doc_id: 1,
                    score: 0.9,
                    record: Record::new(),
                },
                SearchHit {
                    doc_id: 2,
                    score: 0.3,
                    record: Record::new(),
                },
                SearchHit {
                    doc_id: 3,
                    score: 0.2,
                    record: Record::new(),
                },
            ]
        });
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn limit_grows_when_the_ring_wraps() {
        let mut tracker = QueryResultTracker::new(1_000, 0.0);
        for _ in 0..10 {
            tracker.run(|limit| hits(limit.min(400), 1.0));
        }
        assert_eq!(tracker.limit(), 400);

        // the next query starts from the grown limit
        let limits = RefCell::new(Vec::new());
        tracker.run(|limit| {
            limits.borrow_mut().push(limit);
            hits(10, 1.0)
        });
        assert_eq!(*limits.borrow(), vec![400]);
    }

    #[test]
    fn empty_results_do_not_feed_the_ring() {
        let mut tracker = QueryResultTracker::new(1_000, 0.0);
        for _ in 0..100 {
            tracker.run(|_| Vec::new());
        }
        assert_eq!(tracker.limit(), 100);
    }

    #[test]
    fn limit_never_shrinks() {
        let mut tracker = QueryResultTracker::new(1_000, 0.0);
        for _ in 0..10 {
            tracker.run(|_| hits(3, 1.0));
        }
        // mean of ten size-3 results is far below the current limit
        assert_eq!(tracker.limit(), 100);
    }
}
