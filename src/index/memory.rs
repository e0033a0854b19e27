// src/index/memory.rs

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use super::{analyze, escape_query, QueryResultTracker, RecordIndex, SearchHit};
use crate::config::{Configuration, IndexOptions, Lookup, Property};
use crate::error::{DedupeError, Result};
use crate::record::Record;

const SNAPSHOT_FILE: &str = "segments.json";

/// One term of a compound query, scoped to a field.
struct TermClause {
    field: String,
    term: String,
    required: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredDoc {
    doc_id: u32,
    record: Record,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    committed_at: DateTime<Utc>,
    next_doc_id: u32,
    docs: Vec<StoredDoc>,
}

/// The searchable part of the index: stored documents plus field-scoped
/// postings. Postings keep one entry per term occurrence so term frequency
/// falls out of the list.
#[derive(Default, Debug)]
struct Segment {
    docs: Vec<StoredDoc>,
    postings: HashMap<String, HashMap<String, Vec<usize>>>,
}

impl Segment {
    fn add(&mut self, doc: StoredDoc, config: &Configuration) {
        let position = self.docs.len();
        for field in doc.record.fields() {
            let identity = config
                .property(field)
                .map(|p| p.is_identity())
                .unwrap_or(false);
            let field_postings = self.postings.entry(field.to_string()).or_default();
            for value in doc.record.values(field) {
                if identity {
                    // stored as a single verbatim token so exact lookup works
                    field_postings.entry(value.clone()).or_default().push(position);
                } else {
                    for token in analyze(value) {
                        field_postings.entry(token).or_default().push(position);
                    }
                }
            }
        }
        self.docs.push(doc);
    }

    fn search(&self, clauses: &[TermClause], limit: usize) -> Vec<SearchHit> {
        if clauses.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        struct ClauseMatch {
            required: bool,
            term_freq: HashMap<usize, usize>,
            idf: f32,
        }

        let total_docs = self.docs.len() as f32;
        let matches: Vec<ClauseMatch> = clauses
            .iter()
            .map(|clause| {
                let mut term_freq: HashMap<usize, usize> = HashMap::new();
                if let Some(positions) = self
                    .postings
                    .get(&clause.field)
                    .and_then(|terms| terms.get(&clause.term))
                {
                    for &position in positions {
                        *term_freq.entry(position).or_insert(0) += 1;
                    }
                }
                let idf = (1.0 + total_docs / (1.0 + term_freq.len() as f32)).ln();
                ClauseMatch {
                    required: clause.required,
                    term_freq,
                    idf,
                }
            })
            .collect();

        // required clauses intersect, optional clauses union
        let candidates: HashSet<usize> = if matches.iter().any(|m| m.required) {
            let mut required = matches.iter().filter(|m| m.required);
            let mut set: HashSet<usize> = required
                .next()
                .map(|m| m.term_freq.keys().copied().collect())
                .unwrap_or_default();
            for clause in required {
                set.retain(|doc| clause.term_freq.contains_key(doc));
            }
            set
        } else {
            matches
                .iter()
                .flat_map(|m| m.term_freq.keys().copied())
                .collect()
        };

        let mut scored: Vec<SearchHit> = candidates
            .into_iter()
            .map(|position| {
                let mut score = 0.0f32;
                for clause in &matches {
                    if let Some(&tf) = clause.term_freq.get(&position) {
                        score += clause.idf * (tf as f32).sqrt();
                    }
                }
                SearchHit {
                    doc_id: self.docs[position].doc_id,
                    score,
                    record: self.docs[position].record.clone(),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.doc_id.cmp(&b.doc_id))
        });
        scored.truncate(limit);
        scored
    }
}

/// In-memory inverted index with an optional on-disk snapshot.
///
/// Documents are staged by `index` and become searchable only at `commit`,
/// which also rewrites the snapshot when a path is configured. Opening an
/// index on an existing path reloads the last committed snapshot.
#[derive(Debug)]
pub struct MemoryIndex {
    config: Arc<Configuration>,
    options: IndexOptions,
    committed: Segment,
    staged: Vec<StoredDoc>,
    next_doc_id: u32,
    tracker: QueryResultTracker,
}

impl MemoryIndex {
    pub fn open(config: Arc<Configuration>, options: IndexOptions) -> Result<Self> {
        let tracker = QueryResultTracker::new(options.max_search_hits, options.min_relevance);
        let mut index = MemoryIndex {
            config,
            options,
            committed: Segment::default(),
            staged: Vec::new(),
            next_doc_id: 0,
            tracker,
        };
        if let Some(dir) = index.options.path.clone() {
            let file = dir.join(SNAPSHOT_FILE);
            if file.exists() {
                index.load_snapshot(&file)?;
            }
        }
        Ok(index)
    }

    /// True when the index is held in memory only, with no snapshot backing.
    pub fn is_in_memory(&self) -> bool {
        self.options.path.is_none()
    }

    /// Number of searchable documents.
    pub fn num_docs(&self) -> usize {
        self.committed.docs.len()
    }

    fn load_snapshot(&mut self, file: &Path) -> Result<()> {
        let data = fs::read(file)?;
        let snapshot: Snapshot = serde_json::from_slice(&data).map_err(|e| {
            DedupeError::CorruptIndex(format!(
                "failed to decode snapshot {}: {}",
                file.display(),
                e
            ))
        })?;
        self.next_doc_id = snapshot.next_doc_id;
        let config = self.config.clone();
        for doc in snapshot.docs {
            self.committed.add(doc, &config);
        }
        debug!(
            "loaded {} documents from snapshot {}",
            self.committed.docs.len(),
            file.display()
        );
        Ok(())
    }

    fn write_snapshot(&self) -> Result<()> {
        let Some(dir) = &self.options.path else {
            return Ok(());
        };
        fs::create_dir_all(dir)?;
        let snapshot = Snapshot {
            committed_at: Utc::now(),
            next_doc_id: self.next_doc_id,
            docs: self.committed.docs.clone(),
        };
        let json = serde_json::to_vec(&snapshot)
            .map_err(|e| DedupeError::backing("snapshot serialization failed", e))?;
        fs::write(dir.join(SNAPSHOT_FILE), json)?;
        Ok(())
    }

    fn clauses_for(
        clauses: &mut Vec<TermClause>,
        property: &Property,
        value: &str,
        required: bool,
    ) {
        if property.is_identity() {
            clauses.push(TermClause {
                field: property.name().to_string(),
                term: value.to_string(),
                required,
            });
            return;
        }
        let escaped = escape_query(value);
        for term in analyze(&escaped) {
            clauses.push(TermClause {
                field: property.name().to_string(),
                term,
                required,
            });
        }
    }

    fn run_query(&mut self, clauses: &[TermClause]) -> Vec<SearchHit> {
        if clauses.is_empty() {
            return Vec::new();
        }
        let committed = &self.committed;
        self.tracker.run(|limit| committed.search(clauses, limit))
    }
}

#[async_trait]
impl RecordIndex for MemoryIndex {
    async fn index(&mut self, record: &Record) -> Result<()> {
        for field in record.fields() {
            if self.config.property(field).is_none() {
                return Err(DedupeError::Config(format!(
                    "record has property '{}' for which there is no configuration",
                    field
                )));
            }
        }
        let doc_id = self.next_doc_id;
        self.next_doc_id += 1;
        self.staged.push(StoredDoc {
            doc_id,
            record: record.clone(),
        });
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        let config = self.config.clone();
        for doc in staged {
            self.committed.add(doc, &config);
        }
        self.write_snapshot()?;
        debug!("commit: {} documents searchable", self.committed.docs.len());
        Ok(())
    }

    async fn lookup(&mut self, property: &Property, values: &[String]) -> Result<Vec<SearchHit>> {
        let mut clauses = Vec::new();
        for value in values {
            Self::clauses_for(&mut clauses, property, value, false);
        }
        Ok(self.run_query(&clauses))
    }

    async fn lookup_record(&mut self, record: &Record) -> Result<Vec<SearchHit>> {
        let config = self.config.clone();
        let mut clauses = Vec::new();
        for property in config.lookup_properties() {
            let required = property.lookup() == Some(Lookup::Required);
            for value in record.values(property.name()) {
                Self::clauses_for(&mut clauses, property, value, required);
            }
        }
        Ok(self.run_query(&clauses))
    }

    async fn find_by_id(&mut self, id: &str) -> Result<Option<Record>> {
        let config = self.config.clone();
        for idprop in config.identity_properties() {
            let position = self
                .committed
                .postings
                .get(idprop.name())
                .and_then(|terms| terms.get(id))
                .and_then(|positions| positions.first().copied());
            if let Some(position) = position {
                let record = &self.committed.docs[position].record;
                if record.values(idprop.name()).iter().any(|v| v == id) {
                    return Ok(Some(record.clone()));
                }
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        self.commit().await?;
        self.committed = Segment::default();
        debug!("index closed");
        Ok(())
    }
}
