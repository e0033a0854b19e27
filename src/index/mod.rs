// src/index/mod.rs

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::Property;
use crate::error::Result;
use crate::record::Record;

mod memory;
mod tracker;

pub use memory::MemoryIndex;
pub use tracker::QueryResultTracker;

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

/// The standard analyzer: word tokens, lowercased. Identity fields bypass it
/// and are stored as a single verbatim token so exact lookup succeeds.
pub fn analyze(value: &str) -> Vec<String> {
    TOKEN_PATTERN
        .find_iter(value)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Characters reserved by the query syntax. They must be escaped with a
/// leading backslash before a value is embedded into a query string.
pub const RESERVED_QUERY_CHARS: &[char] = &[
    '*', '?', '!', '&', '(', ')', '-', '+', ':', '"', '[', ']', '~', '{', '}', '^', '|',
];

pub fn escape_query(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() * 2);
    for ch in value.chars() {
        if RESERVED_QUERY_CHARS.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.trim().to_string()
}

/// One candidate returned from the index, prior to scoring. The `doc_id` is
/// an opaque per-index identifier; candidate accumulation uses it to keep
/// the union distinct, since record equality is not structural.
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub doc_id: u32,
    pub score: f32,
    pub record: Record,
}

/// The inverted-index contract the matching engine runs against. Any engine
/// honoring these semantics is acceptable:
///
/// - `index` tokenizes each field through the per-property analyzer and
///   persists both tokens and stored values;
/// - documents become searchable only after `commit`, which is atomic with
///   respect to concurrent lookups;
/// - lookups return candidates ordered by descending native relevance.
///
/// All methods are suspension points; nothing inside the scoring kernels is.
#[async_trait]
pub trait RecordIndex {
    /// Adds the record to the index. Not visible to searches until
    /// [`RecordIndex::commit`].
    async fn index(&mut self, record: &Record) -> Result<()>;

    /// Makes all prior `index` calls visible to searches.
    async fn commit(&mut self) -> Result<()>;

    /// Candidates for a single field, most relevant first.
    async fn lookup(&mut self, property: &Property, values: &[String]) -> Result<Vec<SearchHit>>;

    /// Candidates for one compound query over all lookup properties of the
    /// record: tokens of `Required` properties must all match, tokens of
    /// `Optional` properties contribute disjunctively.
    async fn lookup_record(&mut self, record: &Record) -> Result<Vec<SearchHit>>;

    /// Exact-match retrieval by any identity property value.
    async fn find_by_id(&mut self, id: &str) -> Result<Option<Record>>;

    /// Flushes pending state and releases underlying resources.
    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyzer_lowercases_and_splits_words() {
        assert_eq!(analyze("John  Smith"), ["john", "smith"]);
        assert_eq!(analyze("O'Hara, Maureen"), ["o", "hara", "maureen"]);
        assert!(analyze("  ,- ").is_empty());
    }

    #[test]
    fn reserved_characters_are_escaped() {
        assert_eq!(escape_query("a-b"), "a\\-b");
        assert_eq!(escape_query("(john)"), "\\(john\\)");
        assert_eq!(escape_query("plain"), "plain");
        assert_eq!(escape_query("x^y|z"), "x\\^y\\|z");
    }

    #[test]
    fn escape_trims_surrounding_whitespace() {
        assert_eq!(escape_query("  john  "), "john");
    }
}
