// src/classes/mod.rs

use async_trait::async_trait;

use crate::error::Result;

mod memory;
mod postgres;

pub use memory::MemoryClassStore;
pub use postgres::PostgresClassStore;

/// Maintains equivalence classes over matched identifiers: the
/// reflexive-transitive-symmetric closure of inserted links. Each identifier
/// belongs to at most one class, and after any sequence of `add_link` calls
/// the classes equal the connected components of the link graph.
///
/// Implementations serialize all write operations.
#[async_trait]
pub trait EquivalenceClassStore {
    /// Records that `id1` and `id2` refer to the same entity.
    ///
    /// Both unseen: a fresh class is allocated for the pair. One seen: the
    /// other adopts its class. Both seen in the same class: no-op. Both seen
    /// in different classes: the classes merge, and `id1`'s class id
    /// survives.
    async fn add_link(&mut self, id1: &str, id2: &str) -> Result<()>;

    /// The dense non-negative class id of an identifier, if it has been
    /// linked before.
    async fn class_id(&self, id: &str) -> Result<Option<u32>>;

    /// All members of the identifier's class, or empty if unseen.
    async fn class_of(&self, id: &str) -> Result<Vec<String>>;

    /// Number of distinct classes.
    async fn class_count(&self) -> Result<usize>;

    /// Flushes pending state to the durable backing, if any.
    async fn commit(&mut self) -> Result<()>;
}
