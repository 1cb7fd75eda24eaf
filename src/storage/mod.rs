//! Storage abstractions: the content-addressed file store and the
//! boundary to the external document index.

pub mod content;
pub mod local;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Document;

// Re-export for convenience
pub use content::ContentStore;
pub use local::LocalIndex;
pub use memory::MemoryIndex;

/// Outcome of an insert into the document index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new entry was created
    Created,
    /// An entry with the same natural key or content hash already
    /// existed; treated as success without side effects
    Existing,
    /// The index rejected the document
    Failed,
}

/// Receipt returned by [`DocumentIndex::insert_document`].
#[derive(Debug, Clone)]
pub struct InsertReceipt {
    pub outcome: InsertOutcome,
    pub id: String,
}

/// Boundary to the external searchable document store.
///
/// The pipeline only ever checks natural-key existence and inserts;
/// everything else the external store does is out of scope.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Whether a document with this source URL is already indexed.
    async fn exists_document(&self, url: &str) -> Result<bool>;

    /// Insert a document; a natural-key or content-hash conflict
    /// yields `Existing`, never an error.
    async fn insert_document(&self, doc: &Document) -> Result<InsertReceipt>;
}
