//! In-memory document index for tests and dry runs.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::Document;
use crate::storage::content::ContentStore;
use crate::storage::{DocumentIndex, InsertOutcome, InsertReceipt};

#[derive(Default)]
struct State {
    by_url: HashMap<String, String>,
    by_hash: HashMap<String, String>,
    inserted: Vec<Document>,
}

/// [`DocumentIndex`] held entirely in memory.
#[derive(Default)]
pub struct MemoryIndex {
    state: Mutex<State>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a URL as already known without storing a document. Useful
    /// for seeding "seen" state.
    pub async fn mark_known(&self, url: &str) {
        let mut state = self.state.lock().await;
        let id = ContentStore::hash(url.as_bytes());
        state.by_url.insert(url.to_string(), id);
    }

    /// Documents inserted so far, in insertion order.
    pub async fn inserted(&self) -> Vec<Document> {
        self.state.lock().await.inserted.clone()
    }

    /// Number of known URLs.
    pub async fn len(&self) -> usize {
        self.state.lock().await.by_url.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DocumentIndex for MemoryIndex {
    async fn exists_document(&self, url: &str) -> Result<bool> {
        Ok(self.state.lock().await.by_url.contains_key(url))
    }

    async fn insert_document(&self, doc: &Document) -> Result<InsertReceipt> {
        let mut state = self.state.lock().await;

        if let Some(id) = state.by_url.get(&doc.url) {
            return Ok(InsertReceipt {
                outcome: InsertOutcome::Existing,
                id: id.clone(),
            });
        }
        if let Some(hash) = &doc.content_hash {
            if let Some(id) = state.by_hash.get(hash) {
                return Ok(InsertReceipt {
                    outcome: InsertOutcome::Existing,
                    id: id.clone(),
                });
            }
        }

        let id = doc
            .content_hash
            .clone()
            .unwrap_or_else(|| ContentStore::hash(doc.url.as_bytes()));
        state.by_url.insert(doc.url.clone(), id.clone());
        if let Some(hash) = &doc.content_hash {
            state.by_hash.insert(hash.clone(), id.clone());
        }
        state.inserted.push(doc.clone());

        Ok(InsertReceipt {
            outcome: InsertOutcome::Created,
            id,
        })
    }
}
