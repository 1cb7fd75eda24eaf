//! JSON-file document index.
//!
//! Keeps the crawl's known-document set in a single `index.json` under
//! the storage root so CLI runs deduplicate across invocations without
//! an external search store. Writes are atomic (temp file + rename).

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::Document;
use crate::storage::content::ContentStore;
use crate::storage::{DocumentIndex, InsertOutcome, InsertReceipt};

/// One indexed document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    pub stored_at: DateTime<Utc>,
}

/// File-backed [`DocumentIndex`] keyed by source URL.
pub struct LocalIndex {
    path: PathBuf,
    records: RwLock<HashMap<String, IndexRecord>>,
}

impl LocalIndex {
    /// Open the index file, creating an empty index when absent.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Vec<IndexRecord>>(&bytes)
                .map_err(|e| AppError::store(format!("index file {:?} unreadable: {}", path, e)))?
                .into_iter()
                .map(|r| (r.url.clone(), r))
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(AppError::Io(e)),
        };
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// Number of indexed documents.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, records: &HashMap<String, IndexRecord>) -> Result<()> {
        let mut list: Vec<&IndexRecord> = records.values().collect();
        list.sort_by(|a, b| a.stored_at.cmp(&b.stored_at).then(a.url.cmp(&b.url)));
        let bytes = serde_json::to_vec_pretty(&list)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentIndex for LocalIndex {
    async fn exists_document(&self, url: &str) -> Result<bool> {
        Ok(self.records.read().await.contains_key(url))
    }

    async fn insert_document(&self, doc: &Document) -> Result<InsertReceipt> {
        let mut records = self.records.write().await;

        if let Some(existing) = records.get(&doc.url) {
            return Ok(InsertReceipt {
                outcome: InsertOutcome::Existing,
                id: existing.id.clone(),
            });
        }
        if let Some(hash) = &doc.content_hash {
            if let Some(existing) = records.values().find(|r| r.content_hash.as_ref() == Some(hash))
            {
                return Ok(InsertReceipt {
                    outcome: InsertOutcome::Existing,
                    id: existing.id.clone(),
                });
            }
        }

        let id = doc
            .content_hash
            .clone()
            .unwrap_or_else(|| ContentStore::hash(doc.url.as_bytes()));
        let record = IndexRecord {
            id: id.clone(),
            url: doc.url.clone(),
            content_hash: doc.content_hash.clone(),
            title: doc.title.clone(),
            source_name: doc.source_name.clone(),
            published_date: doc.published_date,
            stored_at: Utc::now(),
        };
        records.insert(doc.url.clone(), record);
        self.persist(&records).await?;

        Ok(InsertReceipt {
            outcome: InsertOutcome::Created,
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(url: &str, hash: Option<&str>) -> Document {
        let mut doc = Document::new(url);
        doc.title = "A title".into();
        doc.content_hash = hash.map(|h| h.to_string());
        doc
    }

    #[tokio::test]
    async fn test_insert_then_exists() {
        let tmp = TempDir::new().unwrap();
        let index = LocalIndex::open(tmp.path().join("index.json")).await.unwrap();

        assert!(!index.exists_document("https://example.com/1").await.unwrap());
        let receipt = index
            .insert_document(&doc("https://example.com/1", Some("abc")))
            .await
            .unwrap();
        assert_eq!(receipt.outcome, InsertOutcome::Created);
        assert!(index.exists_document("https://example.com/1").await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_same_url_is_existing() {
        let tmp = TempDir::new().unwrap();
        let index = LocalIndex::open(tmp.path().join("index.json")).await.unwrap();

        let first = index
            .insert_document(&doc("https://example.com/1", Some("abc")))
            .await
            .unwrap();
        let second = index
            .insert_document(&doc("https://example.com/1", Some("def")))
            .await
            .unwrap();
        assert_eq!(second.outcome, InsertOutcome::Existing);
        assert_eq!(second.id, first.id);
    }

    #[tokio::test]
    async fn test_insert_same_hash_is_existing() {
        let tmp = TempDir::new().unwrap();
        let index = LocalIndex::open(tmp.path().join("index.json")).await.unwrap();

        index
            .insert_document(&doc("https://example.com/1", Some("abc")))
            .await
            .unwrap();
        let receipt = index
            .insert_document(&doc("https://example.com/other", Some("abc")))
            .await
            .unwrap();
        assert_eq!(receipt.outcome, InsertOutcome::Existing);
    }

    #[tokio::test]
    async fn test_reload_from_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");

        {
            let index = LocalIndex::open(&path).await.unwrap();
            index
                .insert_document(&doc("https://example.com/1", Some("abc")))
                .await
                .unwrap();
        }

        let reloaded = LocalIndex::open(&path).await.unwrap();
        assert_eq!(reloaded.len().await, 1);
        assert!(reloaded.exists_document("https://example.com/1").await.unwrap());
    }
}
