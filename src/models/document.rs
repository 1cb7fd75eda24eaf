//! Document data structure.
//!
//! A `Document` starts as a lightweight entry discovered on a result
//! page and is filled in as it moves through the pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::paths;

/// Lifecycle of a document inside one crawl run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    #[default]
    Pending,
    Fetched,
    Converted,
    Stored,
    Failed,
}

/// A document discovered on a source site.
///
/// The binary payloads (`raw_content`, `content`) never serialize; the
/// content-addressed store owns the bytes and `content_hash` is the
/// reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Source URL of the document file (natural key within a source)
    pub url: String,

    /// Secondary page carrying enrichment metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_url: Option<String>,

    /// Document title
    #[serde(default)]
    pub title: String,

    /// Publication date, when the source exposes one
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,

    /// Display name of the source this document came from
    #[serde(default)]
    pub source_name: String,

    /// Open-ended, source-specific metadata (insertion-ordered)
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Downloaded bytes before conversion
    #[serde(skip)]
    pub raw_content: Option<Vec<u8>>,

    /// Content type reported for the downloaded bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Converted bytes in canonical form
    #[serde(skip)]
    pub content: Option<Vec<u8>>,

    /// Plain text extracted by downstream analyzers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// sha256 of `content`, assigned once the content store accepted it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// Pipeline status
    #[serde(default)]
    pub status: DocumentStatus,
}

impl Document {
    /// Create a pending document for the given source URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            detail_url: None,
            title: String::new(),
            published_date: None,
            source_name: String::new(),
            metadata: Map::new(),
            raw_content: None,
            content_type: None,
            content: None,
            text: None,
            content_hash: None,
            status: DocumentStatus::Pending,
        }
    }

    /// Whether the document carries a usable source URL.
    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// Read a metadata value by dotted path.
    pub fn meta(&self, path: &str) -> Option<&Value> {
        let (first, rest) = match path.split_once('.') {
            Some((first, rest)) => (first, Some(rest)),
            None => (path, None),
        };
        let value = self.metadata.get(first)?;
        match rest {
            Some(rest) => paths::get_path(value, rest),
            None => Some(value),
        }
    }

    /// Read a metadata value by dotted path as a string slice.
    pub fn meta_str(&self, path: &str) -> Option<&str> {
        self.meta(path).and_then(Value::as_str)
    }

    /// Set a metadata value by dotted path, creating intermediate
    /// objects as needed. Returns `false` when the path collides with
    /// an existing non-object value.
    pub fn set_meta(&mut self, path: &str, value: Value) -> bool {
        match path.split_once('.') {
            None => {
                self.metadata.insert(path.to_string(), value);
                true
            }
            Some((first, rest)) => {
                let slot = self
                    .metadata
                    .entry(first.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                paths::set_path(slot, rest, value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_has_url() {
        assert!(Document::new("https://example.com/doc.pdf").has_url());
        assert!(!Document::new("   ").has_url());
        assert!(!Document::new("").has_url());
    }

    #[test]
    fn test_meta_roundtrip() {
        let mut doc = Document::new("https://example.com/1");
        assert!(doc.set_meta("topic", json!("banking")));
        assert!(doc.set_meta("procedure.initiator", json!("commission")));

        assert_eq!(doc.meta_str("topic"), Some("banking"));
        assert_eq!(doc.meta_str("procedure.initiator"), Some("commission"));
        assert_eq!(doc.meta("procedure.missing"), None);
    }

    #[test]
    fn test_set_meta_rejects_scalar_collision() {
        let mut doc = Document::new("https://example.com/1");
        doc.set_meta("topic", json!("banking"));
        assert!(!doc.set_meta("topic.sub", json!("x")));
        assert_eq!(doc.meta_str("topic"), Some("banking"));
    }

    #[test]
    fn test_metadata_keeps_insertion_order() {
        let mut doc = Document::new("https://example.com/1");
        doc.set_meta("zeta", json!(1));
        doc.set_meta("alpha", json!(2));
        let keys: Vec<_> = doc.metadata.keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_binary_fields_do_not_serialize() {
        let mut doc = Document::new("https://example.com/1");
        doc.raw_content = Some(vec![1, 2, 3]);
        doc.content = Some(vec![4, 5, 6]);
        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("raw_content").is_none());
        assert!(value.get("content").is_none());
    }
}
