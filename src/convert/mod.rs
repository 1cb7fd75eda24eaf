// src/convert/mod.rs

//! Content conversion toward the canonical (PDF) representation.
//!
//! A registry dispatches on the normalized mimetype. Converters return
//! `Ok(None)` for "no usable content", which callers record as a skip,
//! never as an error.

pub mod external;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ConvertConfig, FallbackMode};

pub use external::{ExternalToolConverter, HtmlToPdfConverter};

/// Per-invocation context for a conversion.
#[derive(Debug, Clone, Default)]
pub struct ConvertContext {
    /// URL the content was downloaded from; base for relative links
    pub source_url: Option<String>,

    /// Parameters carried by the content-type header (e.g. charset)
    pub mime_params: HashMap<String, String>,
}

/// A converter from one content type to the canonical representation.
#[async_trait]
pub trait ContentConverter: Send + Sync {
    async fn convert(&self, content: &[u8], ctx: &ConvertContext) -> Result<Option<Vec<u8>>>;
}

/// Converter that returns the bytes unchanged (already canonical).
pub struct PassThroughConverter;

#[async_trait]
impl ContentConverter for PassThroughConverter {
    async fn convert(&self, content: &[u8], _ctx: &ConvertContext) -> Result<Option<Vec<u8>>> {
        Ok(Some(content.to_vec()))
    }
}

/// Split a content-type header into a normalized mimetype and its
/// parameters. The mimetype is lowercased and stripped of whitespace.
pub fn normalize_mime(content_type: &str) -> (String, HashMap<String, String>) {
    let mut parts = content_type.split(';');
    let mime = parts.next().unwrap_or("").trim().to_ascii_lowercase();

    let mut params = HashMap::new();
    for part in parts {
        let mut kv = part.splitn(2, '=');
        let key = kv.next().unwrap_or("").trim().to_ascii_lowercase();
        if key.is_empty() {
            continue;
        }
        let value = kv.next().unwrap_or("").trim().trim_matches('"').to_string();
        params.insert(key, value);
    }
    (mime, params)
}

/// Mimetype-keyed converter table with a configurable fallback.
pub struct ConverterRegistry {
    converters: HashMap<String, Arc<dyn ContentConverter>>,
    fallback: FallbackMode,
}

impl ConverterRegistry {
    /// Create an empty registry with the given fallback policy.
    pub fn new(fallback: FallbackMode) -> Self {
        Self {
            converters: HashMap::new(),
            fallback,
        }
    }

    /// Register a converter for a mimetype.
    pub fn register(&mut self, mime: &str, converter: Arc<dyn ContentConverter>) {
        self.converters
            .insert(mime.trim().to_ascii_lowercase(), converter);
    }

    /// Build the standard registry from configuration: PDF passes
    /// through, HTML and office formats go through their external
    /// renderers when configured.
    pub fn from_config(config: &ConvertConfig) -> Self {
        let mut registry = Self::new(config.fallback);
        registry.register("application/pdf", Arc::new(PassThroughConverter));

        if let Some(tool) = &config.html {
            let converter: Arc<dyn ContentConverter> =
                Arc::new(HtmlToPdfConverter::new(tool.clone()));
            registry.register("text/html", Arc::clone(&converter));
            registry.register("application/xhtml+xml", converter);
        }

        if let Some(tool) = &config.office {
            let converter: Arc<dyn ContentConverter> =
                Arc::new(ExternalToolConverter::new(tool.clone()));
            for mime in [
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "application/vnd.ms-excel",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                "application/vnd.oasis.opendocument.text",
                "application/rtf",
            ] {
                registry.register(mime, Arc::clone(&converter));
            }
        }
        registry
    }

    /// Convert content with the converter registered for its type.
    ///
    /// Unknown types follow the fallback policy; `Ok(None)` means the
    /// document has no usable content.
    pub async fn convert(
        &self,
        content: &[u8],
        content_type: &str,
        source_url: Option<&str>,
    ) -> Result<Option<Vec<u8>>> {
        let (mime, mime_params) = normalize_mime(content_type);
        let ctx = ConvertContext {
            source_url: source_url.map(|s| s.to_string()),
            mime_params,
        };

        match self.converters.get(&mime) {
            Some(converter) => converter.convert(content, &ctx).await,
            None => match self.fallback {
                FallbackMode::Pass => {
                    log::debug!("No converter for '{}', passing through", mime);
                    Ok(Some(content.to_vec()))
                }
                FallbackMode::Discard => {
                    log::debug!("No converter for '{}', discarding content", mime);
                    Ok(None)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mime() {
        let (mime, params) = normalize_mime("Application/PDF; charset=UTF-8; q=\"0.8\"");
        assert_eq!(mime, "application/pdf");
        assert_eq!(params.get("charset"), Some(&"UTF-8".to_string()));
        assert_eq!(params.get("q"), Some(&"0.8".to_string()));

        let (mime, params) = normalize_mime("text/html");
        assert_eq!(mime, "text/html");
        assert!(params.is_empty());
    }

    #[tokio::test]
    async fn test_registered_converter_wins() {
        let mut registry = ConverterRegistry::new(FallbackMode::Discard);
        registry.register("application/pdf", Arc::new(PassThroughConverter));

        let result = registry
            .convert(b"%PDF-1.4", "application/pdf; charset=binary", None)
            .await
            .unwrap();
        assert_eq!(result, Some(b"%PDF-1.4".to_vec()));
    }

    #[tokio::test]
    async fn test_fallback_pass() {
        let registry = ConverterRegistry::new(FallbackMode::Pass);
        let result = registry
            .convert(b"bytes", "application/unknown", None)
            .await
            .unwrap();
        assert_eq!(result, Some(b"bytes".to_vec()));
    }

    #[tokio::test]
    async fn test_fallback_discard() {
        let registry = ConverterRegistry::new(FallbackMode::Discard);
        let result = registry
            .convert(b"bytes", "application/unknown", None)
            .await
            .unwrap();
        assert_eq!(result, None);
    }
}
