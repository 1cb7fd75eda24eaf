// src/plugins/mod.rs

//! Site adapters.
//!
//! A plugin knows one source: how its result lists paginate, how
//! entries are extracted from a page, and how a document is enriched
//! from its detail page. Plugins are registered explicitly by name;
//! the host program builds the registry at startup.

pub mod bafin;
pub mod eurlex;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use scraper::Html;

use crate::error::{AppError, Result};
use crate::models::Document;
use crate::scrape::PaginatedResource;
use crate::utils::http::Fetcher;

pub use bafin::BafinPlugin;
pub use eurlex::EurlexPlugin;

/// A source-specific crawl adapter.
#[async_trait]
pub trait SitePlugin: Send + Sync {
    /// Registry key, stable and lowercase.
    fn name(&self) -> &str;

    /// Display name stamped on documents from this source.
    fn source_name(&self) -> &str;

    /// A fresh paginated resource over the source's result list.
    fn pages(&self) -> PaginatedResource;

    /// Extract candidate documents from one result page.
    fn find_entries(&self, page: &Html) -> Vec<Document>;

    /// Enrich a document with metadata from its detail page.
    ///
    /// Failures here degrade to partial metadata; the caller never
    /// drops the document because enrichment failed.
    async fn process_document(&self, doc: &mut Document, fetcher: &Fetcher) -> Result<()>;
}

/// Constructor for a plugin instance.
pub type PluginFactory = fn() -> Result<Arc<dyn SitePlugin>>;

/// Explicit name-to-factory table of available plugins.
#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry holding all built-in site adapters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("eurlex", || Ok(Arc::new(EurlexPlugin::new()?)));
        registry.register("bafin", || Ok(Arc::new(BafinPlugin::new()?)));
        registry
    }

    /// Register a plugin factory under a name.
    pub fn register(&mut self, name: &str, factory: PluginFactory) {
        self.factories.insert(name.to_ascii_lowercase(), factory);
    }

    /// Instantiate the plugin registered under `name`.
    pub fn create(&self, name: &str) -> Result<Arc<dyn SitePlugin>> {
        match self.factories.get(&name.to_ascii_lowercase()) {
            Some(factory) => factory(),
            None => Err(AppError::config(format!(
                "Unknown plugin '{}'. Available: {}",
                name,
                self.names().join(", ")
            ))),
        }
    }

    /// Sorted names of all registered plugins.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = PluginRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["bafin", "eurlex"]);

        let plugin = registry.create("EurLex").unwrap();
        assert_eq!(plugin.name(), "eurlex");
        assert!(registry.create("unknown").is_err());
    }
}
