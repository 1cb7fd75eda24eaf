// src/models/mod.rs

//! Domain models for the crawler application.

mod config;
mod document;

// Re-export all public types
pub use config::{
    Config, ConvertConfig, CrawlerConfig, FallbackMode, PipelineConfig, StorageConfig, ToolConfig,
};
pub use document::{Document, DocumentStatus};
