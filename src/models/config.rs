//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Queue and worker-pool settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Content store layout
    #[serde(default)]
    pub storage: StorageConfig,

    /// Content conversion settings
    #[serde(default)]
    pub convert: ConvertConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_retries == 0 {
            return Err(AppError::validation("crawler.max_retries must be > 0"));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(AppError::validation("pipeline.queue_capacity must be > 0"));
        }
        if self.pipeline.workers == 0 {
            return Err(AppError::validation("pipeline.workers must be > 0"));
        }
        if self.storage.content_dir.trim().is_empty() {
            return Err(AppError::validation("storage.content_dir is empty"));
        }
        Ok(())
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum connection attempts per request
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base backoff in milliseconds; attempt i waits base * 2^i
    #[serde(default = "defaults::retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_retries: defaults::max_retries(),
            retry_backoff_ms: defaults::retry_backoff(),
        }
    }
}

/// Queue and worker-pool settings for the pipeline orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Capacity of the bounded work queue between discovery and workers
    #[serde(default = "defaults::queue_capacity")]
    pub queue_capacity: usize,

    /// Number of concurrent document workers
    #[serde(default = "defaults::workers")]
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: defaults::queue_capacity(),
            workers: defaults::workers(),
        }
    }
}

/// Content store layout under the storage root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for content-addressed files, relative to the storage root
    #[serde(default = "defaults::content_dir")]
    pub content_dir: String,

    /// Filename of the local document index, relative to the storage root
    #[serde(default = "defaults::index_file")]
    pub index_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            content_dir: defaults::content_dir(),
            index_file: defaults::index_file(),
        }
    }
}

/// What to do with content types no converter is registered for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackMode {
    /// Pass the bytes through unchanged
    #[default]
    Pass,
    /// Discard the content (document is recorded as skipped)
    Discard,
}

/// External conversion tool invocation.
///
/// `args` may use the placeholders `{input}`, `{output}` and `{dir}`,
/// substituted per invocation inside a scoped temporary directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Executable name or path
    pub program: String,

    /// Argument template
    #[serde(default)]
    pub args: Vec<String>,

    /// Name of the input file written into the temp directory
    #[serde(default = "defaults::tool_input")]
    pub input_file: String,

    /// Name of the output file the tool is expected to produce
    #[serde(default = "defaults::tool_output")]
    pub output_file: String,
}

/// Content conversion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// Policy for unregistered content types
    #[serde(default)]
    pub fallback: FallbackMode,

    /// Office-format renderer (None disables office conversion)
    #[serde(default = "defaults::office_tool")]
    pub office: Option<ToolConfig>,

    /// HTML-to-PDF renderer (None disables HTML conversion)
    #[serde(default = "defaults::html_tool")]
    pub html: Option<ToolConfig>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            fallback: FallbackMode::default(),
            office: defaults::office_tool(),
            html: defaults::html_tool(),
        }
    }
}

mod defaults {
    use super::ToolConfig;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; regwatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_retries() -> u32 {
        5
    }
    pub fn retry_backoff() -> u64 {
        1000
    }

    // Pipeline defaults
    pub fn queue_capacity() -> usize {
        100
    }
    pub fn workers() -> usize {
        20
    }

    // Storage defaults
    pub fn content_dir() -> String {
        "files".into()
    }
    pub fn index_file() -> String {
        "index.json".into()
    }

    // Converter defaults
    pub fn tool_input() -> String {
        "input".into()
    }
    pub fn tool_output() -> String {
        "output.pdf".into()
    }

    pub fn office_tool() -> Option<ToolConfig> {
        Some(ToolConfig {
            program: "soffice".into(),
            args: vec![
                "--headless".into(),
                "--convert-to".into(),
                "pdf".into(),
                "--outdir".into(),
                "{dir}".into(),
                "{input}".into(),
            ],
            input_file: "input".into(),
            // soffice names the result after the input stem
            output_file: "input.pdf".into(),
        })
    }

    pub fn html_tool() -> Option<ToolConfig> {
        Some(ToolConfig {
            program: "wkhtmltopdf".into(),
            args: vec!["--quiet".into(), "{input}".into(), "{output}".into()],
            input_file: "input.html".into(),
            output_file: "output.pdf".into(),
        })
    }
}
