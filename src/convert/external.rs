// src/convert/external.rs

//! Subprocess-based format conversion.
//!
//! Each invocation gets its own temporary directory: the source bytes
//! are written there, the external tool runs with substituted argument
//! placeholders, and the produced output file is read back. The
//! directory is removed when the guard drops, on every exit path.

use std::process::Stdio;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;

use crate::error::{AppError, Result};
use crate::models::ToolConfig;

use super::{ContentConverter, ConvertContext};

/// Converter invoking an external command-line tool.
pub struct ExternalToolConverter {
    tool: ToolConfig,
}

impl ExternalToolConverter {
    pub fn new(tool: ToolConfig) -> Self {
        Self { tool }
    }

    /// Run the tool on the given bytes inside a scoped temp directory.
    pub(crate) async fn run_tool(&self, content: &[u8]) -> Result<Vec<u8>> {
        let tmp = TempDir::with_prefix("regwatch-conv-")?;
        let dir = tmp.path();
        let input_path = dir.join(&self.tool.input_file);
        let output_path = dir.join(&self.tool.output_file);

        tokio::fs::write(&input_path, content).await?;

        let args: Vec<String> = self
            .tool
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input_path.to_string_lossy())
                    .replace("{output}", &output_path.to_string_lossy())
                    .replace("{dir}", &dir.to_string_lossy())
            })
            .collect();

        log::debug!("Running '{} {}'", self.tool.program, args.join(" "));
        let output = Command::new(&self.tool.program)
            .args(&args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AppError::conversion(&self.tool.program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::conversion(
                &self.tool.program,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }

        let bytes = tokio::fs::read(&output_path).await.map_err(|e| {
            AppError::conversion(
                &self.tool.program,
                format!("output file '{}' unreadable: {}", self.tool.output_file, e),
            )
        })?;
        Ok(bytes)
    }
}

#[async_trait]
impl ContentConverter for ExternalToolConverter {
    async fn convert(&self, content: &[u8], _ctx: &ConvertContext) -> Result<Option<Vec<u8>>> {
        self.run_tool(content).await.map(Some)
    }
}

/// HTML-to-PDF conversion through an external renderer.
///
/// Relative links in the page would break once the page is rendered
/// from a temp file, so a `<base href>` pointing at the source URL is
/// injected before the tool runs (unless the page already declares
/// one).
pub struct HtmlToPdfConverter {
    inner: ExternalToolConverter,
}

impl HtmlToPdfConverter {
    pub fn new(tool: ToolConfig) -> Self {
        Self {
            inner: ExternalToolConverter::new(tool),
        }
    }
}

#[async_trait]
impl ContentConverter for HtmlToPdfConverter {
    async fn convert(&self, content: &[u8], ctx: &ConvertContext) -> Result<Option<Vec<u8>>> {
        let prepared = match &ctx.source_url {
            Some(base) => {
                let html = String::from_utf8_lossy(content);
                inject_base(&html, base).into_bytes()
            }
            None => content.to_vec(),
        };
        self.inner.run_tool(&prepared).await.map(Some)
    }
}

/// Insert a `<base href>` element so the renderer resolves relative
/// links against the original location. Pages that already carry a
/// base element are left alone.
fn inject_base(html: &str, base_url: &str) -> String {
    let lower = html.to_ascii_lowercase();
    if lower.contains("<base") {
        return html.to_string();
    }

    let tag = format!("<base href=\"{}\">", base_url);
    if let Some(head_start) = lower.find("<head") {
        if let Some(close) = lower[head_start..].find('>') {
            let insert_at = head_start + close + 1;
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..insert_at]);
            out.push_str(&tag);
            out.push_str(&html[insert_at..]);
            return out;
        }
    }
    format!("{}{}", tag, html)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_tool() -> ToolConfig {
        ToolConfig {
            program: "cp".into(),
            args: vec!["{input}".into(), "{output}".into()],
            input_file: "input".into(),
            output_file: "output.pdf".into(),
        }
    }

    #[tokio::test]
    async fn test_tool_roundtrip() {
        let converter = ExternalToolConverter::new(copy_tool());
        let ctx = ConvertContext::default();
        let result = converter.convert(b"some bytes", &ctx).await.unwrap();
        assert_eq!(result, Some(b"some bytes".to_vec()));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_conversion_error() {
        let tool = ToolConfig {
            program: "false".into(),
            args: vec![],
            input_file: "input".into(),
            output_file: "output.pdf".into(),
        };
        let converter = ExternalToolConverter::new(tool);
        let err = converter
            .convert(b"bytes", &ConvertContext::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::AppError::Conversion { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_output_is_conversion_error() {
        let tool = ToolConfig {
            program: "true".into(),
            args: vec![],
            input_file: "input".into(),
            output_file: "output.pdf".into(),
        };
        let converter = ExternalToolConverter::new(tool);
        let err = converter
            .convert(b"bytes", &ConvertContext::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::AppError::Conversion { .. }
        ));
    }

    #[tokio::test]
    async fn test_html_converter_injects_base() {
        let converter = HtmlToPdfConverter::new(copy_tool());
        let ctx = ConvertContext {
            source_url: Some("https://example.com/doc/1".into()),
            ..ConvertContext::default()
        };
        let result = converter
            .convert(b"<html><head><title>t</title></head><body></body></html>", &ctx)
            .await
            .unwrap()
            .unwrap();
        let text = String::from_utf8(result).unwrap();
        assert!(text.contains("<base href=\"https://example.com/doc/1\">"));
        assert!(text.find("<base").unwrap() > text.find("<head").unwrap());
    }

    #[test]
    fn test_inject_base_respects_existing() {
        let html = "<html><head><base href=\"https://keep.me/\"></head></html>";
        assert_eq!(inject_base(html, "https://other.org/"), html);
    }

    #[test]
    fn test_inject_base_without_head() {
        let out = inject_base("<p>bare</p>", "https://example.com/");
        assert!(out.starts_with("<base href=\"https://example.com/\">"));
    }
}
