// src/scrape/extract.rs

//! Declarative field extraction.
//!
//! An [`ExtractionRule`] binds a CSS selector to a capture mode plus
//! transform chains running before and after the query. Failures stay
//! local to the rule: a failing before-transform empties the traversal
//! roots, a failing after-transform collapses the whole result to the
//! rule's configured default. Neither aborts extraction of sibling
//! fields or other entries.

use std::sync::Arc;

use scraper::{ElementRef, Selector};
use serde_json::Value;

use crate::error::{AppError, Result};

/// Transform over the traversal roots, run before the query.
pub type NodeTransform =
    Arc<dyn for<'a> Fn(Vec<ElementRef<'a>>) -> TransformResult<Vec<ElementRef<'a>>> + Send + Sync>;

/// Transform over the extracted value sequence, run after the query.
pub type ValueTransform = Arc<dyn Fn(Vec<Value>) -> TransformResult<Vec<Value>> + Send + Sync>;

/// Result of a single transform step; errors are plain messages.
pub type TransformResult<T> = std::result::Result<T, String>;

/// Wrap a closure as a [`NodeTransform`].
pub fn node_transform<F>(f: F) -> NodeTransform
where
    F: for<'a> Fn(Vec<ElementRef<'a>>) -> TransformResult<Vec<ElementRef<'a>>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`ValueTransform`].
pub fn value_transform<F>(f: F) -> ValueTransform
where
    F: Fn(Vec<Value>) -> TransformResult<Vec<Value>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// What to capture from each matched element.
#[derive(Debug, Clone)]
pub enum Capture {
    /// Concatenated text content
    Text,
    /// Inner HTML
    InnerHtml,
    /// An attribute value; elements without the attribute yield nothing
    Attr(String),
}

/// A CSS query bound to transform chains and a fallback default.
#[derive(Clone)]
pub struct ExtractionRule {
    name: String,
    selector: Selector,
    capture: Capture,
    before: Vec<NodeTransform>,
    after: Vec<ValueTransform>,
    default: Value,
}

impl ExtractionRule {
    /// Create a rule capturing element text.
    ///
    /// `name` identifies the rule in logs when a transform fails.
    pub fn new(name: impl Into<String>, selector: &str) -> Result<Self> {
        let parsed =
            Selector::parse(selector).map_err(|e| AppError::selector(selector, format!("{e:?}")))?;
        Ok(Self {
            name: name.into(),
            selector: parsed,
            capture: Capture::Text,
            before: Vec::new(),
            after: Vec::new(),
            default: Value::Null,
        })
    }

    /// Capture an attribute instead of text.
    pub fn attr(mut self, attr: impl Into<String>) -> Self {
        self.capture = Capture::Attr(attr.into());
        self
    }

    /// Capture inner HTML instead of text.
    pub fn inner_html(mut self) -> Self {
        self.capture = Capture::InnerHtml;
        self
    }

    /// Append a before-transform.
    pub fn before(mut self, transform: NodeTransform) -> Self {
        self.before.push(transform);
        self
    }

    /// Append an after-transform.
    pub fn after(mut self, transform: ValueTransform) -> Self {
        self.after.push(transform);
        self
    }

    /// Set the value the rule falls back to when an after-transform
    /// fails. Without one, a failing chain yields the empty sequence.
    pub fn or(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    /// Run the rule against a traversal root.
    ///
    /// Never fails; transform errors degrade per the rule's fallback.
    /// Query matches from multiple roots are spliced into one flat
    /// sequence (captures are scalar, strings are never iterated).
    pub fn apply(&self, root: ElementRef<'_>) -> Vec<Value> {
        let mut roots = vec![root];
        for transform in &self.before {
            match transform(roots) {
                Ok(next) => roots = next,
                Err(err) => {
                    log::error!("Before transform for '{}' failed: {}", self.name, err);
                    roots = Vec::new();
                }
            }
        }

        let mut values = Vec::new();
        for node in &roots {
            for matched in node.select(&self.selector) {
                if let Some(value) = self.capture_value(&matched) {
                    values.push(value);
                }
            }
        }

        for transform in &self.after {
            match transform(values) {
                Ok(next) => values = next,
                Err(err) => {
                    log::error!("After transform for '{}' failed: {}", self.name, err);
                    return if self.default.is_null() {
                        Vec::new()
                    } else {
                        vec![self.default.clone()]
                    };
                }
            }
        }
        values
    }

    /// Run the rule and keep the first result, if any.
    pub fn first(&self, root: ElementRef<'_>) -> Option<Value> {
        self.apply(root).into_iter().find(|v| !v.is_null())
    }

    /// Run the rule and keep the first result as an owned string.
    pub fn first_str(&self, root: ElementRef<'_>) -> Option<String> {
        self.first(root)
            .and_then(|v| v.as_str().map(|s| s.to_string()))
    }

    fn capture_value(&self, element: &ElementRef<'_>) -> Option<Value> {
        match &self.capture {
            Capture::Text => Some(Value::String(element.text().collect())),
            Capture::InnerHtml => Some(Value::String(element.inner_html())),
            Capture::Attr(name) => element
                .value()
                .attr(name)
                .map(|v| Value::String(v.to_string())),
        }
    }
}

impl std::fmt::Debug for ExtractionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionRule")
            .field("name", &self.name)
            .field("capture", &self.capture)
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}

/// Common transform constructors.
///
/// These cover the chains the site adapters need: first-element
/// selection, trimming, splitting, regex capture, date parsing and link
/// fixing. All of them operate on string values and pass non-strings
/// through untouched unless noted.
pub mod transforms {
    use chrono::{NaiveDate, TimeZone, Utc};
    use regex::Regex;
    use serde_json::Value;

    use super::{ValueTransform, value_transform};

    /// Keep only the first value; fails on an empty sequence.
    pub fn take_first() -> ValueTransform {
        value_transform(|values: Vec<Value>| {
            let mut iter = values.into_iter();
            match iter.next() {
                Some(first) => Ok(vec![first]),
                None => Err("no value to take".to_string()),
            }
        })
    }

    /// Trim whitespace and the given extra characters from each string.
    pub fn strip(extra: &str) -> ValueTransform {
        let extra = extra.to_string();
        value_transform(move |values| {
            Ok(map_strings(values, |s| {
                s.trim()
                    .trim_matches(|c: char| extra.contains(c))
                    .trim()
                    .to_string()
                    .into()
            }))
        })
    }

    /// Split each string on a separator, splicing the pieces in order
    /// and dropping empties.
    pub fn split(separator: &str) -> ValueTransform {
        let separator = separator.to_string();
        value_transform(move |values| {
            let mut out = Vec::new();
            for value in values {
                match value {
                    Value::String(s) => out.extend(
                        s.split(&separator)
                            .map(str::trim)
                            .filter(|p| !p.is_empty())
                            .map(|p| Value::String(p.to_string())),
                    ),
                    other => out.push(other),
                }
            }
            Ok(out)
        })
    }

    /// Replace each string with its first capture group; fails when a
    /// string does not match.
    pub fn regex_capture(pattern: &str) -> ValueTransform {
        let regex = Regex::new(pattern).expect("invalid transform regex");
        value_transform(move |values| {
            let mut out = Vec::new();
            for value in values {
                match value {
                    Value::String(s) => {
                        let captures = regex
                            .captures(&s)
                            .ok_or_else(|| format!("'{}' does not match /{}/", s, regex))?;
                        let group = captures
                            .get(1)
                            .ok_or_else(|| format!("/{}/ has no capture group", regex))?;
                        out.push(Value::String(group.as_str().to_string()));
                    }
                    other => out.push(other),
                }
            }
            Ok(out)
        })
    }

    /// Parse each string as a date with the given `chrono` format and
    /// reformat it as RFC 3339 (midnight UTC). Fails on parse errors.
    pub fn parse_date(format: &str) -> ValueTransform {
        let format = format.to_string();
        value_transform(move |values| {
            let mut out = Vec::new();
            for value in values {
                match value {
                    Value::String(s) => {
                        let date = NaiveDate::parse_from_str(s.trim(), &format)
                            .map_err(|e| format!("cannot parse date '{}': {}", s, e))?;
                        let ts = Utc
                            .from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("valid midnight"));
                        out.push(Value::String(ts.to_rfc3339()));
                    }
                    other => out.push(other),
                }
            }
            Ok(out)
        })
    }

    /// Resolve each string as a URL relative to `base`.
    pub fn resolve_relative(base: &str) -> ValueTransform {
        let base = base.to_string();
        value_transform(move |values| {
            Ok(map_strings(values, |s| {
                crate::utils::resolve(&base, &s).unwrap_or(s).into()
            }))
        })
    }

    /// Remove `;jsessionid=...` path parameters from each URL string.
    pub fn strip_jsessionid() -> ValueTransform {
        let regex = Regex::new(r";jsessionid=[^?]+").expect("invalid transform regex");
        value_transform(move |values| {
            Ok(map_strings(values, |s| {
                regex.replace(&s, "").to_string().into()
            }))
        })
    }

    /// Remove tracking query parameters (`rid`, `qid`) from each URL.
    pub fn strip_tracking_params() -> ValueTransform {
        let regex = Regex::new(r"[?&][qr]id=[^&]+").expect("invalid transform regex");
        value_transform(move |values| {
            Ok(map_strings(values, |s| {
                regex.replace_all(&s, "").to_string().into()
            }))
        })
    }

    /// Remove soft hyphens (U+00AD) from each string.
    pub fn drop_soft_hyphens() -> ValueTransform {
        value_transform(|values| Ok(map_strings(values, |s| s.replace('\u{ad}', "").into())))
    }

    fn map_strings(values: Vec<Value>, f: impl Fn(String) -> Value) -> Vec<Value> {
        values
            .into_iter()
            .map(|value| match value {
                Value::String(s) => f(s),
                other => other,
            })
            .collect()
    }
}
