// src/plugins/eurlex.rs

//! EUR-Lex search portal adapter.
//!
//! The portal serves result pages sorted by document date descending;
//! each result carries a title link to the detail page and direct
//! PDF/HTML links to the document itself. Detail pages expose a
//! dt/dd metadata list that enrichment folds into the document.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::Document;
use crate::scrape::extract::transforms;
use crate::scrape::extract::value_transform;
use crate::scrape::{ExtractionRule, PaginatedResource};
use crate::utils::http::Fetcher;

use super::SitePlugin;

const BASE_URL: &str = "https://eur-lex.europa.eu";

const URL_TEMPLATE: &str = "https://eur-lex.europa.eu/search.html?lang=en\
                            &type=quick&scope=EURLEX&sortOneOrder=desc\
                            &sortOne=DD&locale=en&page={page}";

/// Characters the portal pads metadata keys and values with.
const KEY_PADDING: &[char] = &[' ', '.', ':', ',', ';', '!', '?', '-', '_', '#'];

pub struct EurlexPlugin {
    entry_selector: Selector,
    title_rule: ExtractionRule,
    doc_rule: ExtractionRule,
    detail_rule: ExtractionRule,
    date_list_selector: Selector,
    meta_list_selector: Selector,
    date_regex: Regex,
}

impl EurlexPlugin {
    pub fn new() -> Result<Self> {
        // Result links come in a language-neutral form; pin them to
        // the English rendition before resolving.
        let fix_language = value_transform(|values| {
            Ok(values
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Value::String(s.replace("AUTO", "EN/ALL")),
                    other => other,
                })
                .collect())
        });

        Ok(Self {
            entry_selector: parse_selector("div.SearchResult")?,
            title_rule: ExtractionRule::new("eurlex title", "h2 a.title")?
                .after(transforms::take_first())
                .after(transforms::strip("")),
            doc_rule: ExtractionRule::new(
                "eurlex document link",
                r#"ul[class*="SearchResultDoc"] li a[href*="PDF"], ul[class*="SearchResultDoc"] li a[href*="HTML"]"#,
            )?
            .attr("href")
            .after(transforms::take_first())
            .after(transforms::strip_tracking_params())
            .after(fix_language.clone())
            .after(transforms::resolve_relative(BASE_URL)),
            detail_rule: ExtractionRule::new("eurlex detail link", "h2 a.title")?
                .attr("href")
                .after(transforms::take_first())
                .after(transforms::strip_tracking_params())
                .after(fix_language)
                .after(transforms::resolve_relative(BASE_URL)),
            date_list_selector: parse_selector("dl")?,
            meta_list_selector: parse_selector(r#"dl[class*="NMetadata"]"#)?,
            date_regex: Regex::new(r"(\d{2}/\d{2}/\d{4})").expect("valid date regex"),
        })
    }

    /// Pull the document date out of an entry's definition list.
    fn entry_date(&self, entry: ElementRef<'_>) -> Option<DateTime<Utc>> {
        for list in entry.select(&self.date_list_selector) {
            for (key, pieces) in definition_pairs(list) {
                if !(key.contains("Date") || key.contains("Datum")) {
                    continue;
                }
                let joined = pieces.join(" ");
                if let Some(m) = self.date_regex.captures(&joined) {
                    let date = NaiveDate::parse_from_str(&m[1], "%d/%m/%Y").ok()?;
                    return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
                }
            }
        }
        None
    }

    /// Collect detail-page metadata as (key, value) pairs.
    fn collect_metadata(&self, page: &Html) -> Vec<(String, Value)> {
        let mut fields = Vec::new();
        for list in page.select(&self.meta_list_selector) {
            for (key, pieces) in definition_pairs(list) {
                if key.is_empty() || pieces.is_empty() {
                    continue;
                }
                let value = if pieces.len() == 1 {
                    Value::String(pieces.into_iter().next().expect("one piece"))
                } else {
                    Value::Array(pieces.into_iter().map(Value::String).collect())
                };
                fields.push((key, value));
            }
        }
        fields
    }
}

#[async_trait]
impl SitePlugin for EurlexPlugin {
    fn name(&self) -> &str {
        "eurlex"
    }

    fn source_name(&self) -> &str {
        "EurLex"
    }

    fn pages(&self) -> PaginatedResource {
        PaginatedResource::new(URL_TEMPLATE)
    }

    fn find_entries(&self, page: &Html) -> Vec<Document> {
        let mut docs = Vec::new();
        for entry in page.root_element().select(&self.entry_selector) {
            let url = self.doc_rule.first_str(entry).unwrap_or_default();
            let mut doc = Document::new(url);
            doc.title = self.title_rule.first_str(entry).unwrap_or_default();
            doc.detail_url = self.detail_rule.first_str(entry);
            doc.published_date = self.entry_date(entry);
            docs.push(doc);
        }
        docs
    }

    async fn process_document(&self, doc: &mut Document, fetcher: &Fetcher) -> Result<()> {
        let Some(detail_url) = doc.detail_url.clone() else {
            return Ok(());
        };
        let page = fetcher.fetch_page(&detail_url).await?;
        let fields = self.collect_metadata(&page);
        drop(page);

        if fields.is_empty() {
            return Err(AppError::crawl(
                &doc.url,
                format!("detail page '{}' carries no metadata list", detail_url),
            ));
        }
        for (key, value) in fields {
            doc.set_meta(&key, value);
        }
        Ok(())
    }
}

/// Walk a `<dl>` in document order, pairing each `<dt>` with the text
/// pieces of the `<dd>` elements that follow it.
fn definition_pairs(list: ElementRef<'_>) -> Vec<(String, Vec<String>)> {
    let mut pairs = Vec::new();
    let mut current_key: Option<String> = None;

    for child in list.children() {
        let Some(element) = ElementRef::wrap(child) else {
            continue;
        };
        match element.value().name() {
            "dt" => {
                current_key = Some(clean_fragment(&element.text().collect::<String>()));
            }
            "dd" => {
                if let Some(key) = &current_key {
                    let pieces: Vec<String> = element
                        .text()
                        .map(clean_fragment)
                        .filter(|piece| !piece.is_empty())
                        .collect();
                    pairs.push((key.clone(), pieces));
                }
            }
            _ => {}
        }
    }
    pairs
}

fn clean_fragment(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(KEY_PADDING)
        .to_string()
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::selector(selector, format!("{e:?}")))
}
