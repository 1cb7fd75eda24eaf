// src/plugins/bafin.rs

//! BaFin search portal adapter.
//!
//! Result entries link a detail page and usually a direct document
//! file; when the file link is missing the detail page itself is the
//! document. Titles arrive with soft hyphens, dates in German
//! DD.MM.YYYY form, and detail pages reference related publications
//! through `RichTextIntLink` anchors.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::Document;
use crate::scrape::extract::transforms;
use crate::scrape::{ExtractionRule, PaginatedResource};
use crate::utils::http::Fetcher;

use super::SitePlugin;

const BASE_URL: &str = "https://www.bafin.de";

const URL_TEMPLATE: &str = "https://www.bafin.de/SiteGlobals/Forms/Suche/\
                            Servicesuche_Formular.html?input_=7844616\
                            &gts=7855320_list%253DdateOfIssue_dt%252Bdesc\
                            &gtp=7855320_list%253D{page}\
                            &resourceId=7844738&language_=de&pageLocale=de";

pub struct BafinPlugin {
    entry_selector: Selector,
    title_rule: ExtractionRule,
    detail_rule: ExtractionRule,
    doc_rule: ExtractionRule,
    topic_rule: ExtractionRule,
    meta_selector: Selector,
    mentioned_selector: Selector,
    date_regex: Regex,
    format_regex: Regex,
    jsession_regex: Regex,
}

impl BafinPlugin {
    pub fn new() -> Result<Self> {
        Ok(Self {
            entry_selector: parse_selector(r#"div[class*="search-result"]"#)?,
            title_rule: ExtractionRule::new("bafin title", "h3 a")?
                .after(transforms::take_first())
                .after(transforms::drop_soft_hyphens())
                .after(transforms::strip("")),
            detail_rule: ExtractionRule::new("bafin detail link", "h3 a")?
                .attr("href")
                .after(transforms::take_first())
                .after(transforms::strip_jsessionid())
                .after(transforms::resolve_relative(BASE_URL)),
            doc_rule: ExtractionRule::new("bafin document link", "ul.links li a")?
                .attr("href")
                .after(transforms::take_first())
                .after(transforms::strip_jsessionid())
                .after(transforms::resolve_relative(BASE_URL)),
            topic_rule: ExtractionRule::new("bafin topic", "h3 span.thema a")?
                .after(transforms::split(", ")),
            meta_selector: parse_selector("h3 span.metadata")?,
            mentioned_selector: parse_selector(r#"div#content a[class*="RichTextIntLink"]"#)?,
            date_regex: Regex::new(r"(\d{2}\.\d{2}\.\d{4})").expect("valid date regex"),
            format_regex: Regex::new(r"Format:\s*([^|]+)").expect("valid format regex"),
            jsession_regex: Regex::new(r";jsessionid=[^?]+").expect("valid jsessionid regex"),
        })
    }

    fn metadata_text(&self, entry: ElementRef<'_>) -> String {
        entry
            .select(&self.meta_selector)
            .flat_map(|el| el.text())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn entry_date(&self, meta_text: &str) -> Option<DateTime<Utc>> {
        let m = self.date_regex.captures(meta_text)?;
        let date = NaiveDate::parse_from_str(&m[1], "%d.%m.%Y").ok()?;
        Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
    }

    fn entry_types(&self, meta_text: &str) -> Vec<String> {
        self.format_regex
            .captures(meta_text)
            .map(|m| {
                m[1].split(", ")
                    .map(|piece| piece.trim().to_string())
                    .filter(|piece| !piece.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Collect related publication links from a detail page.
    fn collect_mentioned(&self, page: &Html) -> Vec<String> {
        page.select(&self.mentioned_selector)
            .filter_map(|el| el.value().attr("href"))
            .map(|href| {
                let cleaned = self.jsession_regex.replace(href, "").to_string();
                crate::utils::resolve(BASE_URL, &cleaned).unwrap_or(cleaned)
            })
            .collect()
    }
}

#[async_trait]
impl SitePlugin for BafinPlugin {
    fn name(&self) -> &str {
        "bafin"
    }

    fn source_name(&self) -> &str {
        "BaFin"
    }

    fn pages(&self) -> PaginatedResource {
        PaginatedResource::new(URL_TEMPLATE)
    }

    fn find_entries(&self, page: &Html) -> Vec<Document> {
        let mut docs = Vec::new();
        for entry in page.root_element().select(&self.entry_selector) {
            let detail = self.detail_rule.first_str(entry);
            // the detail page stands in when no file is linked
            let url = self
                .doc_rule
                .first_str(entry)
                .or_else(|| detail.clone())
                .unwrap_or_default();

            let mut doc = Document::new(url);
            doc.title = self.title_rule.first_str(entry).unwrap_or_default();
            doc.detail_url = detail;

            let meta_text = self.metadata_text(entry);
            doc.published_date = self.entry_date(&meta_text);

            let topics = self.topic_rule.apply(entry);
            if !topics.is_empty() {
                doc.set_meta("topic", Value::Array(topics));
            }
            let types = self.entry_types(&meta_text);
            if !types.is_empty() {
                doc.set_meta(
                    "type",
                    Value::Array(types.into_iter().map(Value::String).collect()),
                );
            }
            docs.push(doc);
        }
        docs
    }

    async fn process_document(&self, doc: &mut Document, fetcher: &Fetcher) -> Result<()> {
        let Some(detail_url) = doc.detail_url.clone() else {
            return Ok(());
        };
        let page = fetcher.fetch_page(&detail_url).await?;
        let mentioned = self.collect_mentioned(&page);
        drop(page);

        if !mentioned.is_empty() {
            doc.set_meta(
                "mentioned",
                Value::Array(mentioned.into_iter().map(Value::String).collect()),
            );
        }
        Ok(())
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| AppError::selector(selector, format!("{e:?}")))
}
