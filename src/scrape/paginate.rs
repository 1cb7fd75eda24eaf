// src/scrape/paginate.rs

//! Lazy iteration over a paginated resource.

use scraper::Html;

use crate::utils::http::Fetcher;

/// A templated, paginated resource yielding one parsed page at a time.
///
/// The URL template uses `{page}` as the page-number wildcard. Pages
/// are fetched lazily, one per [`next_page`](Self::next_page) call, so
/// a caller bounds memory and can stop iterating at any point. A fresh
/// instance always restarts at `min_page`.
#[derive(Debug, Clone)]
pub struct PaginatedResource {
    url_template: String,
    min_page: u32,
    max_page: Option<u32>,
    step: u32,
    cur_page: u32,
    done: bool,
}

impl PaginatedResource {
    /// Create a resource starting at page 1 with step 1 and no upper
    /// bound.
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            min_page: 1,
            max_page: None,
            step: 1,
            cur_page: 1,
            done: false,
        }
    }

    /// Set the first page number.
    pub fn starting_at(mut self, min_page: u32) -> Self {
        self.min_page = min_page;
        self.cur_page = min_page;
        self
    }

    /// Set the last page number (inclusive).
    pub fn up_to(mut self, max_page: u32) -> Self {
        self.max_page = Some(max_page);
        self
    }

    /// Set the page increment.
    pub fn step_by(mut self, step: u32) -> Self {
        self.step = step.max(1);
        self
    }

    /// The URL for a given page number.
    pub fn page_url(&self, page: u32) -> String {
        self.url_template.replace("{page}", &page.to_string())
    }

    /// Rewind to the first page.
    pub fn reset(&mut self) {
        self.cur_page = self.min_page;
        self.done = false;
    }

    /// Fetch and parse the next page.
    ///
    /// Returns `None` once the resource is exhausted: the configured
    /// `max_page` was passed, the fetch failed terminally, or the
    /// server answered with a non-success status.
    pub async fn next_page(&mut self, fetcher: &Fetcher) -> Option<Html> {
        if self.done {
            return None;
        }
        if let Some(max) = self.max_page {
            if self.cur_page > max {
                self.done = true;
                return None;
            }
        }

        let url = self.page_url(self.cur_page);
        let response = match fetcher.fetch(&url).await {
            Ok(response) => response,
            Err(err) => {
                log::warn!("Pagination stopped, fetch of '{}' failed: {}", url, err);
                self.done = true;
                return None;
            }
        };

        if !response.status().is_success() {
            log::debug!(
                "Pagination stopped, '{}' answered {}",
                url,
                response.status()
            );
            self.done = true;
            return None;
        }

        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                log::warn!("Pagination stopped, body of '{}' unreadable: {}", url, err);
                self.done = true;
                return None;
            }
        };

        self.cur_page += self.step;
        Some(Html::parse_document(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_substitution() {
        let pages = PaginatedResource::new("https://example.com/search?page={page}");
        assert_eq!(pages.page_url(3), "https://example.com/search?page=3");
    }

    #[test]
    fn test_builders() {
        let pages = PaginatedResource::new("https://example.com/p/{page}")
            .starting_at(0)
            .up_to(10)
            .step_by(2);
        assert_eq!(pages.cur_page, 0);
        assert_eq!(pages.max_page, Some(10));
        assert_eq!(pages.step, 2);
    }

    #[test]
    fn test_reset_rewinds_to_min_page() {
        let mut pages = PaginatedResource::new("https://example.com/p/{page}").starting_at(2);
        pages.cur_page = 9;
        pages.done = true;
        pages.reset();
        assert_eq!(pages.cur_page, 2);
        assert!(!pages.done);
    }
}
