//! End-to-end pipeline behavior against a mock HTTP source.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use regwatch::convert::{ContentConverter, ConvertContext, ConverterRegistry};
use regwatch::error::{AppError, Result};
use regwatch::models::{
    ConvertConfig, CrawlerConfig, Document, FallbackMode, PipelineConfig,
};
use regwatch::pipeline::{PipelineDeps, PluginRunner, RunOptions, cancel_pair};
use regwatch::plugins::SitePlugin;
use regwatch::scrape::{ExtractionRule, PaginatedResource};
use regwatch::scrape::extract::transforms;
use regwatch::storage::{ContentStore, MemoryIndex};
use regwatch::utils::http::Fetcher;

// --- fixtures -------------------------------------------------------

fn test_fetcher() -> Fetcher {
    Fetcher::new(&CrawlerConfig {
        user_agent: "regwatch-test".into(),
        timeout_secs: 10,
        max_retries: 2,
        retry_backoff_ms: 1,
    })
    .unwrap()
}

fn test_converters() -> ConverterRegistry {
    ConverterRegistry::from_config(&ConvertConfig {
        fallback: FallbackMode::Pass,
        office: None,
        html: None,
    })
}

fn entry_html(url: &str, title: &str, date: Option<&str>) -> String {
    let date_attr = date
        .map(|d| format!(" data-date=\"{}\"", d))
        .unwrap_or_default();
    format!(
        "<div class=\"entry\"{}><a class=\"doc\" href=\"{}\">{}</a></div>",
        date_attr, url, title
    )
}

fn page_html(entries: &[String]) -> String {
    format!("<html><body>{}</body></html>", entries.join("\n"))
}

fn empty_page() -> String {
    page_html(&[])
}

/// Site adapter over the mock server's `/list?page=N` resource.
struct MockPlugin {
    template: String,
    entry_selector: Selector,
    url_rule: ExtractionRule,
    title_rule: ExtractionRule,
}

impl MockPlugin {
    fn new(base: &str) -> Arc<Self> {
        Arc::new(Self {
            template: format!("{}/list?page={{page}}", base),
            entry_selector: Selector::parse("div.entry").unwrap(),
            url_rule: ExtractionRule::new("mock url", "a.doc")
                .unwrap()
                .attr("href")
                .after(transforms::take_first()),
            title_rule: ExtractionRule::new("mock title", "a.doc")
                .unwrap()
                .after(transforms::take_first()),
        })
    }
}

#[async_trait]
impl SitePlugin for MockPlugin {
    fn name(&self) -> &str {
        "mock"
    }

    fn source_name(&self) -> &str {
        "Mock Source"
    }

    fn pages(&self) -> PaginatedResource {
        PaginatedResource::new(self.template.clone())
    }

    fn find_entries(&self, page: &Html) -> Vec<Document> {
        let mut docs = Vec::new();
        for entry in page.root_element().select(&self.entry_selector) {
            let url = self.url_rule.first_str(entry).unwrap_or_default();
            let mut doc = Document::new(url);
            doc.title = self.title_rule.first_str(entry).unwrap_or_default();
            doc.published_date = entry
                .value()
                .attr("data-date")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc));
            docs.push(doc);
        }
        docs
    }

    async fn process_document(&self, _doc: &mut Document, _fetcher: &Fetcher) -> Result<()> {
        Ok(())
    }
}

/// Converter that always fails; used to break one document's pipeline.
struct FailingConverter;

#[async_trait]
impl ContentConverter for FailingConverter {
    async fn convert(&self, _content: &[u8], _ctx: &ConvertContext) -> Result<Option<Vec<u8>>> {
        Err(AppError::conversion("failing-converter", "always fails"))
    }
}

async fn mount_list_page(server: &MockServer, page: u32, body: String) {
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
        .mount(server)
        .await;
}

async fn mount_file(server: &MockServer, name: &str, body: &str, content_type: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/files/{}", name)))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), content_type))
        .mount(server)
        .await;
}

async fn list_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/list")
        .count()
}

async fn requests_for_page(server: &MockServer, page: u32) -> usize {
    let needle = format!("page={}", page);
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| {
            r.url.path() == "/list" && r.url.query().unwrap_or("").contains(&needle)
        })
        .count()
}

// --- fetcher properties ---------------------------------------------

#[tokio::test]
async fn fetcher_gives_up_after_max_retries() {
    // nothing listens on port 9; every attempt is a connection error
    let fetcher = Fetcher::new(&CrawlerConfig {
        user_agent: "regwatch-test".into(),
        timeout_secs: 2,
        max_retries: 3,
        retry_backoff_ms: 1,
    })
    .unwrap();

    let err = fetcher.fetch("http://127.0.0.1:9/doc").await.unwrap_err();
    match err {
        AppError::ConnectionFailed { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected ConnectionFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn fetcher_returns_http_errors_as_responses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let response = test_fetcher()
        .fetch(&format!("{}/missing", server.uri()))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

// --- paginator properties -------------------------------------------

#[tokio::test]
async fn paginator_yields_exactly_max_pages() {
    let server = MockServer::start().await;
    for page in 1..=5u32 {
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(query_param("n", page.to_string()))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html><body>x</body></html>", "text/html"),
            )
            .mount(&server)
            .await;
    }

    let fetcher = test_fetcher();
    let mut pages = PaginatedResource::new(format!("{}/page?n={{page}}", server.uri())).up_to(3);

    let mut yielded = 0;
    while pages.next_page(&fetcher).await.is_some() {
        yielded += 1;
    }
    assert_eq!(yielded, 3);

    // page 4 was never requested
    let fetched: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.query().unwrap_or("").to_string())
        .collect();
    assert!(!fetched.iter().any(|q| q.contains("n=4")), "{fetched:?}");
}

#[tokio::test]
async fn paginator_stops_on_http_error() {
    let server = MockServer::start().await;
    for page in 1..=2u32 {
        Mock::given(method("GET"))
            .and(path("/page"))
            .and(query_param("n", page.to_string()))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html><body>x</body></html>", "text/html"),
            )
            .mount(&server)
            .await;
    }
    // page 3 falls through to wiremock's default 404

    let fetcher = test_fetcher();
    let mut pages = PaginatedResource::new(format!("{}/page?n={{page}}", server.uri()));

    let mut yielded = 0;
    while pages.next_page(&fetcher).await.is_some() {
        yielded += 1;
    }
    assert_eq!(yielded, 2);
}

// --- pipeline properties --------------------------------------------

#[tokio::test]
async fn run_stores_discovered_documents() {
    let server = MockServer::start().await;
    let base = server.uri();

    let entries = vec![
        entry_html(&format!("{base}/files/a"), "Doc A", None),
        entry_html(&format!("{base}/files/b"), "Doc B", None),
        entry_html(&format!("{base}/files/c"), "Doc C", None),
        // entry without a link: dropped before the queue
        "<div class=\"entry\"><a class=\"doc\">No link</a></div>".to_string(),
    ];
    mount_list_page(&server, 1, page_html(&entries)).await;
    mount_list_page(&server, 2, empty_page()).await;
    mount_file(&server, "a", "content a", "application/pdf").await;
    mount_file(&server, "b", "content b", "application/pdf").await;
    mount_file(&server, "c", "content c", "application/pdf").await;

    let tmp = TempDir::new().unwrap();
    let index = Arc::new(MemoryIndex::new());
    let deps = PipelineDeps {
        fetcher: test_fetcher(),
        converters: test_converters(),
        content_store: ContentStore::open(tmp.path()).await.unwrap(),
        index: index.clone(),
    };
    let runner = PluginRunner::new(
        MockPlugin::new(&base),
        deps,
        &PipelineConfig {
            queue_capacity: 100,
            workers: 4,
        },
    );

    let summary = runner.run(RunOptions::default()).await.unwrap();
    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.stored, 3);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.failed, 0);

    let inserted = index.inserted().await;
    assert_eq!(inserted.len(), 3);
    for doc in &inserted {
        assert_eq!(doc.source_name, "Mock Source");
        assert_eq!(doc.content_hash.as_ref().unwrap().len(), 64);
    }
}

#[tokio::test]
async fn byte_identical_documents_dedup_to_one_entry() {
    let server = MockServer::start().await;
    let base = server.uri();

    let entries = vec![
        entry_html(&format!("{base}/files/first"), "First", None),
        entry_html(&format!("{base}/files/second"), "Second", None),
    ];
    mount_list_page(&server, 1, page_html(&entries)).await;
    mount_list_page(&server, 2, empty_page()).await;
    mount_file(&server, "first", "identical bytes", "application/pdf").await;
    mount_file(&server, "second", "identical bytes", "application/pdf").await;

    let tmp = TempDir::new().unwrap();
    let store_dir = tmp.path().join("files");
    let index = Arc::new(MemoryIndex::new());
    let deps = PipelineDeps {
        fetcher: test_fetcher(),
        converters: test_converters(),
        content_store: ContentStore::open(&store_dir).await.unwrap(),
        index: index.clone(),
    };
    let runner = PluginRunner::new(
        MockPlugin::new(&base),
        deps,
        &PipelineConfig {
            queue_capacity: 100,
            workers: 4,
        },
    );

    let summary = runner.run(RunOptions::default()).await.unwrap();
    assert_eq!(summary.discovered, 2);
    assert_eq!(summary.stored + summary.skipped, 2);
    assert_eq!(summary.stored, 1, "identical content indexes once");
    assert_eq!(summary.failed, 0);

    // content-addressing keeps exactly one file
    let files = std::fs::read_dir(&store_dir).unwrap().count();
    assert_eq!(files, 1);
}

#[tokio::test]
async fn one_failing_document_does_not_affect_the_batch() {
    let server = MockServer::start().await;
    let base = server.uri();

    let mut entries = Vec::new();
    for i in 1..=10u32 {
        entries.push(entry_html(
            &format!("{base}/files/{i}"),
            &format!("Doc {i}"),
            None,
        ));
    }
    mount_list_page(&server, 1, page_html(&entries)).await;
    mount_list_page(&server, 2, empty_page()).await;
    for i in 1..=10u32 {
        let content_type = if i == 5 {
            "application/x-broken"
        } else {
            "application/pdf"
        };
        mount_file(&server, &i.to_string(), &format!("content {i}"), content_type).await;
    }

    let mut converters = test_converters();
    converters.register("application/x-broken", Arc::new(FailingConverter));

    let tmp = TempDir::new().unwrap();
    let index = Arc::new(MemoryIndex::new());
    let deps = PipelineDeps {
        fetcher: test_fetcher(),
        converters,
        content_store: ContentStore::open(tmp.path()).await.unwrap(),
        index: index.clone(),
    };
    let runner = PluginRunner::new(
        MockPlugin::new(&base),
        deps,
        &PipelineConfig {
            queue_capacity: 100,
            workers: 4,
        },
    );

    let summary = runner.run(RunOptions::default()).await.unwrap();
    assert_eq!(summary.discovered, 10);
    assert_eq!(summary.stored, 9);
    assert_eq!(summary.failed, 1);
    assert_eq!(index.inserted().await.len(), 9);
}

#[tokio::test]
async fn discovery_stops_at_known_document_dated_in_the_past() {
    let server = MockServer::start().await;
    let base = server.uri();

    let today = Utc::now().to_rfc3339();
    let fresh_url = format!("{base}/files/fresh");
    let known_url = format!("{base}/files/known");
    let entries = vec![
        entry_html(&fresh_url, "Fresh", Some(&today)),
        entry_html(&known_url, "Known old", Some("2020-01-01T00:00:00Z")),
    ];
    mount_list_page(&server, 1, page_html(&entries)).await;
    mount_list_page(
        &server,
        2,
        page_html(&[entry_html(
            &format!("{base}/files/later"),
            "Later",
            Some("2019-06-01T00:00:00Z"),
        )]),
    )
    .await;
    mount_list_page(&server, 3, empty_page()).await;
    mount_file(&server, "fresh", "fresh content", "application/pdf").await;
    mount_file(&server, "later", "later content", "application/pdf").await;

    let index = Arc::new(MemoryIndex::new());
    index.mark_known(&known_url).await;

    let tmp = TempDir::new().unwrap();
    let deps = PipelineDeps {
        fetcher: test_fetcher(),
        converters: test_converters(),
        content_store: ContentStore::open(tmp.path()).await.unwrap(),
        index: index.clone(),
    };
    let runner = PluginRunner::new(
        MockPlugin::new(&base),
        deps,
        &PipelineConfig {
            queue_capacity: 100,
            workers: 2,
        },
    );

    let summary = runner.run(RunOptions::default()).await.unwrap();
    assert_eq!(summary.discovered, 1, "only the fresh document is new");
    assert_eq!(summary.stored, 1);

    // discovery halted before scanning further pages
    assert_eq!(requests_for_page(&server, 2).await, 0);
}

#[tokio::test]
async fn initial_run_scans_past_known_documents() {
    let server = MockServer::start().await;
    let base = server.uri();

    let known_url = format!("{base}/files/known");
    mount_list_page(
        &server,
        1,
        page_html(&[entry_html(&known_url, "Known old", Some("2020-01-01T00:00:00Z"))]),
    )
    .await;
    mount_list_page(
        &server,
        2,
        page_html(&[entry_html(
            &format!("{base}/files/deep"),
            "Deep",
            Some("2019-06-01T00:00:00Z"),
        )]),
    )
    .await;
    mount_list_page(&server, 3, empty_page()).await;
    mount_file(&server, "deep", "deep content", "application/pdf").await;

    let index = Arc::new(MemoryIndex::new());
    index.mark_known(&known_url).await;

    let tmp = TempDir::new().unwrap();
    let deps = PipelineDeps {
        fetcher: test_fetcher(),
        converters: test_converters(),
        content_store: ContentStore::open(tmp.path()).await.unwrap(),
        index: index.clone(),
    };
    let runner = PluginRunner::new(
        MockPlugin::new(&base),
        deps,
        &PipelineConfig {
            queue_capacity: 100,
            workers: 2,
        },
    );

    let summary = runner
        .run(RunOptions {
            limit: None,
            initial: true,
        })
        .await
        .unwrap();
    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.stored, 1);
    assert!(requests_for_page(&server, 2).await > 0);
}

#[tokio::test]
async fn discovery_respects_fetch_limit() {
    let server = MockServer::start().await;
    let base = server.uri();

    let mut entries = Vec::new();
    for i in 1..=8u32 {
        entries.push(entry_html(
            &format!("{base}/files/{i}"),
            &format!("Doc {i}"),
            None,
        ));
        mount_file(&server, &i.to_string(), &format!("content {i}"), "application/pdf").await;
    }
    mount_list_page(&server, 1, page_html(&entries)).await;
    mount_list_page(&server, 2, empty_page()).await;

    let tmp = TempDir::new().unwrap();
    let index = Arc::new(MemoryIndex::new());
    let deps = PipelineDeps {
        fetcher: test_fetcher(),
        converters: test_converters(),
        content_store: ContentStore::open(tmp.path()).await.unwrap(),
        index: index.clone(),
    };
    let runner = PluginRunner::new(
        MockPlugin::new(&base),
        deps,
        &PipelineConfig {
            queue_capacity: 100,
            workers: 2,
        },
    );

    let summary = runner
        .run(RunOptions {
            limit: Some(3),
            initial: false,
        })
        .await
        .unwrap();
    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.stored, 3);
}

#[tokio::test]
async fn full_queue_blocks_discovery_and_cancel_stops_the_run() {
    let server = MockServer::start().await;
    let base = server.uri();

    const PAGES: u32 = 20;
    for page in 1..=PAGES {
        mount_list_page(
            &server,
            page,
            page_html(&[entry_html(
                &format!("{base}/files/{page}"),
                &format!("Doc {page}"),
                None,
            )]),
        )
        .await;
    }
    // downloads are slow, so the single worker drains at ~3/s
    Mock::given(method("GET"))
        .and(wiremock::matchers::path_regex(r"^/files/\d+$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(300))
                .set_body_raw("slow content", "application/pdf"),
        )
        .mount(&server)
        .await;

    let tmp = TempDir::new().unwrap();
    let index = Arc::new(MemoryIndex::new());
    let deps = PipelineDeps {
        fetcher: test_fetcher(),
        converters: test_converters(),
        content_store: ContentStore::open(tmp.path()).await.unwrap(),
        index: index.clone(),
    };
    let runner = PluginRunner::new(
        MockPlugin::new(&base),
        deps,
        &PipelineConfig {
            queue_capacity: 2,
            workers: 1,
        },
    );

    let (handle, token) = cancel_pair();
    let run = tokio::spawn(async move {
        runner
            .run_with_cancel(RunOptions::default(), token)
            .await
    });

    tokio::time::sleep(Duration::from_millis(700)).await;
    let fetched_while_running = list_requests(&server).await;
    assert!(
        fetched_while_running <= 10,
        "discovery should be held back by the full queue, fetched {fetched_while_running} pages"
    );

    handle.cancel();
    let summary = tokio::time::timeout(Duration::from_secs(15), run)
        .await
        .expect("run finishes after cancellation")
        .expect("run task does not panic")
        .expect("run returns a summary");

    // in-flight work finished naturally; nothing close to all pages ran
    assert!(summary.discovered < PAGES as usize);
    let fetched_after_cancel = list_requests(&server).await;
    assert!(fetched_after_cancel <= fetched_while_running + 2);
}
