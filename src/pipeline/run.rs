// src/pipeline/run.rs

//! Pipeline orchestrator: bounded-queue discovery plus a worker pool.
//!
//! Discovery iterates the plugin's paginated resource and filters
//! candidates against the document index; survivors enter a bounded
//! queue whose `send` blocks once full, so discovery can never outrun
//! the workers. Each worker runs the per-document stage sequence
//! enrich -> download -> convert -> store, catching failures at the
//! document boundary.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::{Mutex, mpsc};

use crate::convert::ConverterRegistry;
use crate::error::{AppError, Result};
use crate::models::{Document, DocumentStatus, PipelineConfig};
use crate::plugins::SitePlugin;
use crate::storage::content::ContentStore;
use crate::storage::{DocumentIndex, InsertOutcome};
use crate::utils;
use crate::utils::http::Fetcher;

use super::CancelToken;

/// Shared collaborators of one crawl run.
pub struct PipelineDeps {
    pub fetcher: Fetcher,
    pub converters: ConverterRegistry,
    pub content_store: ContentStore,
    pub index: Arc<dyn DocumentIndex>,
}

/// Caller-supplied parameters of one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stop discovery after this many newly enqueued documents
    pub limit: Option<usize>,

    /// Initial import: known documents never end discovery early
    pub initial: bool,
}

/// Counts reported when a run completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Documents that passed discovery filtering and were enqueued
    pub discovered: usize,
    /// Documents stored in the content store and index
    pub stored: usize,
    /// Documents skipped (no usable content, or already indexed)
    pub skipped: usize,
    /// Documents that failed a pipeline stage
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct WorkerStats {
    stored: usize,
    skipped: usize,
    failed: usize,
}

enum DocOutcome {
    Stored,
    Skipped(&'static str),
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<Document>>>;

/// Drives one plugin through a complete crawl run.
pub struct PluginRunner {
    plugin: Arc<dyn SitePlugin>,
    deps: Arc<PipelineDeps>,
    queue_capacity: usize,
    workers: usize,
}

impl PluginRunner {
    pub fn new(plugin: Arc<dyn SitePlugin>, deps: PipelineDeps, config: &PipelineConfig) -> Self {
        Self {
            plugin,
            deps: Arc::new(deps),
            queue_capacity: config.queue_capacity.max(1),
            workers: config.workers.max(1),
        }
    }

    /// Run the plugin to completion.
    pub async fn run(&self, opts: RunOptions) -> Result<RunSummary> {
        self.run_with_cancel(opts, CancelToken::never()).await
    }

    /// Run the plugin, stopping early when the token fires.
    ///
    /// The call returns only after discovery has finished, the queue
    /// has drained and every dispatched worker has returned.
    pub async fn run_with_cancel(
        &self,
        opts: RunOptions,
        cancel: CancelToken,
    ) -> Result<RunSummary> {
        log::info!("[{}] crawl starting", self.plugin.name());
        let (tx, rx) = mpsc::channel::<Document>(self.queue_capacity);
        let shared_rx: SharedReceiver = Arc::new(Mutex::new(rx));

        let mut handles = Vec::with_capacity(self.workers);
        for worker in 0..self.workers {
            let plugin = Arc::clone(&self.plugin);
            let deps = Arc::clone(&self.deps);
            let rx = Arc::clone(&shared_rx);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(worker_loop(worker, plugin, deps, rx, cancel)));
        }

        // Discovery runs here; dropping `tx` at the end is what lets
        // the workers drain the queue and exit.
        let discovered = self.discover(tx, &opts, cancel).await;

        let mut summary = RunSummary {
            discovered,
            ..RunSummary::default()
        };
        for joined in join_all(handles).await {
            match joined {
                Ok(stats) => {
                    summary.stored += stats.stored;
                    summary.skipped += stats.skipped;
                    summary.failed += stats.failed;
                }
                Err(err) => log::error!("[{}] worker panicked: {}", self.plugin.name(), err),
            }
        }

        log::info!(
            "[{}] crawl complete: {} discovered, {} stored, {} skipped, {} failed",
            self.plugin.name(),
            summary.discovered,
            summary.stored,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    /// Discovery loop: iterate pages, filter entries, enqueue.
    ///
    /// Entries arrive newest first on these sources, so hitting a
    /// known document dated before today means everything further back
    /// is known as well and discovery stops (unless the run is an
    /// initial import).
    async fn discover(
        &self,
        tx: mpsc::Sender<Document>,
        opts: &RunOptions,
        cancel: CancelToken,
    ) -> usize {
        let mut pages = self.plugin.pages();
        let today = Utc::now().date_naive();
        let mut enqueued = 0usize;

        'pages: loop {
            if cancel.is_cancelled() {
                log::info!("[{}] discovery cancelled", self.plugin.name());
                break;
            }

            let entries = {
                let Some(page) = pages.next_page(&self.deps.fetcher).await else {
                    break;
                };
                self.plugin.find_entries(&page)
            };
            if entries.is_empty() {
                log::debug!("[{}] page without entries, discovery done", self.plugin.name());
                break;
            }

            for mut doc in entries {
                if cancel.is_cancelled() {
                    log::info!("[{}] discovery cancelled", self.plugin.name());
                    break 'pages;
                }
                if !doc.has_url() {
                    log::debug!("[{}] entry without url dropped", self.plugin.name());
                    continue;
                }

                let exists = match self.deps.index.exists_document(&doc.url).await {
                    Ok(exists) => exists,
                    Err(err) => {
                        log::warn!(
                            "[{}] existence check for '{}' failed: {}",
                            self.plugin.name(),
                            doc.url,
                            err
                        );
                        continue;
                    }
                };
                if exists {
                    if !opts.initial {
                        if let Some(date) = doc.published_date {
                            if date.date_naive() < today {
                                log::debug!(
                                    "[{}] known document '{}' dated in the past, stopping discovery",
                                    self.plugin.name(),
                                    doc.url
                                );
                                break 'pages;
                            }
                        }
                    }
                    log::debug!("[{}] document '{}' already known", self.plugin.name(), doc.url);
                    continue;
                }

                doc.source_name = self.plugin.source_name().to_string();
                log::info!("[{}] found document {}", self.plugin.name(), doc.url);
                // blocks while the queue is full: backpressure
                if tx.send(doc).await.is_err() {
                    break 'pages;
                }
                enqueued += 1;

                if let Some(limit) = opts.limit {
                    if enqueued >= limit {
                        log::info!(
                            "[{}] fetch limit of {} reached, stopping discovery",
                            self.plugin.name(),
                            limit
                        );
                        break 'pages;
                    }
                }
            }
        }
        enqueued
    }
}

/// One worker: dequeue documents until the queue closes or the run is
/// cancelled, running the full per-document pipeline for each.
async fn worker_loop(
    worker: usize,
    plugin: Arc<dyn SitePlugin>,
    deps: Arc<PipelineDeps>,
    rx: SharedReceiver,
    mut cancel: CancelToken,
) -> WorkerStats {
    log::debug!("[{}] worker {} started", plugin.name(), worker);
    let mut stats = WorkerStats::default();

    loop {
        let next = {
            let mut guard = rx.lock().await;
            // cancellation wins over a non-empty queue: idle workers
            // stop dequeuing, in-flight documents finish naturally
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                doc = guard.recv() => doc,
            }
        };
        let Some(mut doc) = next else {
            break;
        };

        match process_one(&mut doc, plugin.as_ref(), deps.as_ref()).await {
            Ok(DocOutcome::Stored) => {
                stats.stored += 1;
                log::info!("[{}] stored '{}'", plugin.name(), doc.url);
            }
            Ok(DocOutcome::Skipped(reason)) => {
                stats.skipped += 1;
                log::info!("[{}] skipped '{}': {}", plugin.name(), doc.url, reason);
            }
            Err((stage, err)) => {
                doc.status = DocumentStatus::Failed;
                stats.failed += 1;
                log::error!(
                    "[{}] document '{}' failed at {}: {}",
                    plugin.name(),
                    doc.url,
                    stage,
                    err
                );
            }
        }
    }

    log::debug!("[{}] worker {} stopped", plugin.name(), worker);
    stats
}

/// The fixed per-document stage sequence. The error carries the stage
/// name for operator diagnosis; any stage error fails only this
/// document.
async fn process_one(
    doc: &mut Document,
    plugin: &dyn SitePlugin,
    deps: &PipelineDeps,
) -> std::result::Result<DocOutcome, (&'static str, AppError)> {
    // Stage 1: enrich. Partial metadata is acceptable, so failures
    // only warn.
    if let Err(err) = plugin.process_document(doc, &deps.fetcher).await {
        log::warn!(
            "[{}] enrichment of '{}' failed, keeping partial metadata: {}",
            plugin.name(),
            doc.url,
            err
        );
    }

    // Stage 2: download.
    let response = deps
        .fetcher
        .fetch(&doc.url)
        .await
        .map_err(|e| ("download", e))?;
    let status = response.status();
    if !status.is_success() {
        return Err((
            "download",
            AppError::crawl(doc.url.clone(), format!("HTTP status {}", status)),
        ));
    }
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let raw = response
        .bytes()
        .await
        .map_err(|e| ("download", AppError::from(e)))?
        .to_vec();
    doc.content_type = Some(content_type.clone());
    doc.status = DocumentStatus::Fetched;

    // Stage 3: convert.
    let base_url = utils::url_stem(&doc.url);
    let converted = deps
        .converters
        .convert(&raw, &content_type, base_url.as_deref())
        .await
        .map_err(|e| ("convert", e))?;
    doc.raw_content = Some(raw);
    let Some(content) = converted else {
        return Ok(DocOutcome::Skipped("no usable content after conversion"));
    };
    if content.is_empty() {
        return Ok(DocOutcome::Skipped("empty content after conversion"));
    }
    doc.status = DocumentStatus::Converted;

    // Stage 4: store. The hash is assigned only after the content
    // store accepted the bytes.
    let key = deps
        .content_store
        .put(&content)
        .await
        .map_err(|e| ("store", e))?;
    doc.content = Some(content);
    doc.content_hash = Some(key);

    let receipt = deps
        .index
        .insert_document(doc)
        .await
        .map_err(|e| ("store", e))?;
    match receipt.outcome {
        InsertOutcome::Created => {
            doc.status = DocumentStatus::Stored;
            Ok(DocOutcome::Stored)
        }
        InsertOutcome::Existing => {
            doc.status = DocumentStatus::Stored;
            Ok(DocOutcome::Skipped("already indexed"))
        }
        InsertOutcome::Failed => Err((
            "store",
            AppError::store(format!("index rejected document '{}'", receipt.id)),
        )),
    }
}
