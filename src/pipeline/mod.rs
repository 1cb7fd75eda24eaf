// src/pipeline/mod.rs

//! The crawl-and-ingest pipeline.
//!
//! [`PluginRunner`] drives one site plugin end to end: discovery feeds
//! a bounded queue, a worker pool runs the per-document stages, and
//! per-document failures never abort the run.

pub mod run;

use tokio::sync::watch;

pub use run::{PipelineDeps, PluginRunner, RunOptions, RunSummary};

/// Requests cancellation of a running crawl.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal the run to stop: discovery fetches no further pages and
    /// idle workers stop dequeuing. In-flight documents finish
    /// naturally.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observer side of a cancellation signal.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    // keeps the channel alive for tokens without an external handle
    _keep: Option<std::sync::Arc<watch::Sender<bool>>>,
}

impl CancelToken {
    /// A token that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keep: Some(std::sync::Arc::new(tx)),
        }
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancellation is requested.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // handle dropped without firing; never resolves
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Create a linked cancellation handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx, _keep: None })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_pair_fires() {
        let (handle, mut token) = cancel_pair();
        assert!(!token.is_cancelled());
        handle.cancel();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_never_token_stays_quiet() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
    }
}
