//! Background sync of the dictionary dataset
//!
//! A sync is a named background task dispatched from outside the worker. The
//! worker handles exactly one tag, `dictionary-update`, and ignores the rest.
//! `SyncHandle` is a periodic dispatcher for hosts without a scheduler of
//! their own; it reports each run over a tokio channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::cache::{CacheManager, GenerationStore, RefreshReport};
use crate::config::SYNC_TAG;
use crate::net::Fetch;

/// Result of dispatching a sync tag to the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The dataset was re-downloaded and stored
    Refreshed(RefreshReport),
    /// The refresh failed; the previous copy is still in place
    Failed(String),
    /// The tag is not handled by this worker
    Ignored,
}

impl<F: Fetch> CacheManager<F> {
    /// Handles a sync event tagged `tag`
    ///
    /// Refresh failures are logged and reported, never retried here; retrying
    /// is up to whoever dispatches the sync.
    pub async fn handle_sync(&self, store: &GenerationStore, tag: &str) -> SyncOutcome {
        if tag != self.config().sync_tag {
            debug!(tag, "ignoring sync tag");
            return SyncOutcome::Ignored;
        }
        match self.refresh_dataset(store).await {
            Ok(report) => SyncOutcome::Refreshed(report),
            Err(e) => {
                error!(error = %e, "failed to update dictionary data");
                SyncOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Messages sent from the background sync loop
#[derive(Debug, Clone)]
pub enum SyncMessage {
    /// A sync was dispatched
    SyncStarted { tag: String },
    /// A sync finished
    SyncCompleted(SyncOutcome),
}

/// Configuration for the periodic sync
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval between dispatches
    pub interval: Duration,
    /// Tag to dispatch
    pub tag: String,
    /// Whether periodic dispatch is enabled
    pub enabled: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600), // 1 hour
            tag: SYNC_TAG.to_string(),
            enabled: true,
        }
    }
}

/// Handle for controlling the background sync loop
pub struct SyncHandle {
    /// Channel for receiving sync messages
    pub receiver: mpsc::Receiver<SyncMessage>,
    /// Requests an out-of-schedule dispatch
    trigger_tx: mpsc::Sender<()>,
    /// Signals shutdown
    shutdown_tx: mpsc::Sender<()>,
}

impl SyncHandle {
    /// Spawns the sync loop
    ///
    /// Periodic dispatch starts one interval after spawning. Explicit
    /// requests via `request_sync` are served even when periodic dispatch is
    /// disabled.
    pub fn spawn<F>(manager: Arc<CacheManager<F>>, store: GenerationStore, config: SyncConfig) -> Self
    where
        F: Fetch + 'static,
    {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(4);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.interval);
            // Skip the first tick (immediate)
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick(), if config.enabled => {}
                    Some(()) = trigger_rx.recv() => {}
                    _ = shutdown_rx.recv() => break,
                }

                let _ = msg_tx
                    .send(SyncMessage::SyncStarted {
                        tag: config.tag.clone(),
                    })
                    .await;
                let outcome = manager.handle_sync(&store, &config.tag).await;
                let _ = msg_tx.send(SyncMessage::SyncCompleted(outcome)).await;
            }
        });

        Self {
            receiver: msg_rx,
            trigger_tx,
            shutdown_tx,
        }
    }

    /// Requests an immediate sync
    pub async fn request_sync(&self) {
        let _ = self.trigger_tx.send(()).await;
    }

    /// Shuts down the sync loop
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
