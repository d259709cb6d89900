//! Trigger events dispatched to the worker by its host

use tracing::debug;

use crate::cache::{Activation, CacheManager, GenerationStore, Installed, Mediation};
use crate::error::WorkerResult;
use crate::net::{Fetch, Request};
use crate::refresh::SyncOutcome;

/// An event the host dispatches to the worker
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A new worker version is being installed
    Install,
    /// An installed worker is taking over
    Activate,
    /// An outbound request needs mediation
    Fetch(Request),
    /// A tagged background sync fired
    Sync(String),
}

/// What handling an event produced
#[derive(Debug)]
pub enum EventOutcome {
    Installed(Installed),
    Activated(Activation),
    Fetched(Mediation),
    Synced(SyncOutcome),
}

impl<F: Fetch> CacheManager<F> {
    /// Routes an event to its handler
    pub async fn dispatch(
        &self,
        store: &GenerationStore,
        event: WorkerEvent,
    ) -> WorkerResult<EventOutcome> {
        debug!(generation = self.generation(), event = ?event, "dispatching");
        Ok(match event {
            WorkerEvent::Install => EventOutcome::Installed(self.install(store).await?),
            WorkerEvent::Activate => EventOutcome::Activated(self.activate(store).await?),
            WorkerEvent::Fetch(request) => {
                EventOutcome::Fetched(self.handle_request(store, &request).await?)
            }
            WorkerEvent::Sync(tag) => EventOutcome::Synced(self.handle_sync(store, &tag).await),
        })
    }
}
