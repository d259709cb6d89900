//! Cache manager: generation lifecycle and read-through request handling
//!
//! The manager owns one generation, named by its configured version. It
//! seeds that generation on install, removes every other generation on
//! activate, serves mediated requests cache-first and writes successful
//! network responses back in the background.

use futures::future::{join_all, try_join_all};
use reqwest::Url;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::store::{CachedResponse, GenerationStore};
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::net::{Fetch, Request, RequestKey, Response, ResponseType};

/// Content type of the dataset copy written by a refresh
const REFRESHED_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

/// Result of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installed {
    /// Generation that was seeded
    pub generation: String,
    /// Number of seed entries written
    pub seeded: usize,
    /// The new generation takes over without waiting for old clients
    pub skip_waiting: bool,
}

/// Result of an activation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activation {
    /// Generation now in control
    pub generation: String,
    /// Stale generations that were deleted
    pub removed: Vec<String>,
    /// Stale generations whose deletion failed
    pub failed: Vec<String>,
}

/// Where a mediated response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Exact match in a cache generation
    Cache,
    /// Network fetch after a cache miss
    Network,
    /// Cached root document served to an offline navigation
    OfflineFallback,
}

/// A response produced by the worker
#[derive(Debug)]
pub struct Handled {
    /// Response for the caller
    pub response: Response,
    /// Where it came from
    pub source: ResponseSource,
    /// Background write-back of a duplicate, if one was started.
    ///
    /// Dropping the handle leaves the write running detached.
    pub write_back: Option<JoinHandle<()>>,
}

/// Outcome of mediating a request
#[derive(Debug)]
pub enum Mediation {
    /// Out of scope; the caller goes to the network directly
    PassThrough,
    /// The worker answered the request
    Respond(Handled),
}

impl Mediation {
    /// The response, if the worker answered
    pub fn response(&self) -> Option<&Response> {
        match self {
            Mediation::PassThrough => None,
            Mediation::Respond(handled) => Some(&handled.response),
        }
    }
}

/// Summary of a successful dataset refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    /// URL of the refreshed entry
    pub url: String,
    /// Size of the stored copy in bytes
    pub bytes: usize,
    /// Number of top-level entries, when the dataset is a JSON array
    pub entries: Option<usize>,
}

/// Read-through cache worker for one generation
///
/// Holds only immutable configuration and the fetcher; the generation store
/// is passed to every operation.
#[derive(Debug)]
pub struct CacheManager<F> {
    config: WorkerConfig,
    fetcher: F,
}

impl<F: Fetch> CacheManager<F> {
    /// Creates a manager for the configured generation
    pub fn new(config: WorkerConfig, fetcher: F) -> Self {
        Self { config, fetcher }
    }

    /// Name of the generation this manager owns
    pub fn generation(&self) -> &str {
        &self.config.version
    }

    /// Configuration this manager was built with
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Seeds the current generation
    ///
    /// Every seed is fetched before anything is written, and the seeds are
    /// written to a staging area that only replaces the generation once all
    /// of them are stored. A failed install leaves the store as it was.
    ///
    /// # Returns
    /// * `Ok(Installed)` once every seed is stored
    /// * `Err(WorkerError::SeedFetch | SeedStatus)` if any seed fails
    pub async fn install(&self, store: &GenerationStore) -> WorkerResult<Installed> {
        let generation = self.generation();
        info!(generation, seeds = self.config.seeds.len(), "installing");

        let responses =
            try_join_all(self.config.seeds.iter().map(|url| self.fetch_seed(url))).await?;

        let staged = store.stage(generation).await?;
        debug!(generation, "opened cache");

        for (url, response) in self.config.seeds.iter().zip(&responses) {
            let stored = store.put_staged(&staged, &RequestKey::get(url), response).await;
            if let Err(e) = stored {
                error!(generation, url = %url, error = %e, "failed to store seed");
                if let Err(cleanup) = store.discard(staged).await {
                    warn!(generation, error = %cleanup, "failed to remove staged seeds");
                }
                return Err(e);
            }
        }
        store.commit(staged).await?;

        info!(generation, "installed; skipping wait");
        Ok(Installed {
            generation: generation.to_string(),
            seeded: responses.len(),
            skip_waiting: true,
        })
    }

    async fn fetch_seed(&self, url: &Url) -> WorkerResult<Response> {
        let response = self
            .fetcher
            .fetch(&Request::get(url.clone()))
            .await
            .map_err(|source| WorkerError::SeedFetch {
                url: url.to_string(),
                source,
            })?;
        if !response.is_ok() {
            return Err(WorkerError::SeedStatus {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(response)
    }

    /// Deletes every other generation, then takes control
    ///
    /// Deletions run concurrently and independently; a failed deletion is
    /// logged and reported but does not stop the others or the takeover.
    ///
    /// # Returns
    /// * `Ok(Activation)` listing removed and failed generations
    /// * `Err(WorkerError::NotInstalled)` if the current generation was never
    ///   fully seeded
    pub async fn activate(&self, store: &GenerationStore) -> WorkerResult<Activation> {
        let generation = self.generation();
        info!(generation, "activating");

        if !store.is_installed(generation).await? {
            return Err(WorkerError::NotInstalled(generation.to_string()));
        }

        let stale: Vec<String> = store
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != generation)
            .collect();

        let results = join_all(stale.iter().map(|name| async move {
            info!(generation = %name, "deleting old cache");
            (name.clone(), store.delete(name).await)
        }))
        .await;

        let mut activation = Activation {
            generation: generation.to_string(),
            ..Default::default()
        };
        for (name, result) in results {
            match result {
                Ok(_) => activation.removed.push(name),
                Err(e) => {
                    warn!(generation = %name, error = %e, "failed to delete old cache");
                    activation.failed.push(name);
                }
            }
        }

        store.set_controller(generation).await?;
        info!(generation, removed = activation.removed.len(), "claimed clients");
        Ok(activation)
    }

    /// Mediates one outbound request
    ///
    /// # Behavior
    /// - Requests outside the same origin and allow-listed hosts pass through
    /// - An exact match in any generation is returned as-is
    /// - On a miss the network is tried; a 200 `basic` GET response is
    ///   duplicated into the current generation in the background, unless
    ///   its host is never cached or the generation is not installed
    /// - If the network fails, navigations fall back to the cached root
    ///   document; anything else fails with `WorkerError::Offline`
    pub async fn handle_request(
        &self,
        store: &GenerationStore,
        request: &Request,
    ) -> WorkerResult<Mediation> {
        if !self.config.scope_of(&request.url).is_mediated() {
            debug!(url = %request.url, "outside scope; passing through");
            return Ok(Mediation::PassThrough);
        }

        let key = request.key();
        if let Some(cached) = lookup(store, &key).await {
            debug!(key = %key, generation = %cached.generation, "cache hit");
            return Ok(respond(cached.response, ResponseSource::Cache, None));
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                let storable =
                    self.should_store(request, &response) && self.accepts_writes(store).await;
                let write_back = storable.then(|| {
                    spawn_write_back(
                        store.clone(),
                        self.generation().to_string(),
                        key,
                        response.clone(),
                    )
                });
                Ok(respond(response, ResponseSource::Network, write_back))
            }
            Err(source) => {
                if request.navigate {
                    let root = RequestKey::get(&self.config.offline_document()?);
                    if let Some(cached) = lookup(store, &root).await {
                        info!(url = %request.url, "offline; serving cached root document");
                        return Ok(respond(cached.response, ResponseSource::OfflineFallback, None));
                    }
                }
                warn!(url = %request.url, error = %source, "offline with no cached response");
                Err(WorkerError::Offline {
                    url: request.url.to_string(),
                    source,
                })
            }
        }
    }

    fn should_store(&self, request: &Request, response: &Response) -> bool {
        response.status == 200
            && response.response_type == ResponseType::Basic
            && request.key().is_get()
            && !self.config.is_never_cached(&request.url)
    }

    /// Only an installed generation takes runtime writes
    async fn accepts_writes(&self, store: &GenerationStore) -> bool {
        match store.is_installed(self.generation()).await {
            Ok(true) => true,
            Ok(false) => {
                debug!(generation = self.generation(), "not installed; skipping write-back");
                false
            }
            Err(e) => {
                warn!(generation = self.generation(), error = %e, "install check failed");
                false
            }
        }
    }

    /// Re-downloads the dictionary dataset into the current generation
    ///
    /// The stored entry is only replaced once the download has been fetched
    /// and parsed; on any error the previous copy is left as it was. The
    /// current generation must be installed.
    pub async fn refresh_dataset(&self, store: &GenerationStore) -> WorkerResult<RefreshReport> {
        let url = &self.config.dataset_url;
        info!(url = %url, "background sync for dictionary data");

        let response = self.fetcher.fetch(&Request::get(url.clone())).await?;
        if !response.is_ok() {
            return Err(WorkerError::DatasetStatus(response.status));
        }
        let data: serde_json::Value =
            serde_json::from_slice(&response.body).map_err(WorkerError::DatasetParse)?;
        let body = serde_json::to_vec(&data)?;

        let fresh = Response {
            url: url.to_string(),
            status: 200,
            status_text: String::new(),
            headers: vec![("content-type".to_string(), REFRESHED_CONTENT_TYPE.to_string())],
            response_type: ResponseType::Default,
            body,
        };
        if !store.is_installed(self.generation()).await? {
            return Err(WorkerError::NotInstalled(self.generation().to_string()));
        }
        store.put(self.generation(), &RequestKey::get(url), &fresh).await?;

        let report = RefreshReport {
            url: url.to_string(),
            bytes: fresh.body.len(),
            entries: data.as_array().map(Vec::len),
        };
        info!(bytes = report.bytes, entries = ?report.entries, "dictionary data updated in background");
        Ok(report)
    }
}

/// Cache lookup; store errors count as a miss
async fn lookup(store: &GenerationStore, key: &RequestKey) -> Option<CachedResponse> {
    match store.match_any(key).await {
        Ok(found) => found,
        Err(e) => {
            warn!(key = %key, error = %e, "cache lookup failed; treating as miss");
            None
        }
    }
}

fn respond(response: Response, source: ResponseSource, write_back: Option<JoinHandle<()>>) -> Mediation {
    Mediation::Respond(Handled {
        response,
        source,
        write_back,
    })
}

/// Stores a duplicate without holding up the caller
fn spawn_write_back(
    store: GenerationStore,
    generation: String,
    key: RequestKey,
    response: Response,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match store.put(&generation, &key, &response).await {
            Ok(()) => debug!(key = %key, generation = %generation, "stored network response"),
            Err(e) => warn!(
                key = %key,
                generation = %generation,
                error = %e,
                "failed to store network response"
            ),
        }
    })
}
