//! CacheFirst and NetworkFirst fetch strategies.
//!
//! Each strategy is an explicit ordered list of fallback steps; every
//! step yields a typed result and the chain always terminates in a
//! well-formed response. Nothing here raises an error to the page.

use std::sync::Arc;

use tracing::{debug, warn};

use super::classify::{classify, partition_for, FetchRequest, RequestClass};
use crate::config::WorkerConfig;
use crate::net::{body_preview, ResourceFetcher};
use crate::store::{CacheStore, Namespace, Partition, ResponseSnapshot};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeSource {
    Network,
    Cache,
    Fallback,
}

/// The dispatcher's answer to an intercepted request.
#[derive(Debug, Clone)]
pub struct Served {
    pub snapshot: ResponseSnapshot,
    pub source: ServeSource,
}

/// A deferred refresh of an entry that was just served from cache.
/// Spawned by the worker so the response is never blocked on it.
#[derive(Debug, Clone)]
pub struct Revalidation {
    pub url: String,
    pub namespace: Namespace,
}

/// Terminal step when both network and cache have failed.
enum Terminal {
    OfflineDocument,
    DataError,
    Placeholder,
}

/// Routes classified requests to their strategy.
#[derive(Clone)]
pub struct StrategyDispatcher {
    store: CacheStore,
    fetcher: Arc<dyn ResourceFetcher>,
    config: Arc<WorkerConfig>,
}

impl StrategyDispatcher {
    pub fn new(
        store: CacheStore,
        fetcher: Arc<dyn ResourceFetcher>,
        config: Arc<WorkerConfig>,
    ) -> Self {
        Self {
            store,
            fetcher,
            config,
        }
    }

    fn namespace(&self, partition: Partition) -> Namespace {
        Namespace::new(&self.config.app_id, &self.config.version, partition)
    }

    /// Serve one intercepted request. The optional `Revalidation` is a
    /// background job the caller spawns after replying.
    pub async fn handle(&self, request: &FetchRequest) -> (Served, Option<Revalidation>) {
        if !request.is_interceptable() {
            return (self.passthrough(request).await, None);
        }

        let class = classify(request, &self.config);
        match class {
            RequestClass::Static => self.cache_first(request).await,
            RequestClass::Data => (
                self.network_first(request, partition_for(class), Terminal::DataError)
                    .await,
                None,
            ),
            RequestClass::Document => (
                self.network_first(request, partition_for(class), Terminal::OfflineDocument)
                    .await,
                None,
            ),
            RequestClass::Other => (
                self.network_first(request, partition_for(class), Terminal::Placeholder)
                    .await,
                None,
            ),
        }
    }

    /// Non-intercepted traffic: plain network fetch, no cache writes.
    async fn passthrough(&self, request: &FetchRequest) -> Served {
        match self.fetcher.fetch(&request.url).await {
            Ok(snapshot) => Served {
                snapshot,
                source: ServeSource::Network,
            },
            Err(e) => {
                debug!(url = %request.url, error = %e, "Passthrough fetch failed");
                Served {
                    snapshot: ResponseSnapshot::placeholder(),
                    source: ServeSource::Fallback,
                }
            }
        }
    }

    /// Steps: cache hit (plus deferred revalidation) → network →
    /// placeholder.
    async fn cache_first(&self, request: &FetchRequest) -> (Served, Option<Revalidation>) {
        let namespace = self.namespace(Partition::Static);

        match self.store.get(&namespace, &request.url) {
            Ok(Some(entry)) => {
                let job = Revalidation {
                    url: request.url.clone(),
                    namespace: namespace.clone(),
                };
                return (
                    Served {
                        snapshot: entry.snapshot,
                        source: ServeSource::Cache,
                    },
                    Some(job),
                );
            }
            Ok(None) => {}
            Err(e) => warn!(url = %request.url, error = %e, "Cache lookup failed"),
        }

        match self.fetcher.fetch(&request.url).await {
            Ok(snapshot) if snapshot.status == 200 => {
                if let Err(e) = self.store.put(&namespace, &request.url, &snapshot) {
                    warn!(url = %request.url, error = %e, "Failed to store fetched asset");
                }
                (
                    Served {
                        snapshot,
                        source: ServeSource::Network,
                    },
                    None,
                )
            }
            Ok(snapshot) => {
                debug!(
                    url = %request.url,
                    status = snapshot.status,
                    "Asset fetch returned non-cacheable status"
                );
                (
                    Served {
                        snapshot,
                        source: ServeSource::Network,
                    },
                    None,
                )
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Asset unreachable and not cached");
                (
                    Served {
                        snapshot: ResponseSnapshot::placeholder(),
                        source: ServeSource::Fallback,
                    },
                    None,
                )
            }
        }
    }

    /// Steps: network (store on ok) → cache → terminal fallback.
    async fn network_first(
        &self,
        request: &FetchRequest,
        partition: Partition,
        terminal: Terminal,
    ) -> Served {
        let namespace = self.namespace(partition);

        match self.fetcher.fetch(&request.url).await {
            Ok(snapshot) if snapshot.is_ok() => {
                if let Err(e) = self.store.put(&namespace, &request.url, &snapshot) {
                    warn!(url = %request.url, error = %e, "Failed to store fresh response");
                }
                return Served {
                    snapshot,
                    source: ServeSource::Network,
                };
            }
            Ok(snapshot) => {
                debug!(
                    url = %request.url,
                    status = snapshot.status,
                    body = %body_preview(&snapshot.body),
                    "Upstream returned non-ok status, trying cache"
                );
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "Network fetch failed, trying cache");
            }
        }

        match self.store.get(&namespace, &request.url) {
            Ok(Some(entry)) => {
                return Served {
                    snapshot: entry.snapshot,
                    source: ServeSource::Cache,
                };
            }
            Ok(None) => {}
            Err(e) => warn!(url = %request.url, error = %e, "Cache lookup failed"),
        }

        self.terminal_fallback(request, terminal)
    }

    fn terminal_fallback(&self, request: &FetchRequest, terminal: Terminal) -> Served {
        let snapshot = match terminal {
            Terminal::DataError => ResponseSnapshot::data_unavailable(&request.url),
            Terminal::Placeholder => ResponseSnapshot::placeholder(),
            Terminal::OfflineDocument => {
                let fallback_url = self.config.resolve(&self.config.offline_document);
                match self
                    .store
                    .get(&self.namespace(Partition::Static), &fallback_url)
                {
                    Ok(Some(entry)) => entry.snapshot,
                    Ok(None) | Err(_) => {
                        warn!(url = %request.url, "Offline fallback document not cached");
                        ResponseSnapshot::offline_shell()
                    }
                }
            }
        };
        Served {
            snapshot,
            source: ServeSource::Fallback,
        }
    }

    /// Refresh a cache entry just served stale. Failures are left
    /// silent; the page already has its response.
    pub async fn revalidate(&self, job: Revalidation) {
        if let Ok(snapshot) = self.fetcher.fetch(&job.url).await {
            if snapshot.status == 200 {
                match self.store.put(&job.namespace, &job.url, &snapshot) {
                    Ok(()) => debug!(url = %job.url, "Revalidated cached asset"),
                    Err(e) => debug!(url = %job.url, error = %e, "Revalidation store failed"),
                }
            }
        }
    }
}
