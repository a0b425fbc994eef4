//! Worker version lifecycle: precache, namespace ownership, promotion.
//!
//! Each worker release owns exactly one namespace per partition, named
//! `{app_id}-{version}-{partition}`. Installation precaches the asset
//! manifest into the new Static namespace; activation deletes every
//! namespace that does not belong to the new version and claims all open
//! clients. A freshly installed worker waits in `Installed` until
//! promoted, either automatically or through `SKIP_WAITING`.

use std::sync::Arc;

use anyhow::{bail, Result};
use futures::stream::{self, StreamExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clients::ClientRegistry;
use crate::config::WorkerConfig;
use crate::net::ResourceFetcher;
use crate::store::{CacheStore, Namespace, Partition};

/// Maximum concurrent precache fetches.
/// Keeps install fast without flooding the origin on a cold start.
const MAX_CONCURRENT_PRECACHE: usize = 4;

/// Lifecycle states of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Created, not yet installing.
    New,
    /// Precaching the asset manifest.
    Installing,
    /// Installed; waiting for promotion.
    Installed,
    /// Deleting stale namespaces and claiming clients.
    Activating,
    /// Controlling clients and serving fetches.
    Active,
}

fn is_valid_transition(from: WorkerState, to: WorkerState) -> bool {
    use WorkerState::*;
    matches!(
        (from, to),
        (New, Installing)
            | (Installing, Installed)
            | (Installed, Activating)
            | (Activating, Active)
            // Re-running activation with an unchanged active set is a
            // supported no-op.
            | (Active, Activating)
    )
}

/// The namespaces one worker version considers active.
#[derive(Debug, Clone)]
pub struct VersionDescriptor {
    pub version_id: String,
    pub active: Vec<Namespace>,
}

impl VersionDescriptor {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            version_id: config.version.clone(),
            active: Partition::ALL
                .iter()
                .map(|&p| Namespace::new(&config.app_id, &config.version, p))
                .collect(),
        }
    }

    pub fn contains(&self, namespace_name: &str) -> bool {
        self.active.iter().any(|ns| ns.name() == namespace_name)
    }
}

/// What install managed to precache.
#[derive(Debug, Default)]
pub struct PrecacheReport {
    pub attempted: usize,
    pub stored: usize,
    pub failed: Vec<String>,
}

/// Owns namespace naming and the install/activate transitions.
pub struct VersionManager {
    config: Arc<WorkerConfig>,
    store: CacheStore,
    clients: Arc<ClientRegistry>,
    descriptor: VersionDescriptor,
    state: RwLock<WorkerState>,
}

impl VersionManager {
    pub fn new(
        config: Arc<WorkerConfig>,
        store: CacheStore,
        clients: Arc<ClientRegistry>,
    ) -> Self {
        let descriptor = VersionDescriptor::from_config(&config);
        Self {
            config,
            store,
            clients,
            descriptor,
            state: RwLock::new(WorkerState::New),
        }
    }

    pub fn version_id(&self) -> &str {
        &self.descriptor.version_id
    }

    pub fn descriptor(&self) -> &VersionDescriptor {
        &self.descriptor
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    async fn transition(&self, to: WorkerState) -> Result<()> {
        let mut state = self.state.write().await;
        if !is_valid_transition(*state, to) {
            bail!("invalid worker state transition: {:?} -> {:?}", *state, to);
        }
        debug!(from = ?*state, to = ?to, "Worker state transition");
        *state = to;
        Ok(())
    }

    /// Precache the asset manifest into the new Static namespace.
    ///
    /// Best-effort: an individual asset failure is logged and skipped so
    /// a flaky CDN cannot block installation. Returns once every attempt
    /// has settled.
    pub async fn install(&self, fetcher: &dyn ResourceFetcher) -> Result<PrecacheReport> {
        self.transition(WorkerState::Installing).await?;

        let static_ns = Namespace::new(
            &self.config.app_id,
            &self.config.version,
            Partition::Static,
        );

        let results: Vec<(String, bool)> = stream::iter(self.config.precache_manifest.clone())
            .map(|asset| {
                let url = self.config.resolve(&asset);
                let store = self.store.clone();
                let namespace = static_ns.clone();
                async move {
                    match fetcher.fetch(&url).await {
                        Ok(snapshot) if snapshot.is_ok() => {
                            if let Err(e) = store.put(&namespace, &url, &snapshot) {
                                warn!(url = %url, error = %e, "Failed to store precached asset");
                                return (url, false);
                            }
                            (url, true)
                        }
                        Ok(snapshot) => {
                            warn!(url = %url, status = snapshot.status, "Precache fetch returned non-ok status");
                            (url, false)
                        }
                        Err(e) => {
                            warn!(url = %url, error = %e, "Precache fetch failed");
                            (url, false)
                        }
                    }
                }
            })
            .buffer_unordered(MAX_CONCURRENT_PRECACHE)
            .collect()
            .await;

        let mut report = PrecacheReport {
            attempted: results.len(),
            ..Default::default()
        };
        for (url, stored) in results {
            if stored {
                report.stored += 1;
            } else {
                report.failed.push(url);
            }
        }

        self.transition(WorkerState::Installed).await?;
        info!(
            version = %self.descriptor.version_id,
            stored = report.stored,
            failed = report.failed.len(),
            "Install complete"
        );
        Ok(report)
    }

    /// Garbage-collect stale namespaces, then claim every open client.
    ///
    /// Returns the number of namespaces deleted; an activation repeated
    /// with an unchanged active set deletes nothing.
    pub async fn activate(&self) -> Result<usize> {
        self.transition(WorkerState::Activating).await?;

        let mut deleted = 0;
        for name in self.store.list_namespaces()? {
            if !self.descriptor.contains(&name) {
                if self.store.delete_namespace(&name)? {
                    info!(namespace = %name, "Garbage-collected stale namespace");
                    deleted += 1;
                }
            }
        }

        let claimed = self.clients.claim_all(&self.descriptor.version_id).await;

        self.transition(WorkerState::Active).await?;
        info!(
            version = %self.descriptor.version_id,
            deleted,
            claimed,
            "Activation complete"
        );
        Ok(deleted)
    }

    /// Skip the waiting state: an installed worker activates without
    /// waiting for the previous version's clients to close. Returns
    /// whether a promotion actually happened.
    pub async fn promote_now(&self) -> Result<bool> {
        if self.state().await != WorkerState::Installed {
            debug!("promote_now: nothing waiting");
            return Ok(false);
        }
        self.activate().await?;
        Ok(true)
    }
}
