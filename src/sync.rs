//! Deferred revalidation on connectivity recovery.
//!
//! The page registers a named one-shot task while offline; when the
//! platform detects connectivity it fires a sync event with the matching
//! tag. The `sync-data` task re-fetches the critical data resource,
//! overwrites the stale entry in the Data namespace, and broadcasts
//! `DATA_UPDATED` so collaborators react without polling. Failures are
//! logged and left to the platform's own retry scheduling.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::clients::{ClientMessage, ClientRegistry};
use crate::config::WorkerConfig;
use crate::net::ResourceFetcher;
use crate::store::{CacheStore, Namespace, Partition};

/// Tag under which the critical-data refresh is registered.
pub const SYNC_DATA_TAG: &str = "sync-data";

/// Work a registered tag maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Re-fetch the critical data resource and notify clients.
    RefreshData,
}

/// Registry of deferred tasks keyed by tag.
pub struct SyncScheduler {
    config: Arc<WorkerConfig>,
    store: CacheStore,
    clients: Arc<ClientRegistry>,
    fetcher: Arc<dyn ResourceFetcher>,
    registered: RwLock<HashMap<String, SyncAction>>,
}

impl SyncScheduler {
    pub fn new(
        config: Arc<WorkerConfig>,
        store: CacheStore,
        clients: Arc<ClientRegistry>,
        fetcher: Arc<dyn ResourceFetcher>,
    ) -> Self {
        Self {
            config,
            store,
            clients,
            fetcher,
            registered: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tag. Registering the same tag again is a no-op; the
    /// task itself is idempotent.
    pub async fn register(&self, tag: &str, action: SyncAction) {
        let mut registered = self.registered.write().await;
        if registered.insert(tag.to_string(), action).is_none() {
            debug!(tag, "Registered sync task");
        }
    }

    pub async fn is_registered(&self, tag: &str) -> bool {
        self.registered.read().await.contains_key(tag)
    }

    /// Run the task registered under `tag`. Called by the worker when
    /// the platform signals connectivity has returned.
    pub async fn dispatch(&self, tag: &str) -> Result<()> {
        let action = {
            let registered = self.registered.read().await;
            registered.get(tag).copied()
        };
        match action {
            Some(SyncAction::RefreshData) => self.refresh_data().await,
            None => bail!("no sync task registered for tag {tag}"),
        }
    }

    async fn refresh_data(&self) -> Result<()> {
        let url = self.config.resolve(&self.config.data_resource);

        let snapshot = match self.fetcher.fetch(&url).await {
            Ok(snapshot) if snapshot.is_ok() => snapshot,
            Ok(snapshot) => bail!("data refresh returned status {}", snapshot.status),
            Err(e) => bail!("data refresh failed: {e}"),
        };

        let namespace = Namespace::new(
            &self.config.app_id,
            &self.config.version,
            Partition::Data,
        );
        self.store.put(&namespace, &url, &snapshot)?;

        let timestamp = Utc::now();
        let delivered = self
            .clients
            .broadcast(ClientMessage::DataUpdated { timestamp })
            .await;
        info!(url = %url, delivered, "Data refreshed after reconnection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::testing::StubFetcher;
    use crate::store::ResponseSnapshot;
    use tempfile::tempdir;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: CacheStore,
        clients: Arc<ClientRegistry>,
        scheduler: SyncScheduler,
    }

    fn fixture(stub: StubFetcher) -> Fixture {
        let dir = tempdir().unwrap();
        let store = CacheStore::new(dir.path().to_path_buf()).unwrap();
        let config = Arc::new(WorkerConfig::default());
        let clients = Arc::new(ClientRegistry::new());
        let scheduler = SyncScheduler::new(
            config.clone(),
            store.clone(),
            clients.clone(),
            Arc::new(stub),
        );
        Fixture {
            _dir: dir,
            store,
            clients,
            scheduler,
        }
    }

    fn data_namespace() -> Namespace {
        Namespace::new("pirogue", "v4", Partition::Data)
    }

    #[tokio::test]
    async fn test_sync_refreshes_data_and_broadcasts() {
        let fx = fixture(
            StubFetcher::new().ok("http://localhost:5000/api/data", b"[{\"zone\":\"Dakar\"}]"),
        );
        let (_id, mut rx) = fx.clients.connect("https://pirogue.app/").await;

        fx.scheduler.register(SYNC_DATA_TAG, SyncAction::RefreshData).await;
        fx.scheduler.dispatch(SYNC_DATA_TAG).await.unwrap();

        let entry = fx
            .store
            .get(&data_namespace(), "http://localhost:5000/api/data")
            .unwrap()
            .unwrap();
        assert_eq!(entry.snapshot.body, b"[{\"zone\":\"Dakar\"}]");

        let message = rx.recv().await.unwrap();
        assert!(matches!(message, ClientMessage::DataUpdated { .. }));
    }

    #[tokio::test]
    async fn test_sync_overwrites_stale_entry() {
        let url = "http://localhost:5000/api/data";
        let fx = fixture(StubFetcher::new().ok(url, b"fresh"));
        fx.store
            .put(
                &data_namespace(),
                url,
                &ResponseSnapshot::new(200, vec![], b"stale".to_vec()),
            )
            .unwrap();

        fx.scheduler.register(SYNC_DATA_TAG, SyncAction::RefreshData).await;
        fx.scheduler.dispatch(SYNC_DATA_TAG).await.unwrap();

        let entry = fx.store.get(&data_namespace(), url).unwrap().unwrap();
        assert_eq!(entry.snapshot.body, b"fresh");
        assert_eq!(fx.store.size_of(&data_namespace()).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sync_failure_changes_nothing() {
        let fx = fixture(StubFetcher::new());
        let (_id, mut rx) = fx.clients.connect("https://pirogue.app/").await;

        fx.scheduler.register(SYNC_DATA_TAG, SyncAction::RefreshData).await;
        assert!(fx.scheduler.dispatch(SYNC_DATA_TAG).await.is_err());

        assert_eq!(fx.store.size_of(&data_namespace()).unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_tag_is_an_error() {
        let fx = fixture(StubFetcher::new());
        assert!(fx.scheduler.dispatch("sync-unknown").await.is_err());
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let fx = fixture(StubFetcher::new());
        fx.scheduler.register(SYNC_DATA_TAG, SyncAction::RefreshData).await;
        fx.scheduler.register(SYNC_DATA_TAG, SyncAction::RefreshData).await;
        assert!(fx.scheduler.is_registered(SYNC_DATA_TAG).await);
    }

    #[tokio::test]
    async fn test_non_ok_refresh_is_an_error() {
        let fx = fixture(StubFetcher::new().status("http://localhost:5000/api/data", 502));
        fx.scheduler.register(SYNC_DATA_TAG, SyncAction::RefreshData).await;
        assert!(fx.scheduler.dispatch(SYNC_DATA_TAG).await.is_err());
        assert_eq!(fx.store.size_of(&data_namespace()).unwrap(), 0);
    }

    #[test]
    fn test_config_data_resource_classifies_as_data() {
        use crate::fetch::{classify, FetchRequest, RequestClass};
        let config = WorkerConfig::default();
        let url = config.resolve(&config.data_resource);
        assert_eq!(
            classify(&FetchRequest::get(&url), &config),
            RequestClass::Data
        );
    }
}
