//! The worker process: event intake, task spawning, lifetime extension.
//!
//! The worker is a single logical event-driven process. Each platform
//! event spawns an independent task into a `JoinSet`; the set is the
//! lifetime-extension mechanism — `run` does not return until the intake
//! channel closes and every spawned handler has settled, so no handler
//! is torn down mid-operation.
//!
//! Promotion (`SKIP_WAITING`) is the one message handled inline: the
//! loop awaits activation before touching the next event, so namespace
//! garbage collection never overlaps fetch dispatch.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::clients::ClientRegistry;
use crate::config::WorkerConfig;
use crate::control::{ControlChannel, ControlReply};
use crate::fetch::{FetchRequest, Served, StrategyDispatcher};
use crate::net::ResourceFetcher;
use crate::push::{Notification, PushHandler};
use crate::store::CacheStore;
use crate::sync::{SyncAction, SyncScheduler, SYNC_DATA_TAG};
use crate::version::VersionManager;

/// Events delivered by the host platform.
pub enum WorkerEvent {
    /// An intercepted request; the snapshot goes back over `reply`.
    Fetch {
        request: FetchRequest,
        reply: oneshot::Sender<Served>,
    },
    /// A control message from the foreground application.
    Message {
        message: Value,
        reply: Option<oneshot::Sender<ControlReply>>,
    },
    /// Connectivity returned; run the task registered under `tag`.
    Sync { tag: String },
    /// An inbound push; the rendered notification goes back to the
    /// platform for display.
    Push {
        payload: Vec<u8>,
        reply: oneshot::Sender<Notification>,
    },
    /// The user clicked a displayed notification.
    NotificationClick { url: String },
}

/// The assembled worker.
pub struct Worker {
    config: Arc<WorkerConfig>,
    store: CacheStore,
    clients: Arc<ClientRegistry>,
    version: Arc<VersionManager>,
    dispatcher: StrategyDispatcher,
    control: ControlChannel,
    sync: Arc<SyncScheduler>,
    push: Arc<PushHandler>,
    fetcher: Arc<dyn ResourceFetcher>,
    tasks: JoinSet<()>,
}

impl Worker {
    pub fn new(config: WorkerConfig, fetcher: Arc<dyn ResourceFetcher>) -> Result<Self> {
        let config = Arc::new(config);
        let store = CacheStore::new(config.cache_dir()?)?;
        let clients = Arc::new(ClientRegistry::new());
        let version = Arc::new(VersionManager::new(
            config.clone(),
            store.clone(),
            clients.clone(),
        ));
        let dispatcher =
            StrategyDispatcher::new(store.clone(), fetcher.clone(), config.clone());
        let control = ControlChannel::new(
            config.clone(),
            store.clone(),
            version.clone(),
            fetcher.clone(),
        );
        let sync = Arc::new(SyncScheduler::new(
            config.clone(),
            store.clone(),
            clients.clone(),
            fetcher.clone(),
        ));
        let push = Arc::new(PushHandler::new(clients.clone()));

        Ok(Self {
            config,
            store,
            clients,
            version,
            dispatcher,
            control,
            sync,
            push,
            fetcher,
            tasks: JoinSet::new(),
        })
    }

    pub fn store(&self) -> CacheStore {
        self.store.clone()
    }

    pub fn clients(&self) -> Arc<ClientRegistry> {
        self.clients.clone()
    }

    pub fn version(&self) -> Arc<VersionManager> {
        self.version.clone()
    }

    /// Install this version and register its sync tasks. With
    /// `auto_promote` the worker activates immediately; otherwise it
    /// waits for a `SKIP_WAITING` message.
    pub async fn start(&self) -> Result<()> {
        let report = self.version.install(self.fetcher.as_ref()).await?;
        if !report.failed.is_empty() {
            warn!(
                failed = report.failed.len(),
                "Some assets were not precached"
            );
        }

        if self.config.auto_promote {
            self.version.promote_now().await?;
        }

        self.sync.register(SYNC_DATA_TAG, SyncAction::RefreshData).await;
        Ok(())
    }

    /// Consume platform events until the channel closes, then drain
    /// every in-flight handler.
    pub async fn run(mut self, mut events: mpsc::Receiver<WorkerEvent>) {
        info!(version = %self.version.version_id(), "Worker event loop running");
        loop {
            tokio::select! {
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                Some(result) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Event handler aborted");
                    }
                }
            }
        }

        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Event handler aborted");
            }
        }
        info!("All handlers settled, worker exiting");
    }

    async fn handle_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Fetch { request, reply } => {
                let dispatcher = self.dispatcher.clone();
                self.tasks.spawn(async move {
                    let (served, revalidation) = dispatcher.handle(&request).await;
                    // The page may have navigated away mid-fetch; a gone
                    // receiver is not an error.
                    let _ = reply.send(served);
                    if let Some(job) = revalidation {
                        dispatcher.revalidate(job).await;
                    }
                });
            }
            WorkerEvent::Message { message, reply } => {
                let is_promotion =
                    message.get("type").and_then(Value::as_str) == Some("SKIP_WAITING");
                if is_promotion {
                    // Awaited inline: activation must finish before the
                    // next fetch event is dispatched.
                    self.control.handle_with_reply(message, reply).await;
                } else {
                    let control = self.control.clone();
                    self.tasks.spawn(async move {
                        control.handle_with_reply(message, reply).await;
                    });
                }
            }
            WorkerEvent::Sync { tag } => {
                let sync = self.sync.clone();
                self.tasks.spawn(async move {
                    if let Err(e) = sync.dispatch(&tag).await {
                        warn!(tag = %tag, error = %e, "Sync task failed, leaving retry to the platform");
                    }
                });
            }
            WorkerEvent::Push { payload, reply } => {
                let _ = reply.send(self.push.render(&payload));
            }
            WorkerEvent::NotificationClick { url } => {
                let push = self.push.clone();
                self.tasks.spawn(async move {
                    push.handle_click(&url).await;
                });
            }
        }
    }
}
