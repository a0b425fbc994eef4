//! Control protocol between the foreground application and the worker.
//!
//! Messages arrive as JSON `{type, payload}` envelopes with an optional
//! reply channel. The recognized kinds form a closed set; unknown or
//! malformed messages produce a distinct error reply, never a silent
//! drop. A handler failure is caught and replied as
//! `{success:false, error}` — the worker itself never dies from one.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::net::ResourceFetcher;
use crate::store::{CacheStore, Namespace, Partition};
use crate::version::VersionManager;

#[derive(Error, Debug, PartialEq)]
pub enum ProtocolError {
    #[error("message is not an object with a string `type`")]
    MalformedEnvelope,

    /// Wire text is pinned: collaborators match on it.
    #[error("unknown type")]
    UnknownType(String),

    #[error("malformed payload for {kind}: {detail}")]
    MalformedPayload { kind: String, detail: String },
}

/// The closed set of control message kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    SkipWaiting,
    GetVersion,
    GetCacheStatus,
    ClearCache,
    PrefetchResource { zone: String },
}

impl ControlRequest {
    /// Validate an incoming envelope at the boundary.
    pub fn parse(message: &Value) -> Result<Self, ProtocolError> {
        let kind = message
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MalformedEnvelope)?;

        match kind {
            "SKIP_WAITING" => Ok(Self::SkipWaiting),
            "GET_VERSION" => Ok(Self::GetVersion),
            "GET_CACHE_STATUS" => Ok(Self::GetCacheStatus),
            "CLEAR_CACHE" => Ok(Self::ClearCache),
            "PREFETCH_RESOURCE" => {
                let zone = message
                    .get("payload")
                    .and_then(|payload| payload.get("zone"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| ProtocolError::MalformedPayload {
                        kind: kind.to_string(),
                        detail: "missing string `zone`".to_string(),
                    })?;
                Ok(Self::PrefetchResource {
                    zone: zone.to_string(),
                })
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}

/// Per-namespace entry count for `GET_CACHE_STATUS`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct CacheStatus {
    pub name: String,
    pub count: usize,
}

/// Reply envelope: `{success, ...}` with only the fields the message
/// kind produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ControlReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caches: Option<Vec<CacheStatus>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            version: None,
            caches: None,
            zone: None,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            version: None,
            caches: None,
            zone: None,
            error: Some(message.into()),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn with_caches(mut self, caches: Vec<CacheStatus>) -> Self {
        self.caches = Some(caches);
        self
    }

    pub fn with_zone(mut self, zone: &str) -> Self {
        self.zone = Some(zone.to_string());
        self
    }
}

/// Handles control messages from the foreground application.
#[derive(Clone)]
pub struct ControlChannel {
    config: Arc<WorkerConfig>,
    store: CacheStore,
    version: Arc<VersionManager>,
    fetcher: Arc<dyn ResourceFetcher>,
}

impl ControlChannel {
    pub fn new(
        config: Arc<WorkerConfig>,
        store: CacheStore,
        version: Arc<VersionManager>,
        fetcher: Arc<dyn ResourceFetcher>,
    ) -> Self {
        Self {
            config,
            store,
            version,
            fetcher,
        }
    }

    /// Process one message and produce its reply. Never panics, never
    /// propagates an error.
    pub async fn handle(&self, message: Value) -> ControlReply {
        let request = match ControlRequest::parse(&message) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Rejected control message");
                return ControlReply::error(e.to_string());
            }
        };

        debug!(request = ?request, "Handling control message");
        match self.dispatch(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Control handler failed");
                ControlReply::error(e.to_string())
            }
        }
    }

    /// `handle`, then deliver the reply exactly once if a channel was
    /// supplied. A caller that went away is not an error.
    pub async fn handle_with_reply(
        &self,
        message: Value,
        reply: Option<oneshot::Sender<ControlReply>>,
    ) {
        let result = self.handle(message).await;
        if let Some(tx) = reply {
            let _ = tx.send(result);
        }
    }

    async fn dispatch(&self, request: ControlRequest) -> anyhow::Result<ControlReply> {
        match request {
            ControlRequest::SkipWaiting => {
                self.version.promote_now().await?;
                Ok(ControlReply::ok())
            }
            ControlRequest::GetVersion => {
                Ok(ControlReply::ok().with_version(self.version.version_id()))
            }
            ControlRequest::GetCacheStatus => {
                let mut caches = Vec::new();
                for name in self.store.list_namespaces()? {
                    let count = self.store.count_entries(&name)?;
                    caches.push(CacheStatus { name, count });
                }
                Ok(ControlReply::ok().with_caches(caches))
            }
            ControlRequest::ClearCache => {
                let deleted = self.store.clear_all()?;
                debug!(deleted, "Cleared all caches");
                Ok(ControlReply::ok())
            }
            ControlRequest::PrefetchResource { zone } => self.prefetch(&zone).await,
        }
    }

    /// Force-fetch one zone's statistics into the Data namespace.
    async fn prefetch(&self, zone: &str) -> anyhow::Result<ControlReply> {
        let slug = zone.to_lowercase().replace([' ', '-'], "_");
        let url = self
            .config
            .resolve(&format!("/logs/stats/{}.json", slug));

        match self.fetcher.fetch(&url).await {
            Ok(snapshot) if snapshot.is_ok() => {
                let namespace = Namespace::new(
                    &self.config.app_id,
                    self.version.version_id(),
                    Partition::Data,
                );
                self.store.put(&namespace, &url, &snapshot)?;
                Ok(ControlReply::ok().with_zone(zone))
            }
            Ok(snapshot) => {
                debug!(url = %url, status = snapshot.status, "Prefetch target not available");
                Ok(ControlReply::error("resource not found"))
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Prefetch fetch failed");
                Ok(ControlReply::error(e.to_string()))
            }
        }
    }
}
