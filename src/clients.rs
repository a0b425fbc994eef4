//! Registry of open application windows.
//!
//! The worker controls the pages it serves: activation claims them,
//! background sync broadcasts `DATA_UPDATED` to them, and notification
//! clicks focus an existing window or open a new one. A window that was
//! opened by the worker has no message channel until its page connects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// Unique identifier for a connected window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Events the worker pushes to every open window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum ClientMessage {
    #[serde(rename = "DATA_UPDATED")]
    DataUpdated {
        #[cfg_attr(feature = "ts", ts(type = "string"))]
        timestamp: DateTime<Utc>,
    },
}

/// Outcome of routing a notification click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// An existing window already showed the URL and was focused.
    Focused(ClientId),
    /// A new window was opened at the URL.
    Opened(ClientId),
}

struct ClientWindow {
    url: String,
    focused: bool,
    /// Worker version controlling this window, set by `claim_all`.
    controller: Option<String>,
    /// Absent until the window's page connects.
    sender: Option<mpsc::UnboundedSender<ClientMessage>>,
}

/// All currently open application windows.
#[derive(Default)]
pub struct ClientRegistry {
    windows: RwLock<HashMap<ClientId, ClientWindow>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page that just connected. Returns its id and the
    /// receiving end of its broadcast channel.
    pub async fn connect(&self, url: &str) -> (ClientId, mpsc::UnboundedReceiver<ClientMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ClientId::next();
        self.windows.write().await.insert(
            id,
            ClientWindow {
                url: url.to_string(),
                focused: true,
                controller: None,
                sender: Some(tx),
            },
        );
        debug!(client = id.0, url, "Client connected");
        (id, rx)
    }

    pub async fn disconnect(&self, id: ClientId) {
        self.windows.write().await.remove(&id);
    }

    pub async fn count(&self) -> usize {
        self.windows.read().await.len()
    }

    /// Take control of every open window for the given worker version.
    /// No window needs to reload. Returns how many were claimed.
    pub async fn claim_all(&self, version: &str) -> usize {
        let mut windows = self.windows.write().await;
        for window in windows.values_mut() {
            window.controller = Some(version.to_string());
        }
        windows.len()
    }

    pub async fn controller_of(&self, id: ClientId) -> Option<String> {
        self.windows
            .read()
            .await
            .get(&id)
            .and_then(|w| w.controller.clone())
    }

    /// Deliver a message to every connected window. Windows whose pages
    /// have gone away are dropped. Returns how many received it.
    pub async fn broadcast(&self, message: ClientMessage) -> usize {
        let mut windows = self.windows.write().await;
        let mut delivered = 0;
        windows.retain(|id, window| match &window.sender {
            Some(sender) => {
                if sender.send(message.clone()).is_ok() {
                    delivered += 1;
                    true
                } else {
                    debug!(client = id.0, "Dropping closed client");
                    false
                }
            }
            // Opened by the worker, page not connected yet.
            None => true,
        });
        delivered
    }

    /// Focus the window already showing `url`, or open a new one there.
    /// Keeps repeated notification clicks from piling up windows.
    pub async fn focus_or_open(&self, url: &str) -> ClickOutcome {
        let mut windows = self.windows.write().await;

        let existing = windows
            .iter()
            .find(|(_, window)| window.url == url)
            .map(|(id, _)| *id);

        if let Some(id) = existing {
            for (window_id, window) in windows.iter_mut() {
                window.focused = *window_id == id;
            }
            debug!(client = id.0, url, "Focused existing window");
            return ClickOutcome::Focused(id);
        }

        let id = ClientId::next();
        for window in windows.values_mut() {
            window.focused = false;
        }
        windows.insert(
            id,
            ClientWindow {
                url: url.to_string(),
                focused: true,
                controller: None,
                sender: None,
            },
        );
        debug!(client = id.0, url, "Opened new window");
        ClickOutcome::Opened(id)
    }

    pub async fn is_focused(&self, id: ClientId) -> bool {
        self.windows
            .read()
            .await
            .get(&id)
            .map(|w| w.focused)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_all_connected() {
        let registry = ClientRegistry::new();
        let (_id1, mut rx1) = registry.connect("https://pirogue.app/").await;
        let (_id2, mut rx2) = registry.connect("https://pirogue.app/about.html").await;

        let timestamp = Utc::now();
        let delivered = registry
            .broadcast(ClientMessage::DataUpdated { timestamp })
            .await;
        assert_eq!(delivered, 2);

        assert_eq!(
            rx1.recv().await,
            Some(ClientMessage::DataUpdated { timestamp })
        );
        assert_eq!(
            rx2.recv().await,
            Some(ClientMessage::DataUpdated { timestamp })
        );
    }

    #[tokio::test]
    async fn test_broadcast_prunes_gone_clients() {
        let registry = ClientRegistry::new();
        let (_id1, rx1) = registry.connect("https://pirogue.app/").await;
        drop(rx1);
        let (_id2, _rx2) = registry.connect("https://pirogue.app/about.html").await;

        let delivered = registry
            .broadcast(ClientMessage::DataUpdated {
                timestamp: Utc::now(),
            })
            .await;
        assert_eq!(delivered, 1);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_claim_all_sets_controller() {
        let registry = ClientRegistry::new();
        let (id, _rx) = registry.connect("https://pirogue.app/").await;

        assert_eq!(registry.controller_of(id).await, None);
        assert_eq!(registry.claim_all("v4").await, 1);
        assert_eq!(registry.controller_of(id).await, Some("v4".to_string()));
    }

    #[tokio::test]
    async fn test_click_focuses_existing_window() {
        let registry = ClientRegistry::new();
        let (id, _rx) = registry
            .connect("https://pirogue.app/index.html?zone=Dakar")
            .await;

        let outcome = registry
            .focus_or_open("https://pirogue.app/index.html?zone=Dakar")
            .await;
        assert_eq!(outcome, ClickOutcome::Focused(id));
        assert!(registry.is_focused(id).await);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_click_opens_when_absent_and_never_duplicates() {
        let registry = ClientRegistry::new();

        let first = registry
            .focus_or_open("https://pirogue.app/index.html?zone=Goree")
            .await;
        let ClickOutcome::Opened(opened) = first else {
            panic!("expected a new window");
        };
        assert_eq!(registry.count().await, 1);

        // A second click on the same notification target reuses it.
        let second = registry
            .focus_or_open("https://pirogue.app/index.html?zone=Goree")
            .await;
        assert_eq!(second, ClickOutcome::Focused(opened));
        assert_eq!(registry.count().await, 1);
    }

    #[test]
    fn test_data_updated_wire_format() {
        let timestamp = Utc::now();
        let message = ClientMessage::DataUpdated { timestamp };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "DATA_UPDATED");
        assert!(json["timestamp"].is_string());
    }
}
