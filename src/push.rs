//! Push notification rendering and click routing.
//!
//! Inbound push payloads are JSON `{title?, body, url?}`. A payload
//! that fails to parse is still shown: the raw bytes become the body
//! under the default title. Clicks focus the window already showing the
//! target URL, or open a new one, so repeated pushes never pile up
//! duplicate windows.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clients::{ClickOutcome, ClientRegistry};

/// Title used when the payload carries none or cannot be parsed.
const DEFAULT_TITLE: &str = "Pirogue";

/// Window target when the payload carries no URL.
const DEFAULT_TARGET_URL: &str = "/";

/// Fixed notification chrome.
const NOTIFICATION_ICON: &str = "/icons/icon-192.png";
const NOTIFICATION_BADGE: &str = "/icons/badge-72.png";
const VIBRATION_PATTERN: [u32; 3] = [200, 100, 200];

/// Wire schema of an inbound push. Never persisted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl PushPayload {
    /// Parse a raw push payload; on failure the bytes become the body.
    pub fn parse(raw: &[u8]) -> Self {
        match serde_json::from_slice(raw) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(error = %e, "Push payload is not JSON, using raw body");
                Self {
                    title: None,
                    body: String::from_utf8_lossy(raw).into_owned(),
                    url: None,
                }
            }
        }
    }
}

/// A fully rendered notification, ready for the platform to display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibration: Vec<u32>,
    pub target_url: String,
}

/// Renders pushes and routes notification clicks.
pub struct PushHandler {
    clients: Arc<ClientRegistry>,
}

impl PushHandler {
    pub fn new(clients: Arc<ClientRegistry>) -> Self {
        Self { clients }
    }

    /// Render an inbound push payload. Always yields a notification.
    pub fn render(&self, raw: &[u8]) -> Notification {
        let payload = PushPayload::parse(raw);
        Notification {
            title: payload.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: payload.body,
            icon: NOTIFICATION_ICON.to_string(),
            badge: NOTIFICATION_BADGE.to_string(),
            vibration: VIBRATION_PATTERN.to_vec(),
            target_url: payload.url.unwrap_or_else(|| DEFAULT_TARGET_URL.to_string()),
        }
    }

    /// Route a click on a rendered notification.
    pub async fn handle_click(&self, target_url: &str) -> ClickOutcome {
        self.clients.focus_or_open(target_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> (Arc<ClientRegistry>, PushHandler) {
        let clients = Arc::new(ClientRegistry::new());
        let handler = PushHandler::new(clients.clone());
        (clients, handler)
    }

    #[test]
    fn test_render_full_payload() {
        let (_, handler) = handler();
        let raw = br#"{"title":"Alerte Dakar","body":"Vagues 2.5m","url":"/index.html?zone=Dakar"}"#;

        let notification = handler.render(raw);
        assert_eq!(notification.title, "Alerte Dakar");
        assert_eq!(notification.body, "Vagues 2.5m");
        assert_eq!(notification.target_url, "/index.html?zone=Dakar");
        assert_eq!(notification.vibration, vec![200, 100, 200]);
    }

    #[test]
    fn test_render_defaults_for_optional_fields() {
        let (_, handler) = handler();
        let notification = handler.render(br#"{"body":"Mer calme"}"#);
        assert_eq!(notification.title, DEFAULT_TITLE);
        assert_eq!(notification.target_url, DEFAULT_TARGET_URL);
    }

    #[test]
    fn test_unparseable_payload_still_shown() {
        let (_, handler) = handler();
        let notification = handler.render(b"Vagues dangereuses ce soir");
        assert_eq!(notification.title, DEFAULT_TITLE);
        assert_eq!(notification.body, "Vagues dangereuses ce soir");
        assert_eq!(notification.target_url, DEFAULT_TARGET_URL);
    }

    #[test]
    fn test_chrome_is_fixed() {
        let (_, handler) = handler();
        let a = handler.render(br#"{"body":"a"}"#);
        let b = handler.render(b"not json");
        assert_eq!(a.icon, b.icon);
        assert_eq!(a.badge, b.badge);
        assert_eq!(a.vibration, b.vibration);
    }

    #[tokio::test]
    async fn test_click_focuses_existing_window() {
        let (clients, handler) = handler();
        let (id, _rx) = clients.connect("/index.html?zone=Dakar").await;

        let outcome = handler.handle_click("/index.html?zone=Dakar").await;
        assert_eq!(outcome, ClickOutcome::Focused(id));
        assert_eq!(clients.count().await, 1);
    }

    #[tokio::test]
    async fn test_click_opens_new_window_once() {
        let (clients, handler) = handler();

        let first = handler.handle_click("/index.html?zone=Goree").await;
        assert!(matches!(first, ClickOutcome::Opened(_)));

        let second = handler.handle_click("/index.html?zone=Goree").await;
        assert!(matches!(second, ClickOutcome::Focused(_)));
        assert_eq!(clients.count().await, 1);
    }
}
