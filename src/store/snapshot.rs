//! Response snapshots and stored cache entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable copy of a response: status, headers, body bytes.
///
/// Snapshots are plain values. Cloning one before handing it to a caller
/// is what keeps a stored entry independent of whatever the caller does
/// with its copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ResponseSnapshot {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Successful response in the 2xx range.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Opaque results carry status 0 and must never be cached.
    pub fn is_opaque(&self) -> bool {
        self.status == 0
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Minimal non-throwing placeholder for an asset that is neither
    /// cached nor reachable. Distinguishable from real responses by
    /// its status code.
    pub fn placeholder() -> Self {
        Self {
            status: 503,
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: b"asset unavailable offline".to_vec(),
        }
    }

    /// Machine-readable error body for a DATA request that cannot be
    /// served from network or cache.
    pub fn data_unavailable(resource: &str) -> Self {
        let body = serde_json::json!({
            "error": "data unavailable offline",
            "resource": resource,
        });
        Self {
            status: 503,
            headers: vec![(
                "content-type".to_string(),
                "application/json".to_string(),
            )],
            body: body.to_string().into_bytes(),
        }
    }

    /// Last-resort document for a navigation whose offline fallback was
    /// itself never cached.
    pub fn offline_shell() -> Self {
        Self {
            status: 503,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: b"<!doctype html><html><body><h1>Hors ligne</h1>\
<p>Reconnectez-vous pour charger Pirogue.</p></body></html>"
                .to_vec(),
        }
    }
}

/// A cached snapshot together with the key it was stored under and the
/// time it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub key: String,
    pub snapshot: ResponseSnapshot,
    pub stored_at: DateTime<Utc>,
}

impl StoredEntry {
    pub fn new(key: String, snapshot: ResponseSnapshot) -> Self {
        Self {
            key,
            snapshot,
            stored_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.stored_at).num_minutes()
    }
}
