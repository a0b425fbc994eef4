//! Network boundary for the worker.
//!
//! All outbound traffic goes through the `ResourceFetcher` trait so the
//! install, strategy, prefetch, and sync paths can be exercised without a
//! network. The production implementation is `HttpFetcher`, a thin
//! reqwest wrapper that snapshots whatever the server returns; policy
//! (what is cacheable, what counts as failure) lives in the callers.

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::store::ResponseSnapshot;

/// HTTP request timeout in seconds.
/// 30s allows for slow upstream responses while failing fast enough to
/// reach the cache fallback before the page gives up.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum length for response-body previews in log output
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Host unreachable: {0}")]
    Unreachable(String),
}

/// Fetches one resource and snapshots the result.
///
/// Implementations return `Ok` for any completed HTTP exchange, whatever
/// the status; `Err` means the exchange itself failed (offline, DNS,
/// timeout).
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ResponseSnapshot, FetchError>;
}

/// reqwest-backed fetcher.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<ResponseSnapshot, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(ResponseSnapshot::new(status, headers, body))
    }
}

/// Truncate a response body for log output.
pub fn body_preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= MAX_ERROR_BODY_LENGTH {
        text.into_owned()
    } else {
        format!(
            "{}... (truncated, {} total bytes)",
            &text[..MAX_ERROR_BODY_LENGTH],
            body.len()
        )
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted fetcher for exercising network-dependent paths offline.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{FetchError, ResourceFetcher};
    use crate::store::ResponseSnapshot;

    enum Scripted {
        Snapshot(ResponseSnapshot),
        Down,
    }

    /// A fetcher answering from a scripted URL table. Unknown URLs are
    /// unreachable, which is also what `StubFetcher::new()` alone
    /// simulates: a device that is fully offline.
    pub struct StubFetcher {
        routes: Mutex<HashMap<String, Scripted>>,
        calls: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        pub fn new() -> Self {
            Self {
                routes: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Serve a 200 response with the given body for `url`.
        pub fn ok(self, url: &str, body: &[u8]) -> Self {
            self.respond(
                url,
                ResponseSnapshot::new(
                    200,
                    vec![("content-type".to_string(), "text/plain".to_string())],
                    body.to_vec(),
                ),
            )
        }

        /// Serve an arbitrary snapshot for `url`.
        pub fn respond(self, url: &str, snapshot: ResponseSnapshot) -> Self {
            self.routes
                .lock()
                .unwrap()
                .insert(url.to_string(), Scripted::Snapshot(snapshot));
            self
        }

        /// Serve a bodyless response with the given status for `url`.
        pub fn status(self, url: &str, status: u16) -> Self {
            self.respond(url, ResponseSnapshot::new(status, vec![], vec![]))
        }

        /// Make `url` fail at the transport level.
        pub fn down(self, url: &str) -> Self {
            self.routes
                .lock()
                .unwrap()
                .insert(url.to_string(), Scripted::Down);
            self
        }

        /// Every URL fetched so far, in order.
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        /// Replace the scripted response for `url` after construction.
        pub fn set_ok(&self, url: &str, body: &[u8]) {
            self.routes.lock().unwrap().insert(
                url.to_string(),
                Scripted::Snapshot(ResponseSnapshot::new(
                    200,
                    vec![("content-type".to_string(), "text/plain".to_string())],
                    body.to_vec(),
                )),
            );
        }
    }

    #[async_trait]
    impl ResourceFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<ResponseSnapshot, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.routes.lock().unwrap().get(url) {
                Some(Scripted::Snapshot(snapshot)) => Ok(snapshot.clone()),
                Some(Scripted::Down) | None => {
                    Err(FetchError::Unreachable(url.to_string()))
                }
            }
        }
    }
}
