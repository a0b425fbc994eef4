//! Resource key normalization and on-disk key encoding.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use url::Url;

/// Query parameters carrying cache-busting timestamps. The page requests
/// historical statistics as `logs/stats/<zone>.json?v=<now>`; two requests
/// differing only in these parameters must share one cache key.
const VOLATILE_QUERY_PARAMS: &[&str] = &["v", "t", "ts", "_"];

/// Maximum sanitized-key prefix kept in a cache file name; the hash
/// suffix carries the uniqueness.
const MAX_FILENAME_PREFIX: usize = 80;

/// Strip volatile query parameters and the fragment from a URL.
///
/// Non-absolute input (a bare path) is returned unchanged; such keys are
/// already stable.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !VOLATILE_QUERY_PARAMS.contains(&name.as_ref()))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in &kept {
            serializer.append_pair(name, value);
        }
        let query = serializer.finish();
        url.set_query(Some(&query));
    }

    url.to_string()
}

/// Encode a resource key as a cache file name: a readable sanitized
/// prefix plus a hash suffix so distinct keys never collide.
pub fn encode_key(key: &str) -> String {
    let mut prefix: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    prefix.truncate(MAX_FILENAME_PREFIX);

    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    format!("{}-{:016x}.json", prefix, hasher.finish())
}
