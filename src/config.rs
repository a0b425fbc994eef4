//! Worker configuration.
//!
//! This module defines `WorkerConfig`, the single configuration value
//! constructed at worker startup and threaded into every component.
//! It carries the application id and version that name the cache
//! namespaces, the precache manifest, and the hostnames used by request
//! classification.
//!
//! Configuration is stored at `~/.config/pirogue-worker/config.json`;
//! every field has a working default so a missing file is not an error.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "pirogue-worker";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default application id; first segment of every namespace name.
const DEFAULT_APP_ID: &str = "pirogue";

/// Default worker version; bumped on each release to roll the namespaces.
const DEFAULT_VERSION: &str = "v4";

/// External marine-weather API host, classified as DATA traffic.
const DEFAULT_WEATHER_HOST: &str = "marine-api.open-meteo.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Application id, first segment of `{app_id}-{version}-{partition}`.
    pub app_id: String,
    /// Worker version id. Monotonic per release; namespaces not belonging
    /// to the current version are garbage-collected at activation.
    pub version: String,
    /// Origin the site is served from; relative manifest entries and
    /// prefetch paths are joined against it.
    pub origin: String,
    /// Assets precached into the Static namespace at install time.
    pub precache_manifest: Vec<String>,
    /// Document served for offline navigations.
    pub offline_document: String,
    /// Critical data resource re-fetched by the `sync-data` task.
    pub data_resource: String,
    /// External weather API host (DATA classification).
    pub weather_host: String,
    /// Third-party asset hosts (STATIC classification).
    pub cdn_hosts: Vec<String>,
    /// Promote a freshly installed worker without waiting for old
    /// clients to close.
    pub auto_promote: bool,
    /// Override for the on-disk cache root (defaults to the platform
    /// cache directory).
    pub cache_root: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            version: DEFAULT_VERSION.to_string(),
            origin: "http://localhost:5000".to_string(),
            precache_manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/about.html".to_string(),
                "/services.html".to_string(),
                "/manifest.json".to_string(),
                "/data.json".to_string(),
            ],
            offline_document: "/index.html".to_string(),
            data_resource: "/api/data".to_string(),
            weather_host: DEFAULT_WEATHER_HOST.to_string(),
            cdn_hosts: vec![
                "cdn-icons-png.flaticon.com".to_string(),
                "cdnjs.cloudflare.com".to_string(),
                "fonts.googleapis.com".to_string(),
                "fonts.gstatic.com".to_string(),
            ],
            auto_promote: true,
            cache_root: None,
        }
    }
}

impl WorkerConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// On-disk root for all cache namespaces.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref root) = self.cache_root {
            return Ok(root.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Join a site-relative path against the configured origin.
    /// Absolute URLs are returned unchanged.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let origin = self.origin.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", origin, path)
        } else {
            format!("{}/{}", origin, path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_manifest_and_fallback() {
        let config = WorkerConfig::default();
        assert!(config.precache_manifest.contains(&config.offline_document));
        assert_eq!(config.app_id, "pirogue");
        assert!(config.auto_promote);
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let config = WorkerConfig::default();
        assert_eq!(config.resolve("/api/data"), "http://localhost:5000/api/data");
        assert_eq!(
            config.resolve("manifest.json"),
            "http://localhost:5000/manifest.json"
        );
        assert_eq!(
            config.resolve("https://example.com/a.css"),
            "https://example.com/a.css"
        );
    }

    #[test]
    fn test_config_roundtrip_json() {
        let config = WorkerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: WorkerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.version, config.version);
        assert_eq!(back.precache_manifest, config.precache_manifest);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let back: WorkerConfig = serde_json::from_str(r#"{"version":"v9"}"#).unwrap();
        assert_eq!(back.version, "v9");
        assert_eq!(back.app_id, "pirogue");
        assert!(!back.precache_manifest.is_empty());
    }
}
