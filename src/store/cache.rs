//! Disk-backed partitioned cache store.
//!
//! One directory per namespace, one JSON file per resource key. A `put`
//! is a temp-file write followed by a rename, so concurrent writers to
//! the same key are last-writer-wins and a reader never observes a
//! partial entry.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::keys::{encode_key, normalize_url};
use super::snapshot::{ResponseSnapshot, StoredEntry};

/// Entry cap for Dynamic-partition namespaces. Runtime caching of
/// navigations must not grow unbounded; the oldest entries are evicted
/// once the cap is exceeded. Static and Data namespaces are bounded only
/// by platform quota.
const DYNAMIC_MAX_ENTRIES: usize = 100;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cache partition classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Static,
    Dynamic,
    Data,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Static => "static",
            Partition::Dynamic => "dynamic",
            Partition::Data => "data",
        }
    }

    pub const ALL: [Partition; 3] = [Partition::Static, Partition::Dynamic, Partition::Data];
}

/// A uniquely named logical container: `{app_id}-{version}-{partition}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub app_id: String,
    pub version: String,
    pub partition: Partition,
}

impl Namespace {
    pub fn new(app_id: &str, version: &str, partition: Partition) -> Self {
        Self {
            app_id: app_id.to_string(),
            version: version.to_string(),
            partition,
        }
    }

    pub fn name(&self) -> String {
        format!("{}-{}-{}", self.app_id, self.version, self.partition.as_str())
    }
}

/// Partitioned key→snapshot storage rooted at a cache directory.
///
/// Clone is cheap; the store is just the root path and all operations go
/// through the filesystem.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn namespace_dir(&self, namespace: &Namespace) -> PathBuf {
        self.root.join(namespace.name())
    }

    fn entry_path(&self, namespace: &Namespace, stored_key: &str) -> PathBuf {
        self.namespace_dir(namespace).join(encode_key(stored_key))
    }

    /// Store a snapshot under the normalized form of `key`, overwriting
    /// any prior entry. The caller keeps its snapshot; a clone is written.
    pub fn put(
        &self,
        namespace: &Namespace,
        key: &str,
        snapshot: &ResponseSnapshot,
    ) -> Result<(), StoreError> {
        let normalized = normalize_url(key);
        let entry = StoredEntry::new(normalized.clone(), snapshot.clone());

        let dir = self.namespace_dir(namespace);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(encode_key(&normalized));
        write_atomic(&path, &serde_json::to_vec(&entry)?)?;
        debug!(namespace = %namespace.name(), key = %normalized, "Stored cache entry");

        if namespace.partition == Partition::Dynamic {
            self.evict_overflow(namespace, &path)?;
        }
        Ok(())
    }

    /// Look up `key`: normalized form first, raw form second. The raw
    /// fallback tolerates entries written before normalization existed.
    /// An entry that no longer parses is treated as a miss.
    pub fn get(
        &self,
        namespace: &Namespace,
        key: &str,
    ) -> Result<Option<StoredEntry>, StoreError> {
        let normalized = normalize_url(key);
        if let Some(entry) = self.read_entry(&self.entry_path(namespace, &normalized))? {
            return Ok(Some(entry));
        }
        if normalized != key {
            if let Some(entry) = self.read_entry(&self.entry_path(namespace, key))? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    fn read_entry(&self, path: &Path) -> Result<Option<StoredEntry>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read(path)?;
        match serde_json::from_slice(&contents) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable cache entry, treating as miss");
                Ok(None)
            }
        }
    }

    /// Logical keys of every entry in a namespace.
    pub fn keys(&self, namespace: &Namespace) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for path in self.entry_files(&self.namespace_dir(namespace))? {
            if let Some(entry) = self.read_entry(&path)? {
                keys.push(entry.key);
            }
        }
        Ok(keys)
    }

    /// Number of entries in a namespace.
    pub fn size_of(&self, namespace: &Namespace) -> Result<usize, StoreError> {
        Ok(self.entry_files(&self.namespace_dir(namespace))?.len())
    }

    /// Number of entries in a namespace referenced by name; used when
    /// reporting on stored namespaces that may not belong to the
    /// current version.
    pub fn count_entries(&self, name: &str) -> Result<usize, StoreError> {
        Ok(self.entry_files(&self.root.join(name))?.len())
    }

    /// Names of every stored namespace, active or stale.
    pub fn list_namespaces(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for dir_entry in std::fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            if dir_entry.file_type()?.is_dir() {
                names.push(dir_entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Irreversibly delete a namespace and all its entries. Returns
    /// whether anything existed.
    pub fn delete_namespace(&self, name: &str) -> Result<bool, StoreError> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)?;
        debug!(namespace = name, "Deleted namespace");
        Ok(true)
    }

    /// Delete every namespace in every partition. Returns the number
    /// deleted.
    pub fn clear_all(&self) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for name in self.list_namespaces()? {
            if self.delete_namespace(&name)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn entry_files(&self, dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
        let mut files = Vec::new();
        if !dir.is_dir() {
            return Ok(files);
        }
        for dir_entry in std::fs::read_dir(dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Drop the oldest entries of a Dynamic namespace once the cap is
    /// exceeded. The entry just written is never an eviction candidate.
    fn evict_overflow(&self, namespace: &Namespace, just_written: &Path) -> Result<(), StoreError> {
        let mut files = self.entry_files(&self.namespace_dir(namespace))?;
        if files.len() <= DYNAMIC_MAX_ENTRIES {
            return Ok(());
        }

        files.retain(|p| p.as_path() != just_written);
        files.sort_by_key(|p| {
            std::fs::metadata(p)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });

        let excess = (files.len() + 1).saturating_sub(DYNAMIC_MAX_ENTRIES);
        for path in files.into_iter().take(excess) {
            std::fs::remove_file(&path)?;
        }
        debug!(namespace = %namespace.name(), evicted = excess, "Evicted dynamic overflow");
        Ok(())
    }
}

/// Write `bytes` to `path` through a temp file and rename, so a reader
/// sees either the old entry or the new one, never a torn write.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);
    let tmp = path.with_extension(format!(
        "tmp{}",
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}
