//! Partitioned response cache for offline data access.
//!
//! This module provides the `CacheStore` backing every fetch strategy:
//! response snapshots are stored as JSON files, one file per resource key,
//! grouped into named namespaces (one per partition per worker version).
//!
//! Partitions:
//! - `Static`: precached shell assets
//! - `Dynamic`: runtime-cached documents and miscellaneous assets (bounded)
//! - `Data`: weather and fishing-condition resources

pub mod cache;
pub mod keys;
pub mod snapshot;

pub use cache::{CacheStore, Namespace, Partition, StoreError};
pub use snapshot::{ResponseSnapshot, StoredEntry};
