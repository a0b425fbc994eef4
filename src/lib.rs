//! Offline caching and synchronization engine for the Pirogue marine
//! weather PWA.
//!
//! The engine runs as a background worker process between the page and
//! the network. It keeps the application usable with no connectivity,
//! keeps weather data as fresh as possible when connectivity exists,
//! and exposes a control protocol plus push handling to the foreground
//! application.
//!
//! Components:
//! - [`store`]: partitioned key→response-snapshot cache
//! - [`version`]: namespace ownership, precache, activation GC
//! - [`fetch`]: request classification and CacheFirst/NetworkFirst
//!   strategies
//! - [`control`]: request/reply protocol with the page
//! - [`sync`]: deferred revalidation on connectivity recovery
//! - [`push`]: notification rendering and click routing
//! - [`worker`]: the event loop tying it all together

pub mod clients;
pub mod config;
pub mod control;
pub mod fetch;
pub mod net;
pub mod push;
pub mod store;
pub mod sync;
pub mod version;
pub mod worker;

pub use config::WorkerConfig;
pub use worker::{Worker, WorkerEvent};
