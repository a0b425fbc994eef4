//! Request interception: classification and fetch strategies.
//!
//! Every intercepted request is classified into a resource class
//! (`classify`) and routed to the strategy for that class (`strategy`):
//! CacheFirst for static assets, NetworkFirst for weather data and
//! documents. Strategies are explicit ordered fallback chains; every
//! request receives a well-formed response, never an error.

pub mod classify;
pub mod strategy;

pub use classify::{classify, partition_for, Destination, FetchRequest, RequestClass};
pub use strategy::{Revalidation, Served, ServeSource, StrategyDispatcher};
