// api-cache: read-through cache and proxy for the GitHub REST API.
// Refreshes a fixed set of org routes in the background and serves them from memory.

pub mod cache;
pub mod config;
pub mod error;
pub mod github;
pub mod refresh;
pub mod server;

pub use cache::{CacheStore, Route, Snapshot};
pub use config::AppConfig;
pub use error::{CacheError, ConfigError, QueryError, Result};
pub use refresh::{CycleReport, RefreshScheduler};
