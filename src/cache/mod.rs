// Cache module for the in-memory snapshot.
// Route bodies, sorted repository views and the store readers sample from.

pub mod snapshot;
pub mod store;
pub mod views;

pub use snapshot::{Route, Snapshot};
pub use store::CacheStore;
pub use views::{RepoRecord, ViewIndex, ViewKey};
