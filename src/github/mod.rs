// GitHub API module.
// Provides the HTTP client, paginated fetching and the repository entity type.

pub mod client;
pub mod pages;
pub mod types;

pub use client::GitHubClient;
pub use pages::{Page, PagedGet};
pub use types::*;
