// Cached routes and the published snapshot.
// A snapshot is one immutable generation of route bodies plus the views derived from them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::views::ViewIndex;

/// One of the upstream endpoints served from memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Root,
    Org,
    OrgMembers,
    OrgRepos,
}

impl Route {
    pub const ALL: [Route; 4] = [Route::Root, Route::Org, Route::OrgMembers, Route::OrgRepos];

    /// Upstream (and served) path for this route.
    pub fn path(&self, org: &str) -> String {
        match self {
            Route::Root => "/".to_string(),
            Route::Org => format!("/orgs/{}", org),
            Route::OrgMembers => format!("/orgs/{}/members", org),
            Route::OrgRepos => format!("/orgs/{}/repos", org),
        }
    }

    /// Collection routes return JSON arrays whose pages are merged into one body.
    pub fn is_collection(&self) -> bool {
        matches!(self, Route::OrgMembers | Route::OrgRepos)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Route::Root => "root",
            Route::Org => "org",
            Route::OrgMembers => "org_members",
            Route::OrgRepos => "org_repos",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One consistent generation of cached data.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Incremented on every publish; 0 is the empty initial snapshot.
    pub generation: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub bodies: HashMap<Route, Bytes>,
    /// Views built from the same fetch as the `OrgRepos` body.
    pub views: Arc<ViewIndex>,
    pub ready: bool,
}

impl Snapshot {
    /// The empty, not-ready snapshot a store starts with.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Body for `route`, if it has ever been fetched successfully.
    pub fn body(&self, route: Route) -> Option<Bytes> {
        self.bodies.get(&route).cloned()
    }

    /// Start the next generation from this one. Bodies and views carry over until replaced.
    pub fn successor(&self) -> Self {
        Self {
            generation: self.generation + 1,
            refreshed_at: Some(Utc::now()),
            bodies: self.bodies.clone(),
            views: Arc::clone(&self.views),
            ready: self.ready,
        }
    }
}
