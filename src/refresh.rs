// Background refresh loop.
// Fetches every cached route concurrently, rebuilds the views and publishes one new snapshot per cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStore, RepoRecord, Route, ViewIndex};
use crate::config::RefreshConfig;
use crate::error::{CacheError, Result};
use crate::github::{GitHubClient, Repository};

/// Phase of the refresh cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshPhase {
    #[default]
    Idle,
    Fetching,
    Aggregating,
    Publishing,
}

impl RefreshPhase {
    pub fn display(&self) -> &'static str {
        match self {
            RefreshPhase::Idle => "Idle",
            RefreshPhase::Fetching => "Fetching routes",
            RefreshPhase::Aggregating => "Building views",
            RefreshPhase::Publishing => "Publishing snapshot",
        }
    }
}

/// What one route fetch produced.
#[derive(Debug)]
struct RouteData {
    body: Bytes,
    pages: usize,
    /// Present for the repos route only.
    records: Option<Vec<RepoRecord>>,
}

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Generation current after the cycle.
    pub generation: u64,
    /// Whether a new snapshot was published.
    pub published: bool,
    pub refreshed: Vec<Route>,
    pub failed: Vec<(Route, String)>,
    /// Tasks that panicked; their routes keep previous data.
    pub panicked: usize,
}

impl CycleReport {
    pub fn failed_routes(&self) -> Vec<Route> {
        self.failed.iter().map(|(route, _)| *route).collect()
    }
}

/// Periodically refreshes all routes into a [`CacheStore`].
pub struct RefreshScheduler {
    client: GitHubClient,
    store: Arc<CacheStore>,
    org: String,
    interval: Duration,
    route_timeout: Duration,
    phase: RefreshPhase,
}

impl RefreshScheduler {
    pub fn new(
        client: GitHubClient,
        store: Arc<CacheStore>,
        org: impl Into<String>,
        config: &RefreshConfig,
    ) -> Self {
        Self {
            client,
            store,
            org: org.into(),
            interval: config.interval(),
            route_timeout: config.cycle_timeout(),
            phase: RefreshPhase::Idle,
        }
    }

    /// Override the per-route deadline within a cycle.
    pub fn with_route_timeout(mut self, route_timeout: Duration) -> Self {
        self.route_timeout = route_timeout;
        self
    }

    pub fn phase(&self) -> RefreshPhase {
        self.phase
    }

    /// Refresh forever. The first cycle starts immediately; cycles never overlap.
    pub async fn run(mut self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(org = %self.org, interval = ?self.interval, "refresh loop started");
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }

    /// Run one fetch, aggregate, publish pass across all routes.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.set_phase(RefreshPhase::Fetching);
        let mut tasks = JoinSet::new();
        for route in Route::ALL {
            let client = self.client.clone();
            let path = route.path(&self.org);
            let deadline = self.route_timeout;
            tasks.spawn(async move {
                let outcome = timeout(deadline, fetch_route(&client, route, &path)).await;
                let result = match outcome {
                    Ok(result) => result,
                    Err(_) => Err(CacheError::Timeout {
                        route: path,
                        after: deadline,
                    }),
                };
                (route, result)
            });
        }

        // Barrier: every route finishes, one way or another, before anything is published.
        let mut report = CycleReport::default();
        let mut fetched = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((route, Ok(data))) => {
                    info!(
                        route = %route,
                        pages = data.pages,
                        bytes = data.body.len(),
                        "Refreshed {} cache",
                        route
                    );
                    fetched.insert(route, data);
                }
                Ok((route, Err(err))) => {
                    warn!(route = %route, error = %err, "refresh failed, keeping previous body");
                    report.failed.push((route, err.to_string()));
                }
                Err(err) => {
                    error!(error = %err, "refresh task did not complete");
                    report.panicked += 1;
                }
            }
        }

        self.set_phase(RefreshPhase::Aggregating);
        let previous = self.store.current();
        let mut next = previous.successor();
        for route in Route::ALL {
            let Some(data) = fetched.remove(&route) else {
                continue;
            };
            next.bodies.insert(route, data.body);
            if let Some(records) = data.records {
                let views = ViewIndex::build(records);
                debug!(records = views.len(), "rebuilt repository views");
                next.views = Arc::new(views);
            }
            report.refreshed.push(route);
        }
        report.failed.sort_by_key(|(route, _)| Route::ALL.iter().position(|r| r == route));

        if report.refreshed.is_empty() {
            warn!(
                generation = previous.generation,
                "no route refreshed this cycle, keeping current snapshot"
            );
            report.generation = previous.generation;
            self.set_phase(RefreshPhase::Idle);
            return report;
        }

        self.set_phase(RefreshPhase::Publishing);
        next.ready = true;
        let published = self.store.publish(next);
        report.generation = published.generation;
        report.published = true;
        info!(
            generation = published.generation,
            refreshed = report.refreshed.len(),
            failed = report.failed.len(),
            repos = published.views.len(),
            "published snapshot"
        );

        self.set_phase(RefreshPhase::Idle);
        report
    }

    fn set_phase(&mut self, phase: RefreshPhase) {
        debug!(phase = phase.display(), "refresh phase");
        self.phase = phase;
    }
}

/// Fetch every page of one route.
///
/// Object routes keep the last page. Collection routes merge all pages into one JSON array,
/// and the repos route also yields the records its views are built from.
async fn fetch_route(client: &GitHubClient, route: Route, path: &str) -> Result<RouteData> {
    let mut pages = client.paged(path);

    if !route.is_collection() {
        let mut last = None;
        while let Some(page) = pages.next_page().await? {
            last = Some(page.body);
        }
        let body = last.ok_or_else(|| CacheError::Other(format!("no pages returned for {path}")))?;
        return Ok(RouteData {
            body,
            pages: pages.pages_fetched(),
            records: None,
        });
    }

    let mut entities: Vec<Value> = Vec::new();
    while let Some(page) = pages.next_page().await? {
        let items: Vec<Value> =
            serde_json::from_slice(&page.body).map_err(|source| CacheError::Decode {
                url: page.url.clone(),
                source,
            })?;
        entities.extend(items);
    }

    let records = if route == Route::OrgRepos {
        let records = entities
            .iter()
            .map(|entity| Repository::deserialize(entity).map(|repo| RepoRecord::from(&repo)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|source| CacheError::Decode {
                url: client.url_for(path),
                source,
            })?;
        debug!(route = %route, repos = records.len(), "decoded repositories");
        Some(records)
    } else {
        None
    };

    Ok(RouteData {
        body: Bytes::from(serde_json::to_vec(&entities)?),
        pages: pages.pages_fetched(),
        records,
    })
}
