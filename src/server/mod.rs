// HTTP server module.
// Builds the router that serves cached routes and views, and forwards everything else.

pub mod handlers;
pub mod proxy;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    routing::get,
};

use crate::cache::{CacheStore, Route};
use crate::github::GitHubClient;

use handlers::{cached_route, health_check, top_view};
use proxy::forward;

/// Shared state for request handlers.
pub struct AppState {
    pub store: Arc<CacheStore>,
    pub client: GitHubClient,
    pub org: String,
}

impl AppState {
    pub fn new(store: Arc<CacheStore>, client: GitHubClient, org: impl Into<String>) -> Self {
        Self {
            store,
            client,
            org: org.into(),
        }
    }
}

/// Build the router with all endpoints.
///
/// Cached paths answer GET from the snapshot; other methods on them and every unknown
/// path are forwarded upstream.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/healthcheck", get(health_check))
        .route("/view/top/:count/:key", get(top_view));

    for route in Route::ALL {
        let handler = move |State(state): State<Arc<AppState>>, request: Request| async move {
            cached_route(state, route, request).await
        };
        router = router.route(&route.path(&state.org), get(handler).fallback(forward));
    }

    router.fallback(forward).with_state(state)
}
