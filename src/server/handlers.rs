//! HTTP handlers for the cached routes, views and health check.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Request, State},
    http::{Method, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;

use crate::cache::{Route, ViewKey};
use crate::error::QueryError;

use super::AppState;
use super::proxy::forward;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// 200 once the first snapshot is published, 503 before.
pub async fn health_check(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.store.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Serve a route body from the current snapshot.
///
/// A route that has never been fetched successfully is read through to upstream.
pub async fn cached_route(state: Arc<AppState>, route: Route, request: Request) -> Response {
    if request.method() == Method::GET {
        if let Some(body) = state.store.get(route) {
            return ([(CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response();
        }
        debug!(route = %route, "no cached body yet, reading through");
    }
    forward(State(state), request).await
}

/// `GET /view/top/{count}/{key}`
pub async fn top_view(
    State(state): State<Arc<AppState>>,
    Path((count, key)): Path<(String, String)>,
) -> Response {
    let (count, key) = match parse_view_params(&count, &key) {
        Ok(params) => params,
        Err(err) => return err.into_response(),
    };

    // One snapshot for the whole response.
    let snapshot = state.store.current();
    if !snapshot.ready {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "cache is warming up"})),
        )
            .into_response();
    }

    Json(snapshot.views.render_top(key, count, &state.org)).into_response()
}

fn parse_view_params(count: &str, key: &str) -> Result<(usize, ViewKey), QueryError> {
    let key = key.parse::<ViewKey>()?;
    let count = count
        .trim()
        .parse::<usize>()
        .map_err(|_| QueryError::InvalidCount(count.to_string()))?;
    Ok((count, key))
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match &self {
            QueryError::UnknownKey(_) => StatusCode::NOT_FOUND,
            QueryError::InvalidCount(_) => StatusCode::BAD_REQUEST,
        };
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}
