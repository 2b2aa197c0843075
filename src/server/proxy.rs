//! Pass-through proxy for paths that are not cached.
//!
//! The request method, headers and body are sent upstream unchanged; the upstream status,
//! headers and body are returned to the caller.

use std::sync::Arc;

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{info, warn};

use super::AppState;

/// Largest request body forwarded upstream.
const MAX_FORWARD_BODY: usize = 10 * 1024 * 1024;

/// Headers that describe a single connection and must not be relayed.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub async fn forward(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let body = match to_bytes(body, MAX_FORWARD_BODY).await {
        Ok(body) => body,
        Err(err) => {
            warn!(path = %path_and_query, error = %err, "failed reading request body");
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, err.to_string());
        }
    };

    info!(method = %parts.method, path = %path_and_query, "Forwarding");
    let upstream = match state
        .client
        .forward(
            parts.method,
            &path_and_query,
            strip_hop_by_hop(parts.headers),
            body,
        )
        .await
    {
        Ok(response) => response,
        Err(err) => {
            warn!(path = %path_and_query, error = %err, "forward failed");
            return error_response(StatusCode::BAD_GATEWAY, err.to_string());
        }
    };

    let status = upstream.status();
    let mut headers = strip_hop_by_hop(upstream.headers().clone());
    headers.remove(header::CONTENT_LENGTH);
    match upstream.bytes().await {
        Ok(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            response
        }
        Err(err) => {
            warn!(path = %path_and_query, error = %err, "failed reading upstream body");
            error_response(StatusCode::BAD_GATEWAY, err.to_string())
        }
    }
}

fn strip_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, Route, Snapshot};
    use crate::github::GitHubClient;
    use crate::server::handlers::cached_route;
    use axum::http::{HeaderValue, Method};
    use bytes::Bytes;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use std::time::Duration;

    fn state(base_url: &str, store: Arc<CacheStore>) -> Arc<AppState> {
        let client = GitHubClient::new(base_url, Some("secret"), Duration::from_secs(5), 0).unwrap();
        Arc::new(AppState::new(store, client, "acme"))
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:8080"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let headers = strip_hop_by_hop(headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::ACCEPT));
    }

    #[tokio::test]
    async fn test_forwards_method_body_and_status() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/repos/acme/widgets/issues")
                    .query_param("per_page", "5")
                    .header("x-custom", "yes")
                    .body("{\"title\":\"t\"}");
                then.status(201)
                    .header("x-upstream", "1")
                    .body("{\"number\":7}");
            })
            .await;

        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/repos/acme/widgets/issues?per_page=5")
            .header("x-custom", "yes")
            .header(header::HOST, "localhost:8080")
            .body(Body::from("{\"title\":\"t\"}"))
            .unwrap();

        let store = Arc::new(CacheStore::new());
        let response = forward(State(state(&server.base_url(), store)), request).await;

        mock.assert_async().await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get("x-upstream").unwrap().to_str().unwrap(), "1");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "{\"number\":7}");
    }

    #[tokio::test]
    async fn test_forward_does_not_attach_configured_token() {
        let server = MockServer::start_async().await;
        let with_token = server
            .mock_async(|when, then| {
                when.method(GET).path("/users/octocat").header_exists("authorization");
                then.status(500);
            })
            .await;
        let without_token = server
            .mock_async(|when, then| {
                when.method(GET).path("/users/octocat");
                then.status(200).body("{}");
            })
            .await;

        let request = axum::http::Request::builder()
            .uri("/users/octocat")
            .body(Body::empty())
            .unwrap();
        let store = Arc::new(CacheStore::new());
        let response = forward(State(state(&server.base_url(), store)), request).await;

        assert_eq!(response.status(), StatusCode::OK);
        with_token.assert_hits_async(0).await;
        without_token.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_uncached_route_reads_through() {
        let server = MockServer::start_async().await;
        let upstream = server
            .mock_async(|when, then| {
                when.method(GET).path("/orgs/acme/members");
                then.status(200).body("[{\"login\":\"live\"}]");
            })
            .await;

        let store = Arc::new(CacheStore::new());
        let mut snapshot = Snapshot::empty().successor();
        snapshot
            .bodies
            .insert(Route::Org, Bytes::from_static(b"{\"login\":\"acme\"}"));
        snapshot.ready = true;
        store.publish(snapshot);

        let request = axum::http::Request::builder()
            .uri("/orgs/acme/members")
            .body(Body::empty())
            .unwrap();
        let response = cached_route(state(&server.base_url(), store), Route::OrgMembers, request).await;

        upstream.assert_async().await;
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "[{\"login\":\"live\"}]");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let request = axum::http::Request::builder()
            .uri("/anything")
            .body(Body::empty())
            .unwrap();
        let store = Arc::new(CacheStore::new());
        let response = forward(State(state("http://127.0.0.1:9", store)), request).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
