// GitHub API HTTP client.
// Handles authentication headers, retries, rate limit detection and pass-through forwarding.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{
    Client, Method, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT},
};
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::error::{CacheError, Result};

use super::pages::PagedGet;
use super::types::RateLimit;

const GITHUB_API_ACCEPT: &str = "application/vnd.github.v3+json";
const USER_AGENT_VALUE: &str = concat!("api-cache/", env!("CARGO_PKG_VERSION"));
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// GitHub API client shared by the refresh tasks and the proxy.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    base_url: String,
    auth: Option<HeaderValue>,
    max_retries: usize,
}

impl GitHubClient {
    /// Create a client against `base_url`, optionally authenticating refresh requests.
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let auth = token
            .map(|token| {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| CacheError::Other(e.to_string()))?;
                value.set_sensitive(true);
                Ok::<_, CacheError>(value)
            })
            .transpose()?;

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(CacheError::Transport)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            max_retries,
        })
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            config.api_token.as_deref(),
            config.request_timeout(),
            config.max_retries,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path such as `/orgs/rust-lang`.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Start a paginated walk at `path`.
    pub fn paged(&self, path: &str) -> PagedGet {
        PagedGet::new(self.clone(), self.url_for(path))
    }

    /// GET an absolute URL, retrying transport errors and retryable statuses.
    pub async fn get_url(&self, url: &str) -> Result<Response> {
        let mut attempt = 0;
        loop {
            let mut request = self.client.get(url).header(ACCEPT, GITHUB_API_ACCEPT);
            if let Some(auth) = &self.auth {
                request = request.header(AUTHORIZATION, auth.clone());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) if attempt < self.max_retries => {
                    let wait = backoff(attempt);
                    warn!(url, attempt = attempt + 1, error = %err, "transport error, retrying in {:?}", wait);
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(CacheError::Transport(err)),
            };

            if is_retryable(response.status()) && attempt < self.max_retries {
                let wait = retry_after_or_backoff(&response, attempt);
                debug!(url, status = %response.status(), attempt = attempt + 1, "retryable status, waiting {:?}", wait);
                tokio::time::sleep(wait).await;
                attempt += 1;
                continue;
            }

            return check_response(response).await;
        }
    }

    /// Forward a request to upstream unchanged apart from the target host.
    ///
    /// The caller's headers are used as-is; the configured token is not attached.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response> {
        let url = self.url_for(path_and_query);
        self.client
            .request(method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(CacheError::Transport)
    }
}

/// Check response status and convert errors.
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let rate_limit = RateLimit::from_headers(response.headers());
    match status {
        StatusCode::UNAUTHORIZED => Err(CacheError::Unauthorized),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS if rate_limit.is_exhausted() => {
            let reset_at = chrono::DateTime::from_timestamp(rate_limit.reset as i64, 0)
                .map(|dt| dt.format("%H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Err(CacheError::RateLimited { reset_at })
        }
        status => {
            let url = response.url().to_string();
            let body = response.text().await.unwrap_or_default();
            Err(CacheError::Status {
                url,
                status,
                body: truncate(body, 512),
            })
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff(attempt: usize) -> Duration {
    let secs = 1u64 << attempt.min(5);
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

fn retry_after_or_backoff(response: &Response, attempt: usize) -> Duration {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| Duration::from_secs(secs).min(MAX_BACKOFF))
        .unwrap_or_else(|| backoff(attempt))
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    body
}
