// Paginated GET support.
// Walks a collection endpoint by following the `rel="next"` entry of the Link header.

use bytes::Bytes;
use reqwest::header::{HeaderMap, LINK};
use tracing::debug;

use crate::error::Result;

use super::client::GitHubClient;

/// One fetched page.
#[derive(Debug, Clone)]
pub struct Page {
    /// URL the page was fetched from.
    pub url: String,
    pub body: Bytes,
}

/// Forward-only walk over the pages of one endpoint.
///
/// Once the last page has been returned, or any request failed, the walk is finished
/// and `next_page` keeps returning `Ok(None)`.
#[derive(Debug)]
pub struct PagedGet {
    client: GitHubClient,
    next: Option<String>,
    fetched: usize,
}

impl PagedGet {
    pub(crate) fn new(client: GitHubClient, url: String) -> Self {
        Self {
            client,
            next: Some(url),
            fetched: 0,
        }
    }

    /// Number of pages returned so far.
    pub fn pages_fetched(&self) -> usize {
        self.fetched
    }

    pub fn is_finished(&self) -> bool {
        self.next.is_none()
    }

    /// Fetch the next page, or `None` when the chain is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Page>> {
        let Some(url) = self.next.take() else {
            return Ok(None);
        };

        let response = self.client.get_url(&url).await?;
        let next = next_link(response.headers());
        let body = response.bytes().await?;

        self.fetched += 1;
        debug!(url = %url, page = self.fetched, bytes = body.len(), has_next = next.is_some(), "fetched page");
        self.next = next;

        Ok(Some(Page { url, body }))
    }

    /// Drain the remaining pages into a vector.
    pub async fn collect(mut self) -> Result<Vec<Page>> {
        let mut pages = Vec::new();
        while let Some(page) = self.next_page().await? {
            pages.push(page);
        }
        Ok(pages)
    }
}

/// Extract the `rel="next"` target from a response's Link header(s).
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(parse_next_link)
}

/// Parse an RFC 8288 style link list such as
/// `<https://api.github.com/x?page=2>; rel="next", <https://api.github.com/x?page=5>; rel="last"`.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let url = target.strip_prefix('<')?.strip_suffix('>')?;

        let is_next = parts.any(|param| {
            let Some((key, value)) = param.split_once('=') else {
                return false;
            };
            key.trim().eq_ignore_ascii_case("rel")
                && value
                    .trim()
                    .trim_matches('"')
                    .split_whitespace()
                    .any(|rel| rel.eq_ignore_ascii_case("next"))
        });

        (is_next && !url.is_empty()).then(|| url.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use std::time::Duration;

    #[test]
    fn test_parse_next_link() {
        let header = "<https://api.github.com/orgs/x/repos?page=2>; rel=\"next\", \
                      <https://api.github.com/orgs/x/repos?page=4>; rel=\"last\"";
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://api.github.com/orgs/x/repos?page=2")
        );
    }

    #[test]
    fn test_parse_next_link_order_and_spacing() {
        let header = "<https://h/p?page=1>; rel=\"prev\",<https://h/p?page=3>;rel=next";
        assert_eq!(parse_next_link(header).as_deref(), Some("https://h/p?page=3"));

        let combined = "<https://h/p?page=3>; rel=\"next last\"";
        assert_eq!(parse_next_link(combined).as_deref(), Some("https://h/p?page=3"));
    }

    #[test]
    fn test_parse_without_next() {
        let header = "<https://h/p?page=1>; rel=\"first\", <https://h/p?page=2>; rel=\"prev\"";
        assert!(parse_next_link(header).is_none());
        assert!(parse_next_link("").is_none());
        assert!(parse_next_link("garbage; rel=\"next\"").is_none());
    }

    #[tokio::test]
    async fn test_walks_three_pages() {
        let server = MockServer::start_async().await;
        let p1 = server
            .mock_async(|when, then| {
                when.method(GET).path("/orgs/acme/repos");
                then.status(200)
                    .header("link", format!("<{}>; rel=\"next\"", server.url("/pages/2")))
                    .body("[1]");
            })
            .await;
        let p2 = server
            .mock_async(|when, then| {
                when.method(GET).path("/pages/2");
                then.status(200)
                    .header(
                        "link",
                        format!(
                            "<{}>; rel=\"prev\", <{}>; rel=\"next\"",
                            server.url("/orgs/acme/repos"),
                            server.url("/pages/3")
                        ),
                    )
                    .body("[2]");
            })
            .await;
        let p3 = server
            .mock_async(|when, then| {
                when.method(GET).path("/pages/3");
                then.status(200)
                    .header("link", format!("<{}>; rel=\"prev\"", server.url("/pages/2")))
                    .body("[3]");
            })
            .await;

        let client =
            GitHubClient::new(&server.base_url(), None, Duration::from_secs(5), 0).unwrap();
        let mut pages = client.paged("/orgs/acme/repos");
        let mut bodies = Vec::new();
        while let Some(page) = pages.next_page().await.unwrap() {
            bodies.push(page.body);
        }

        assert_eq!(bodies, vec!["[1]", "[2]", "[3]"]);
        assert_eq!(pages.pages_fetched(), 3);
        assert!(pages.is_finished());
        assert!(pages.next_page().await.unwrap().is_none());
        p1.assert_hits_async(1).await;
        p2.assert_hits_async(1).await;
        p3.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_single_page_without_link_header() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/");
                then.status(200).body("{\"current_user_url\":\"x\"}");
            })
            .await;

        let client =
            GitHubClient::new(&server.base_url(), None, Duration::from_secs(5), 0).unwrap();
        let pages = client.paged("/").collect().await.unwrap();
        assert_eq!(pages.len(), 1);
    }

    #[tokio::test]
    async fn test_error_ends_the_walk() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/orgs/acme/members");
                then.status(200)
                    .header("link", format!("<{}>; rel=\"next\"", server.url("/broken")))
                    .body("[]");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/broken");
                then.status(404);
            })
            .await;

        let client =
            GitHubClient::new(&server.base_url(), None, Duration::from_secs(5), 0).unwrap();
        let mut pages = client.paged("/orgs/acme/members");
        assert!(pages.next_page().await.unwrap().is_some());
        assert!(pages.next_page().await.is_err());
        assert!(pages.is_finished());
        assert!(pages.next_page().await.unwrap().is_none());
    }
}
