//! HTTP client for catalog pages.

use std::time::Duration;

use reqwest::header::USER_AGENT;
use url::Url;

use crate::{user_agent::get_user_agent, Document, Error};

/// Production catalog host.
pub const DEFAULT_BASE_URL: &str = "https://eg.hatla2ee.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for plain catalog document fetches.
///
/// Sends requests with browser-like headers and a randomized user agent.
/// The underlying `reqwest::Client` is built once so connections are pooled
/// across the whole crawl.
pub struct Client {
    /// Base URL relative links are resolved against. Defaults to `https://eg.hatla2ee.com`.
    base_url: Url,
    http: reqwest::Client,
}

impl Client {
    /// Creates a new client pointing at the production catalog.
    pub fn new() -> Result<Self, Error> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a new client with a custom base URL. Used for testing with wiremock.
    pub fn with_base_url(base_url: &str) -> Result<Self, Error> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", base_url, e)))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                tracing::error!("Failed to build HTTP client: {}", e);
                Error::RequestFailed(e.to_string())
            })?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves an absolute URL, an absolute path, or a relative link against the base URL.
    pub fn resolve(&self, href: &str) -> Result<Url, Error> {
        self.base_url
            .join(href.trim())
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", href, e)))
    }

    /// Performs one GET and returns the body of a successful response.
    pub async fn get_document(&self, href: &str) -> Result<Document, Error> {
        let url = self.resolve(href)?;
        let resp = self
            .http
            .get(url.clone())
            .header(USER_AGENT, get_user_agent())
            .header("accept", "text/html,application/xhtml+xml")
            .header("accept-language", "en-US,en;q=0.9")
            .header("upgrade-insecure-requests", "1")
            .header("cache-control", "no-cache")
            .header("pragma", "no-cache")
            .send()
            .await
            .map_err(|e| {
                tracing::debug!("Failed to get {}: {}", url, e);
                Error::from(e)
            })?;

        let status = resp.status();
        let final_url = resp.url().to_string();
        let body = resp.text().await.map_err(|e| {
            tracing::debug!("Failed to read body of {}: {}", url, e);
            Error::from(e)
        })?;

        if !status.is_success() {
            let snippet = truncate_body(&body);
            tracing::debug!("{} returned status {}: {}", url, status, snippet);
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body: snippet,
            });
        }

        Ok(Document {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 500;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_relative_and_absolute_links() {
        let client = Client::with_base_url("https://example.com/").unwrap();
        assert_eq!(
            client.resolve("/en/new-car/kia").unwrap().as_str(),
            "https://example.com/en/new-car/kia"
        );
        assert_eq!(
            client.resolve("https://other.test/x").unwrap().as_str(),
            "https://other.test/x"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            Client::with_base_url("not a url"),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let body = "é".repeat(400);
        let out = truncate_body(&body);
        assert!(out.ends_with("...[truncated]"));
    }
}
