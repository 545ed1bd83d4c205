//! Document fetching behind the shared rate controller.

use async_trait::async_trait;
use catalog_client::{Client, Document};

use crate::error::FetchError;
use crate::rate::{RateController, RatePolicy, TrackerSummary};

/// Source of catalog documents for the traversal.
///
/// `DocumentFetcher` is the network implementation; tests substitute
/// in-memory catalogs.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetches one document. Failures are classified, never panics.
    async fn fetch(&self, url: &str) -> Result<Document, FetchError>;

    /// Called when the traversal moves on to a new brand.
    fn enter_brand(&self) {}

    /// Request counters, when the implementation tracks them.
    fn request_summary(&self) -> Option<TrackerSummary> {
        None
    }
}

/// Plain HTTP GETs paced and retried by a `RateController`.
pub struct DocumentFetcher {
    client: Client,
    rate: RateController,
}

impl DocumentFetcher {
    pub fn new(client: Client, policy: RatePolicy) -> Self {
        Self {
            client,
            rate: RateController::new(policy),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn rate(&self) -> &RateController {
        &self.rate
    }
}

#[async_trait]
impl Fetch for DocumentFetcher {
    async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        self.rate
            .run(url, || async {
                self.client
                    .get_document(url)
                    .await
                    .map_err(|e| FetchError::classify(url, &e))
            })
            .await
    }

    fn enter_brand(&self) {
        self.rate.enter_brand();
    }

    fn request_summary(&self) -> Option<TrackerSummary> {
        Some(self.rate.tracker().summary())
    }
}
