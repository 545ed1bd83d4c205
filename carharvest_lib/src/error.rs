//! Error types for the harvesting pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::field_mapping::MappingError;

/// Classified outcome of a failed document fetch.
///
/// `Transient` failures are retried by the rate controller; once the retry
/// budget is spent they are handed back as `Permanent`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transient failure fetching {url}: {reason}")]
    Transient { url: String, reason: String },
    #[error("permanent failure fetching {url} after {attempts} attempt(s): {reason}")]
    Permanent {
        url: String,
        reason: String,
        attempts: u32,
    },
}

impl FetchError {
    /// Maps a client error onto the retry taxonomy.
    ///
    /// Timeouts, connection failures, 429 and 5xx are transient; bad URLs and
    /// other 4xx statuses will not improve on retry.
    pub fn classify(url: &str, err: &catalog_client::Error) -> Self {
        use catalog_client::Error;

        let transient = match err {
            Error::Timeout | Error::Connect(_) | Error::RequestFailed(_) => true,
            Error::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Error::InvalidUrl(_) => false,
        };
        if transient {
            FetchError::Transient {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            FetchError::Permanent {
                url: url.to_string(),
                reason: err.to_string(),
                attempts: 1,
            }
        }
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Transient { url, .. } | FetchError::Permanent { url, .. } => url,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// Errors that end a harvest run. Everything else is logged and skipped.
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("invalid field mapping: {0}")]
    Mapping(#[from] MappingError),
    #[error("catalog root unreachable: {0}")]
    CatalogUnreachable(#[source] FetchError),
    #[error("no brands discovered at {0}")]
    NoBrands(String),
    #[error("no brands left after applying brand filters ({discovered} discovered)")]
    AllBrandsFiltered { discovered: usize },
    #[error("invalid rate policy: {0}")]
    InvalidPolicy(String),
    #[error("failed to build catalog client: {0}")]
    Client(#[from] catalog_client::Error),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_server_errors_as_transient() {
        let err = catalog_client::Error::HttpStatus {
            status: 503,
            body: String::new(),
        };
        assert!(FetchError::classify("/x", &err).is_transient());
        let err = catalog_client::Error::HttpStatus {
            status: 429,
            body: String::new(),
        };
        assert!(FetchError::classify("/x", &err).is_transient());
        assert!(FetchError::classify("/x", &catalog_client::Error::Timeout).is_transient());
    }

    #[test]
    fn classify_client_errors_as_permanent() {
        let err = catalog_client::Error::HttpStatus {
            status: 404,
            body: String::new(),
        };
        let classified = FetchError::classify("/gone", &err);
        assert!(matches!(
            classified,
            FetchError::Permanent { attempts: 1, .. }
        ));
        assert_eq!(classified.url(), "/gone");
        let err = catalog_client::Error::InvalidUrl("::".into());
        assert!(!FetchError::classify("::", &err).is_transient());
    }
}
