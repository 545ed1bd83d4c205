//! Error types for the document client.

/// Errors that can occur when fetching a catalog document.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The URL could not be parsed or joined onto the base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// The request did not complete before the client timeout.
    #[error("Request timed out")]
    Timeout,
    /// The connection could not be established or was reset.
    #[error("Connection failed: {0}")]
    Connect(String),
    /// Any other transport failure (TLS, body decoding, redirects).
    #[error("Request failed: {0}")]
    RequestFailed(String),
    /// The server returned a non-success status with a body snippet.
    #[error("Request failed with status {status}")]
    HttpStatus { status: u16, body: String },
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout
        } else if e.is_connect() {
            Error::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            Error::HttpStatus {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            Error::RequestFailed(e.to_string())
        }
    }
}
