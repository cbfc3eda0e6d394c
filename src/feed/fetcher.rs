use crate::feed::parser::{parse_document, FeedDocument};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Client header sent with every feed request
pub const DEFAULT_USER_AGENT: &str = "gather";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving a feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the client timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Body was not a well-formed RSS document
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(err)
        }
    }
}

/// Build the HTTP client shared by every fetch.
pub fn build_client(user_agent: &str, timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
}

/// Fetch `url` and parse the body as an RSS document.
///
/// Titles and descriptions in the result are HTML-entity decoded.
///
/// # Errors
///
/// - [`FetchError::Network`] / [`FetchError::Timeout`] on transport failure
/// - [`FetchError::HttpStatus`] on a non-2xx response
/// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`] on a bad body
/// - [`FetchError::Parse`] on malformed XML
pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<FeedDocument, FetchError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
    tracing::debug!(url = %url, bytes = bytes.len(), "Fetched feed body");

    parse_document(&bytes).map_err(FetchError::Parse)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
