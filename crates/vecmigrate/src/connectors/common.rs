//! Common utilities shared across connectors.
//!
//! HTTP client creation, URL validation and the mapping of HTTP failures
//! onto [`Error`] variants.

use crate::error::{Error, Result};
use reqwest::{Client, Response};
use std::time::Duration;

/// Default HTTP timeout for all connectors.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Which end of the migration a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Reading from the source.
    Source,
    /// Writing to the destination.
    Destination,
}

/// Creates a configured HTTP client with timeout.
#[must_use]
pub fn create_http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Validates a URL for safety (anti-SSRF).
pub fn validate_url(url: &str) -> Result<()> {
    let has_valid_scheme = ["http://", "https://"].iter().any(|s| url.starts_with(s));

    if !has_valid_scheme {
        return Err(Error::Config(format!(
            "Invalid URL scheme in '{}'. Allowed: http, https",
            url
        )));
    }

    if url.len() < 10 {
        return Err(Error::Config(format!("Invalid URL format: {}", url)));
    }

    Ok(())
}

/// Strips trailing slashes and adds `https://` to bare hosts.
#[must_use]
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Handles HTTP error responses and returns appropriate errors.
pub fn handle_http_error(status_code: u16, body: &str, backend: &str, side: Side) -> Error {
    match status_code {
        429 => Error::RateLimit(60), // Default 60s retry
        401 | 403 => Error::Authentication(format!("{} auth failed: {}", backend, body)),
        _ => {
            let message = format!("{} error {}: {}", backend, status_code, body);
            match side {
                Side::Source => Error::SourceConnection(message),
                Side::Destination => Error::DestinationConnection(message),
            }
        }
    }
}

/// Maps a transport failure (no response) onto the failing side.
pub fn transport_error(err: reqwest::Error, backend: &str, side: Side) -> Error {
    let message = format!("{} request failed: {}", backend, err);
    match side {
        Side::Source => Error::SourceConnection(message),
        Side::Destination => Error::DestinationConnection(message),
    }
}

/// Passes successful responses through and converts the rest into errors.
pub async fn check_response(response: Response, backend: &str, side: Side) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(handle_http_error(status.as_u16(), &body, backend, side))
}

/// Decodes a JSON response body, reporting failures against `side`.
pub async fn decode_json<T: serde::de::DeserializeOwned>(
    response: Response,
    what: &str,
    side: Side,
) -> Result<T> {
    response.json().await.map_err(|e| {
        let message = format!("Failed to parse {} response: {}", what, e);
        match side {
            Side::Source => Error::Extraction(message),
            Side::Destination => Error::Loading(message),
        }
    })
}
