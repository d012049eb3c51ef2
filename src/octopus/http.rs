//! HTTP utilities for Octopus REST API calls

use super::auth::{ApiKey, API_KEY_HEADER};
use crate::error::{ExportError, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = match body.char_indices().nth(MAX_LOG_BODY_LENGTH) {
        Some((end, _)) => format!(
            "{}... [truncated, {} bytes total]",
            &body[..end],
            body.len()
        ),
        None => body.to_string(),
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for Octopus API calls
#[derive(Clone)]
pub struct OctopusHttpClient {
    client: Client,
}

impl OctopusHttpClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("octoterra/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { client })
    }

    /// GET a JSON document. A 404 is `Ok(None)`; every other non-success
    /// status is an error.
    pub async fn get(&self, url: &str, key: &ApiKey) -> Result<Option<Value>> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, key.as_str())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::debug!("GET {} returned 404", url);
            return Ok(None);
        }

        let body = response.text().await?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(ExportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(Some(serde_json::from_str(&body)?))
    }
}
