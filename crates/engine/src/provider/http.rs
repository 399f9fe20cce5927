//! Shared reqwest plumbing for the HTTP adapters.

use std::time::Duration;

use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

use crate::errors::{ProviderError, ProviderErrorKind};
use crate::models::Capability;

/// Per-request timeout used when an adapter is not given one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Map a transport-level failure. Nothing reached the vendor or the
/// response never arrived, so these are all worth another try.
pub(crate) fn transport_error(vendor: &str, error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::retryable(
            ProviderErrorKind::Timeout,
            format!("{} request timed out", vendor),
        )
    } else if error.is_decode() {
        ProviderError::permanent(
            ProviderErrorKind::Decode,
            format!("{} response could not be decoded: {}", vendor, error),
        )
    } else {
        ProviderError::retryable(
            ProviderErrorKind::Network,
            format!("{} request failed: {}", vendor, error),
        )
    }
}

/// Send a request and classify any non-success status.
pub(crate) async fn send(vendor: &str, request: RequestBuilder) -> Result<Response, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(vendor, e))?;

    let status = response.status();
    debug!("{} responded with {}", vendor, status);

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status.as_u16(), &body))
}

/// Send a request and decode a JSON body. An empty body decodes to `null`.
pub(crate) async fn send_json(
    vendor: &str,
    request: RequestBuilder,
) -> Result<Value, ProviderError> {
    let response = send(vendor, request).await?;
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(vendor, e))?;

    if body.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&body).map_err(|e| {
        ProviderError::permanent(
            ProviderErrorKind::Decode,
            format!("{} returned invalid JSON: {}", vendor, e),
        )
    })
}

/// The envelope names a capability this adapter does not implement.
pub(crate) fn unsupported(vendor: &str, capability: Capability) -> ProviderError {
    ProviderError::permanent(
        ProviderErrorKind::InvalidRequest,
        format!("{} does not support {}", vendor, capability),
    )
}

/// Strip a trailing slash so paths can be appended with `format!`.
pub(crate) fn normalize_base_url(url: impl Into<String>) -> String {
    let url = url.into();
    url.trim_end_matches('/').to_string()
}
