//! Shared HTTP plumbing for the adapters.

use crate::error::{ProviderError, ProviderResult};
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Build a client with fixed default headers.
pub(crate) fn client(headers: HeaderMap) -> ProviderResult<reqwest::Client> {
    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(600))
        .build()
        .map_err(|e| ProviderError::internal(e.to_string()))
}

/// Send a JSON request and return the decoded body of a successful response.
pub(crate) async fn post_json(
    request: RequestBuilder,
    body: &Value,
    provider: &str,
) -> ProviderResult<Value> {
    let response = request.json(body).send().await?;
    let status = response.status();
    debug!(provider, status = %status, "Provider response received");

    if !status.is_success() {
        return Err(error_for_status(provider, response).await);
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        ProviderError::invalid_response(format!("{} returned non-JSON body: {}", provider, e))
    })
}

async fn error_for_status(provider: &str, response: Response) -> ProviderError {
    let status = response.status();
    let retry_after = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    warn!(provider, status = %status, body = %body, "Provider request failed");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::InvalidApiKey(provider.to_string())
        }
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { retry_after },
        _ => ProviderError::api_error(status.as_u16(), error_message(&body)),
    }
}

/// Parse `retry-after-ms` or `retry-after` (seconds).
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
    };
    read("retry-after-ms")
        .map(|ms| Duration::from_millis(ms as u64))
        .or_else(|| read("retry-after").map(Duration::from_secs_f64))
}

/// Pull `error.message` out of a vendor error body, or return it raw.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
