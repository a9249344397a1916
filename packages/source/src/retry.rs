//! HTTP retry helpers for transient errors.
//!
//! All source adapters should use [`send_json`] or [`send`] instead of
//! calling `reqwest::RequestBuilder::send()` directly, so every request
//! gets a short exponential backoff on connection failures, timeouts and
//! server errors.
//!
//! At most two retries are made. The orchestrator's per-source timeout
//! bounds total latency either way.
//!
//! # Usage
//!
//! ```ignore
//! use crate::retry;
//!
//! let body = retry::send_json(|| client.get(&url).query(&params)).await?;
//! ```

use std::time::Duration;

use reqwest::StatusCode;

use crate::SourceError;

/// Maximum number of retry attempts for transient HTTP errors.
///
/// With backoff of 500ms then 1s the worst case adds 1.5s of waiting on
/// top of the request timeouts.
const MAX_RETRIES: u32 = 2;

/// Base backoff delay, doubled on each retry.
const BASE_DELAY_MS: u64 = 250;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// What to do with a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusAction {
    Accept,
    Retry,
    RateLimited,
    Fail,
}

fn classify(status: StatusCode) -> StatusAction {
    if status == StatusCode::TOO_MANY_REQUESTS {
        StatusAction::RateLimited
    } else if status.is_server_error() {
        StatusAction::Retry
    } else if status.is_client_error() {
        StatusAction::Fail
    } else {
        StatusAction::Accept
    }
}

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (since builders are consumed by
/// `.send()`).
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all retries, the
/// server returns a non-retryable status code, or the response body is
/// not valid JSON.
pub async fn send_json<F>(build_request: F) -> Result<serde_json::Value, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let response = send(&build_request).await?;
    let url = strip_query(response.url());
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        let preview = text.chars().take(BODY_PREVIEW_LEN).collect::<String>();
        log::warn!(
            "JSON parse failed\n  \
             url: {url}\n  \
             received: {} bytes\n  \
             parse error: {e}\n  \
             body preview: {preview}",
            text.len(),
        );
        SourceError::Json(e)
    })
}

/// Sends an HTTP request, retrying transient failures, and returns the
/// response if its status is 2xx or 3xx.
///
/// # Errors
///
/// * [`SourceError::RateLimited`] on HTTP 429 (not retried)
/// * [`SourceError::Status`] on other 4xx, or 5xx after all retries
/// * [`SourceError::Http`] on a transport error
pub async fn send<F>(build_request: &F) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = Duration::from_millis(BASE_DELAY_MS << attempt);
            log::debug!("  retry {attempt}/{MAX_RETRIES} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < MAX_RETRIES {
                    log::warn!("  transient error: {e}");
                    attempt += 1;
                    continue;
                }
                return Err(SourceError::Http(e));
            }
            Ok(response) => {
                let status = response.status();
                let url = strip_query(response.url());

                match classify(status) {
                    StatusAction::Accept => return Ok(response),
                    StatusAction::RateLimited => {
                        log::warn!("  HTTP 429 from {url}");
                        return Err(SourceError::RateLimited { url });
                    }
                    StatusAction::Retry if attempt < MAX_RETRIES => {
                        log::warn!("  HTTP {status} from {url} (server error)");
                        attempt += 1;
                    }
                    StatusAction::Retry | StatusAction::Fail => {
                        return Err(SourceError::Status {
                            status: status.as_u16(),
                            url,
                        });
                    }
                }
            }
        }
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

/// URL without its query string, so API keys never reach logs or errors.
fn strip_query(url: &reqwest::Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        assert_eq!(classify(StatusCode::OK), StatusAction::Accept);
        assert_eq!(classify(StatusCode::FOUND), StatusAction::Accept);
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), StatusAction::RateLimited);
        assert_eq!(classify(StatusCode::BAD_GATEWAY), StatusAction::Retry);
        assert_eq!(classify(StatusCode::UNAUTHORIZED), StatusAction::Fail);
    }

    #[test]
    fn strips_credentials_from_urls() {
        let url = reqwest::Url::parse("https://maps.example.com/json?query=x&key=secret").unwrap();
        assert_eq!(strip_query(&url), "https://maps.example.com/json");
    }

    #[tokio::test]
    async fn connection_refused_is_an_http_error() {
        let client = reqwest::Client::new();
        let err = send(&|| client.get("http://127.0.0.1:9/")).await.unwrap_err();
        assert!(matches!(err, SourceError::Http(_)));
    }
}
