//! HTTP retry helpers for transient errors.
//!
//! Every request made by [`crate::http::HttpTransport`] goes through
//! [`send_text`] instead of calling `reqwest::RequestBuilder::send()`
//! directly, so each one gets a bounded number of attempts with
//! exponential backoff for transient failures (timeouts, connection
//! resets, server errors, rate limiting).
//!
//! # Usage
//!
//! ```ignore
//! use crate::retry;
//!
//! let body = retry::send_text(|| client.get(&url)).await?;
//! ```

use std::time::Duration;

use reqwest::StatusCode;

use crate::SourceError;

/// Maximum number of attempts (initial request plus retries) for a
/// single logical request.
///
/// With exponential backoff (2s, 4s) the total wait before giving up is
/// 6 seconds on top of the per-request timeouts.
pub const MAX_ATTEMPTS: u32 = 3;

/// How a response status should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx/3xx: read the body.
    Ok,
    /// 429 or 5xx: retry after a backoff.
    Transient,
    /// Any other 4xx: the resource does not exist for us, never retried.
    Permanent,
}

/// Classifies a response status for the retry loop.
#[must_use]
pub fn classify_status(status: StatusCode) -> StatusClass {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StatusClass::Transient
    } else if status.is_client_error() {
        StatusClass::Permanent
    } else {
        StatusClass::Ok
    }
}

/// Unit the backoff doubles from.
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// Delay before retry number `retry` (1-based): 2s, 4s, 8s, ...
#[must_use]
pub fn backoff(retry: u32) -> Duration {
    scaled_backoff(BASE_DELAY, retry)
}

fn scaled_backoff(base: Duration, retry: u32) -> Duration {
    base * (1u32 << retry)
}

/// Sends an HTTP request and returns the response body as a `String`.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (since builders are consumed by
/// `.send()`).
///
/// A failure to read the body counts as a transient failure, so the whole
/// request is re-sent within the same attempt budget.
///
/// # Errors
///
/// * [`SourceError::NotFound`] on a 4xx status other than 429.
/// * [`SourceError::Unavailable`] once [`MAX_ATTEMPTS`] transient failures
///   have occurred.
/// * [`SourceError::Http`] for non-transient client errors (invalid URL,
///   redirect loop, ...).
pub async fn send_text<F>(build_request: F) -> Result<String, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    send_text_with(build_request, BASE_DELAY).await
}

/// [`send_text`] with backoff doubling from `base` instead of
/// [`BASE_DELAY`].
///
/// # Errors
///
/// See [`send_text`].
pub async fn send_text_with<F>(build_request: F, base: Duration) -> Result<String, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error = String::from("request failed");

    for attempt in 1..=MAX_ATTEMPTS {
        if attempt > 1 {
            let delay = scaled_backoff(base, attempt - 1);
            log::warn!("  retry {}/{} in {delay:?}...", attempt - 1, MAX_ATTEMPTS - 1);
            tokio::time::sleep(delay).await;
        }

        let response = match build_request().send().await {
            Ok(response) => response,
            Err(e) if is_transient(&e) => {
                log::warn!("  transient error: {e}");
                last_error = e.to_string();
                continue;
            }
            Err(e) => return Err(SourceError::Http(e)),
        };

        let url = response.url().to_string();
        let status = response.status();

        match classify_status(status) {
            StatusClass::Transient => {
                log::warn!("  HTTP {status} from {url}");
                last_error = format!("HTTP {status} from {url}");
                continue;
            }
            StatusClass::Permanent => {
                return Err(SourceError::NotFound {
                    url,
                    status: status.as_u16(),
                });
            }
            StatusClass::Ok => {}
        }

        match response.text().await {
            Ok(text) => return Ok(text),
            Err(e) => {
                log::warn!("  body read failed for {url}: {e}");
                last_error = format!("body read failed for {url}: {e}");
            }
        }
    }

    log::error!("Giving up after {MAX_ATTEMPTS} attempts: {last_error}");
    Err(SourceError::Unavailable {
        message: format!("{last_error} (after {MAX_ATTEMPTS} attempts)"),
    })
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    const FAST: Duration = Duration::from_millis(1);

    enum Reply {
        Status(&'static str),
        Silent,
    }

    /// Serves `reply` on a loopback port and counts connections.
    async fn serve(reply: Reply) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/2024-12-01.json", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            let reply = Arc::new(reply);
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let reply = Arc::clone(&reply);
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = socket.read(&mut buf).await;
                    match *reply {
                        Reply::Status(line) => {
                            let response = format!(
                                "HTTP/1.1 {line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                            );
                            let _ = socket.write_all(response.as_bytes()).await;
                            let _ = socket.shutdown().await;
                        }
                        Reply::Silent => tokio::time::sleep(Duration::from_secs(10)).await,
                    }
                });
            }
        });

        (url, hits)
    }

    fn client(timeout: Duration) -> reqwest::Client {
        reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn repeated_server_errors_give_up_after_max_attempts() {
        let (url, hits) = serve(Reply::Status("503 Service Unavailable")).await;
        let client = client(Duration::from_secs(5));

        let err = send_text_with(|| client.get(&url), FAST).await.unwrap_err();

        assert!(matches!(err, SourceError::Unavailable { .. }), "{err}");
        assert_eq!(hits.load(Ordering::SeqCst), MAX_ATTEMPTS as usize);
    }

    #[tokio::test]
    async fn missing_resource_is_requested_once() {
        let (url, hits) = serve(Reply::Status("404 Not Found")).await;
        let client = client(Duration::from_secs(5));

        let err = send_text_with(|| client.get(&url), FAST).await.unwrap_err();

        assert!(matches!(err, SourceError::NotFound { status: 404, .. }), "{err}");
        assert!(err.is_not_found());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeouts_are_retried() {
        let (url, hits) = serve(Reply::Silent).await;
        let client = client(Duration::from_millis(100));

        let err = send_text_with(|| client.get(&url), FAST).await.unwrap_err();

        assert!(matches!(err, SourceError::Unavailable { .. }), "{err}");
        assert_eq!(hits.load(Ordering::SeqCst), MAX_ATTEMPTS as usize);
    }

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            StatusClass::Transient
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE),
            StatusClass::Transient
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            StatusClass::Transient
        );
    }

    #[test]
    fn client_errors_are_permanent() {
        assert_eq!(classify_status(StatusCode::NOT_FOUND), StatusClass::Permanent);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), StatusClass::Permanent);
    }

    #[test]
    fn success_is_ok() {
        assert_eq!(classify_status(StatusCode::OK), StatusClass::Ok);
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_secs(2));
        assert_eq!(backoff(2), Duration::from_secs(4));
        assert_eq!(scaled_backoff(FAST, 2), Duration::from_millis(4));
    }
}
