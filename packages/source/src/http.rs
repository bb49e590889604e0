//! `reqwest`-backed [`Transport`].

use std::time::Duration;

use async_trait::async_trait;

use crate::{SourceError, Transport, retry};

const USER_AGENT: &str = concat!("fdroid-metrics/", env!("CARGO_PKG_VERSION"));

/// HTTP(S) transport with a per-request timeout and bounded retries.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport whose every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the TLS backend fails to initialize.
    pub fn new(timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        log::debug!("GET {url}");
        retry::send_text(|| self.client.get(url)).await
    }
}
