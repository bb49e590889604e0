#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! F-Droid metrics source clients and normalization logic.
//!
//! Each metrics feed implements the [`MetricsClient`] trait to define how a
//! month of daily reports is fetched and normalized into the canonical row
//! schemas of [`fdroid_metrics_models`]. All HTTP access goes through the
//! [`Transport`] trait so clients can be driven by stub upstreams.

pub mod apps;
pub mod http;
pub mod index;
pub mod normalize;
pub mod progress;
pub mod registry;
pub mod retry;
pub mod search;
pub mod source_def;

use async_trait::async_trait;
use chrono::NaiveDate;
use fdroid_metrics_models::{FetchResult, MetricsSource, Period};

/// Errors that can occur during data source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed with a non-transient error.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Embedded source definition is malformed.
    #[error("source config error: {0}")]
    Config(#[from] toml::de::Error),

    /// No source definition is registered for this feed.
    #[error("no source definition for '{0}'")]
    UnknownSource(MetricsSource),

    /// The upstream answered with a permanent 4xx status.
    #[error("not found: {url} (HTTP {status})")]
    NotFound {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// The upstream index lists no reports for the requested period.
    #[error("no data published for {period}")]
    NoData {
        /// Requested period.
        period: Period,
    },

    /// Transient failures persisted past the retry budget.
    #[error("remote unavailable: {message}")]
    Unavailable {
        /// Description of the last failure.
        message: String,
    },
}

impl SourceError {
    /// Returns `true` for permanent "the upstream has nothing here" errors.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NoData { .. })
    }
}

/// Raw text retrieval over HTTP(S).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `url` and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotFound`] for 4xx responses and
    /// [`SourceError::Unavailable`] once transient failures exhaust the
    /// retry budget.
    async fn get_text(&self, url: &str) -> Result<String, SourceError>;
}

/// Trait that both metrics feeds implement.
#[async_trait]
pub trait MetricsClient: Send + Sync {
    /// Normalized row type produced by this feed.
    type Record: Send;

    /// Which feed this client fetches.
    fn source(&self) -> MetricsSource;

    /// Fetches and normalizes every daily report published for `period`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the feed cannot be fetched at all. The
    /// app-download client reports per-mirror failures inside the
    /// returned [`FetchResult`] instead.
    async fn fetch(&self, period: Period) -> Result<FetchResult<Self::Record>, SourceError>;

    /// Lists every report date the upstream currently publishes.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if no index could be fetched.
    async fn available_dates(&self) -> Result<Vec<NaiveDate>, SourceError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory upstream used by client tests.

    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::{SourceError, Transport};

    /// Serves canned bodies by URL. Unknown URLs answer 404; URLs under a
    /// host registered with [`StubTransport::fail_host`] are unavailable.
    #[derive(Default)]
    pub struct StubTransport {
        pub bodies: BTreeMap<String, String>,
        pub down_hosts: Vec<String>,
        pub requests: Mutex<Vec<String>>,
    }

    impl StubTransport {
        pub fn serve(mut self, url: &str, body: impl Into<String>) -> Self {
            self.bodies.insert(url.to_string(), body.into());
            self
        }

        pub fn fail_host(mut self, host: &str) -> Self {
            self.down_hosts.push(host.to_string());
            self
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn get_text(&self, url: &str) -> Result<String, SourceError> {
            self.requests.lock().unwrap().push(url.to_string());
            if self.down_hosts.iter().any(|h| url.contains(&format!("/{h}/"))) {
                return Err(SourceError::Unavailable {
                    message: format!("connection refused: {url}"),
                });
            }
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| SourceError::NotFound {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }
}
