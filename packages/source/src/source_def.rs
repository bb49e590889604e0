//! Config-driven metrics source definition.
//!
//! [`SourceDefinition`] captures the URL conventions of one metrics feed:
//! the base URL, the hosts published below it (one for search, one per
//! mirror for app downloads), and the index file name.

use fdroid_metrics_models::MetricsSource;
use serde::Deserialize;

fn default_index_file() -> String {
    "index.json".to_string()
}

/// A metrics feed, loaded from an embedded TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceDefinition {
    /// Which feed this is.
    pub id: MetricsSource,
    /// Human-readable name.
    pub name: String,
    /// Root URL the host directories live under.
    pub base_url: String,
    /// Host directories below `base_url`. For the app-download feed each
    /// entry is one mirror.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// File listing the published daily reports for a host.
    #[serde(default = "default_index_file")]
    pub index_file: String,
    /// Index entries that are not daily reports.
    #[serde(default)]
    pub ignored_files: Vec<String>,
}

impl SourceDefinition {
    /// URL of the index for `host`.
    #[must_use]
    pub fn index_url(&self, host: &str) -> String {
        self.report_url(host, &self.index_file)
    }

    /// URL of one published file for `host`.
    #[must_use]
    pub fn report_url(&self, host: &str, file: &str) -> String {
        format!("{}/{host}/{file}", self.base_url.trim_end_matches('/'))
    }

    /// Replaces the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        base_url.clone_into(&mut self.base_url);
        self
    }

    /// Replaces the host list.
    #[must_use]
    pub fn with_hosts(mut self, hosts: Vec<String>) -> Self {
        self.hosts = hosts;
        self
    }
}

/// Parses a TOML string into a [`SourceDefinition`].
///
/// # Errors
///
/// Returns an error if the TOML is malformed or doesn't match the schema.
pub fn parse_source_toml(toml_str: &str) -> Result<SourceDefinition, toml::de::Error> {
    toml::de::from_str(toml_str)
}
