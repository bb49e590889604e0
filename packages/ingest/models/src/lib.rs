#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fetch configuration, pipeline stage, and run summary types.

use std::path::PathBuf;
use std::time::Duration;

use fdroid_metrics_models::{FetchStatus, MetricsSource, MirrorOutcome, Period};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Directory tables are written to when nothing else is configured.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Per-request timeout when nothing else is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for one fetch invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Directory where normalized tables are written.
    pub data_dir: PathBuf,
    /// Timeout applied to every HTTP request.
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Stages of one fetch invocation.
///
/// `Resolving → Fetching → Normalizing → Writing → Done`, ending in
/// `PartialDone` instead of `Done` when some mirrors failed, or in
/// `Failed` from any of the middle stages. Reports are parsed while
/// `Fetching`; `Normalizing` only orders the parsed rows. A terminal stage
/// is never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Resolving,
    Fetching,
    Normalizing,
    Writing,
    Done,
    PartialDone,
    Failed,
}

impl Stage {
    /// Whether the invocation has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::PartialDone | Self::Failed)
    }
}

/// Result of a completed fetch invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Feed that was fetched.
    pub source: MetricsSource,
    /// Month that was fetched.
    pub period: Period,
    /// Overall fetch status.
    pub status: FetchStatus,
    /// Terminal stage reached.
    pub stage: Stage,
    /// Daily reports fetched.
    pub files: u64,
    /// Rows in the written table.
    pub rows: u64,
    /// Entries dropped during normalization.
    pub skipped: u64,
    /// Path of the written table, if one was written.
    pub output: Option<PathBuf>,
    /// Per-mirror outcomes (app-download feed only).
    pub mirrors: Vec<MirrorOutcome>,
    /// How long the invocation took.
    pub duration: Duration,
}

/// Periods stored locally versus published upstream for one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub source: MetricsSource,
    /// Periods with a table on disk.
    pub local: Vec<Period>,
    /// Periods with at least one published daily report.
    pub remote: Vec<Period>,
}

impl Availability {
    /// Periods published upstream that have no local table, oldest first.
    #[must_use]
    pub fn missing(&self) -> Vec<Period> {
        self.remote
            .iter()
            .filter(|p| !self.local.contains(p))
            .copied()
            .collect()
    }
}
