#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Period, normalized record, and fetch result types for F-Droid metrics.
//!
//! Both metrics sources (search queries and app-download mirrors) produce
//! records in the fixed row schemas defined here. The dashboard reads the
//! persisted tables back into the same types.

use std::fmt;

use chrono::{Datelike as _, NaiveDate};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Outcome recorded for rows taken from the successful-request sections of
/// a daily report. Error rows carry the upstream HTTP status code instead.
pub const OUTCOME_OK: &str = "ok";

/// Outcome recorded for report-level figures, which count every request
/// regardless of its status.
pub const OUTCOME_ALL: &str = "all";

/// One fetch unit: a calendar month.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    /// Creates a period, returning `None` when `month` is outside `1..=12`.
    #[must_use]
    pub const fn new(year: i32, month: u32) -> Option<Self> {
        if month >= 1 && month <= 12 {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// The period containing `date`.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }

    /// Returns `true` if `date` falls within this month.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// The upstream metrics feeds this tool knows how to fetch.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MetricsSource {
    /// Query metrics from `search.f-droid.org`.
    Search,
    /// Access metrics from the F-Droid HTTP mirrors.
    Apps,
}

/// Classification of a requested path on a download mirror.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PathCategory {
    /// A signed JAR file (index JARs, `entry.jar`, ...).
    Jar,
    /// A repository index or index diff.
    RepositoryDiff,
    /// Anything else (APKs, icons, the web root, ...).
    Other,
}

/// Which figure of a daily report a row carries.
///
/// Rows of the same kind and key sum to the upstream total for that key:
/// an entry with a partial country breakdown gets an extra row with an
/// empty country holding the remainder.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RowKind {
    /// Report-level hit count, optionally per country. The key is empty.
    Total,
    /// Report-level hit count for one language. The key is the language.
    Language,
    /// One entry of the `queries` section.
    Query,
    /// One entry of the `paths` section.
    Path,
    /// One path (or the remainder) of an `errors` code.
    Error,
}

/// One row of the search table.
///
/// Field order defines the canonical sort order used when writing tables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SearchRecord {
    /// Day of the daily report this row came from.
    pub date: NaiveDate,
    pub kind: RowKind,
    /// Raw query text, the request path for path and error rows, or the
    /// language for language rows.
    pub query: String,
    /// Country/region code. Empty when the upstream has no breakdown.
    pub country: String,
    /// [`OUTCOME_OK`] or the upstream HTTP error code.
    pub outcome: String,
    /// Upstream hit count.
    pub hits: u64,
}

/// One row of the app-download table.
///
/// `hits` is the raw upstream hit count. Whether a hit equals a completed
/// download is not knowable from the upstream data, so it is kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub date: NaiveDate,
    /// Mirror host name.
    pub server: String,
    pub kind: RowKind,
    /// Requested path, the query string for query rows, or the language
    /// for language rows.
    pub path: String,
    /// Meaningful for path and error rows; `other` for the rest.
    pub category: PathCategory,
    /// Package ID for `/repo/<package>_<version>.apk` paths.
    pub package_id: Option<String>,
    /// Version code for `/repo/<package>_<version>.apk` paths.
    pub version: Option<String>,
    pub country: String,
    pub outcome: String,
    pub hits: u64,
}

/// Overall outcome of fetching one source for one period.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FetchStatus {
    /// Every sub-source succeeded and produced rows.
    Success,
    /// At least one mirror failed and at least one succeeded.
    Partial,
    /// Every sub-source succeeded but no rows were produced.
    Empty,
    /// Nothing succeeded.
    Failed,
}

impl FetchStatus {
    /// Classifies a fan-out fetch by counting succeeded and failed
    /// sub-sources and the rows the successes produced.
    #[must_use]
    pub const fn classify(succeeded: usize, failed: usize, rows: usize) -> Self {
        if succeeded == 0 {
            Self::Failed
        } else if failed > 0 {
            Self::Partial
        } else if rows == 0 {
            Self::Empty
        } else {
            Self::Success
        }
    }

    /// Whether the result should be handed to the store writer.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::Success | Self::Partial)
    }
}

/// Per-mirror outcome of an app-download fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorOutcome {
    /// Mirror host name.
    pub server: String,
    /// Number of daily reports fetched.
    pub files: u64,
    /// Number of rows normalized from this mirror.
    pub rows: u64,
    /// Number of entries dropped during normalization.
    pub skipped: u64,
    /// Error message when the mirror failed.
    pub error: Option<String>,
}

impl MirrorOutcome {
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of fetching and normalizing one source for one period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult<R> {
    pub period: Period,
    pub status: FetchStatus,
    /// Normalized rows. `None` when the fetch failed.
    pub records: Option<Vec<R>>,
    /// Daily reports fetched across all sub-sources.
    pub files: u64,
    /// Entries dropped during normalization.
    pub skipped: u64,
    /// Per-mirror outcomes. Empty for the search source.
    pub mirrors: Vec<MirrorOutcome>,
}

impl<R> FetchResult<R> {
    /// Number of normalized rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.records.as_ref().map_or(0, Vec::len)
    }

    /// Mirrors that failed.
    pub fn failed_mirrors(&self) -> impl Iterator<Item = &MirrorOutcome> {
        self.mirrors.iter().filter(|m| !m.succeeded())
    }
}
