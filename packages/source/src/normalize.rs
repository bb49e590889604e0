//! Normalization of daily metrics reports into table rows.
//!
//! A daily report is a JSON object with optional `queries`, `paths` and
//! `errors` sections. Every entry of a section is parsed on its own into a
//! [`Parsed`] value: either the rows it yields or the reason it was
//! dropped. The normalizer folds those into a [`Normalized`] table and a
//! skip tally, so one bad entry never aborts a report.

use std::sync::LazyLock;

use chrono::NaiveDate;
use fdroid_metrics_models::{
    DownloadRecord, OUTCOME_ALL, OUTCOME_OK, PathCategory, Period, RowKind, SearchRecord,
};
use regex::Regex;
use serde_json::{Map, Value};

/// Repository index file names (`index.xml`, `index-v1.json`,
/// `index-v2.json`, `entry.json`).
static REPO_INDEX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|/)(?:index(?:-v\d+)?\.(?:xml|json)|entry\.json)$").expect("valid regex")
});

/// `/repo/<package>_<version>.apk`
static APK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/repo/([^/]+)_(\d+)\.apk$").expect("valid regex"));

/// Why an entry (or a whole report) was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    /// The report body is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    /// The report body is JSON but not an object.
    #[error("report is not a JSON object")]
    NotAnObject,
    /// The report is dated outside the requested period.
    #[error("report dated {0} is outside the requested period")]
    OutsidePeriod(NaiveDate),
    /// A whole section has the wrong shape.
    #[error("section '{0}' is not an object")]
    MalformedSection(&'static str),
    /// One entry has no usable hit count.
    #[error("malformed entry '{key}' in section '{section}'")]
    MalformedEntry {
        /// Section the entry belongs to.
        section: &'static str,
        /// Entry key.
        key: String,
    },
}

/// Result of parsing one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<R> {
    /// The rows the entry expands to.
    Rows(Vec<R>),
    /// The entry was dropped.
    Skipped(SkipReason),
}

/// Rows accumulated from one or more reports plus the number of dropped
/// entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized<R> {
    pub records: Vec<R>,
    pub skipped: u64,
}

impl<R> Default for Normalized<R> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
        }
    }
}

impl<R> Normalized<R> {
    /// Folds one parsed entry into the table.
    pub fn push(&mut self, parsed: Parsed<R>) {
        match parsed {
            Parsed::Rows(rows) => self.records.extend(rows),
            Parsed::Skipped(reason) => {
                log::debug!("skipped: {reason}");
                self.skipped += 1;
            }
        }
    }

    /// Appends another table's rows and skip tally.
    pub fn merge(&mut self, other: Self) {
        self.records.extend(other.records);
        self.skipped += other.skipped;
    }

    /// Converts every row, keeping the skip tally.
    pub fn map<T>(self, f: impl FnMut(R) -> T) -> Normalized<T> {
        Normalized {
            records: self.records.into_iter().map(f).collect(),
            skipped: self.skipped,
        }
    }
}

impl<R> Extend<Parsed<R>> for Normalized<R> {
    fn extend<I: IntoIterator<Item = Parsed<R>>>(&mut self, iter: I) {
        for parsed in iter {
            self.push(parsed);
        }
    }
}

/// Classifies a requested mirror path.
///
/// Query strings are ignored. `.jar` wins over the index naming check, so
/// `index-v1.jar` is a JAR request.
#[must_use]
pub fn classify_path(path: &str) -> PathCategory {
    let path = strip_query(path);
    if path.ends_with(".jar") {
        PathCategory::Jar
    } else if path.contains("/diff/") || REPO_INDEX_RE.is_match(path) {
        PathCategory::RepositoryDiff
    } else {
        PathCategory::Other
    }
}

/// Splits an APK path into `(package_id, version)`.
#[must_use]
pub fn apk_package(path: &str) -> Option<(String, String)> {
    let caps = APK_RE.captures(strip_query(path))?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Drops `?query` and `&param` suffixes. The mirror logs contain paths such
/// as `/repo/app_1.apk&pxdate=2025-08-05`.
fn strip_query(path: &str) -> &str {
    path.split(['?', '&']).next().unwrap_or(path)
}

/// One counted figure of a daily report, before it is shaped into a row.
struct Figure {
    kind: RowKind,
    key: String,
    country: String,
    outcome: String,
    hits: u64,
}

impl Figure {
    fn new(kind: RowKind, key: &str, country: String, outcome: &str, hits: u64) -> Self {
        Self {
            kind,
            key: key.to_string(),
            country,
            outcome: outcome.to_string(),
            hits,
        }
    }
}

/// Normalizes one daily search report.
#[must_use]
pub fn search_report(period: Period, date: NaiveDate, body: &str) -> Normalized<SearchRecord> {
    report_figures(
        period,
        date,
        body,
        &[("queries", RowKind::Query), ("paths", RowKind::Path)],
    )
    .map(|figure| SearchRecord {
        date,
        kind: figure.kind,
        query: figure.key,
        country: figure.country,
        outcome: figure.outcome,
        hits: figure.hits,
    })
}

/// Normalizes one daily access report from mirror `server`.
#[must_use]
pub fn download_report(
    period: Period,
    date: NaiveDate,
    server: &str,
    body: &str,
) -> Normalized<DownloadRecord> {
    report_figures(
        period,
        date,
        body,
        &[("paths", RowKind::Path), ("queries", RowKind::Query)],
    )
    .map(|figure| download_row(date, server, figure))
}

fn download_row(date: NaiveDate, server: &str, figure: Figure) -> DownloadRecord {
    let is_path = matches!(figure.kind, RowKind::Path | RowKind::Error);
    let (package_id, version) = if is_path {
        apk_package(&figure.key).unzip()
    } else {
        (None, None)
    };
    let category = if is_path {
        classify_path(&figure.key)
    } else {
        PathCategory::Other
    };

    DownloadRecord {
        date,
        server: server.to_string(),
        kind: figure.kind,
        path: figure.key,
        category,
        package_id,
        version,
        country: figure.country,
        outcome: figure.outcome,
        hits: figure.hits,
    }
}

/// Every figure of one report: the report-level totals, the counted
/// `sections` in order, and the `errors` section.
fn report_figures(
    period: Period,
    date: NaiveDate,
    body: &str,
    sections: &[(&'static str, RowKind)],
) -> Normalized<Figure> {
    let mut out = Normalized::default();
    let report = match parse_report(body, period, date) {
        Ok(report) => report,
        Err(reason) => {
            out.push(Parsed::Skipped(reason));
            return out;
        }
    };

    out.extend(report_totals(&report));

    for &(name, kind) in sections {
        match section(&report, name) {
            Ok(Some(entries)) => out.extend(counted_entries(name, kind, entries)),
            Ok(None) => {}
            Err(reason) => out.push(Parsed::Skipped(reason)),
        }
    }

    match section(&report, "errors") {
        Ok(Some(errors)) => out.extend(error_entries(errors)),
        Ok(None) => {}
        Err(reason) => out.push(Parsed::Skipped(reason)),
    }

    out
}

fn parse_report(
    body: &str,
    period: Period,
    date: NaiveDate,
) -> Result<Map<String, Value>, SkipReason> {
    if !period.contains(date) {
        return Err(SkipReason::OutsidePeriod(date));
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(report)) => Ok(report),
        Ok(_) => Err(SkipReason::NotAnObject),
        Err(e) => Err(SkipReason::InvalidJson(e.to_string())),
    }
}

fn section<'a>(
    report: &'a Map<String, Value>,
    name: &'static str,
) -> Result<Option<&'a Map<String, Value>>, SkipReason> {
    match report.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(entries)) => Ok(Some(entries)),
        Some(_) => Err(SkipReason::MalformedSection(name)),
    }
}

fn malformed<R>(section: &'static str, key: String) -> Parsed<R> {
    Parsed::Skipped(SkipReason::MalformedEntry { section, key })
}

/// A hit count, optionally broken down by country.
struct Hits {
    total: u64,
    per_country: Vec<(String, u64)>,
}

impl Hits {
    /// Accepts either a bare count or `{"hits": n, "hitsPerCountry": {..}}`.
    fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self {
                total: n.as_u64()?,
                per_country: Vec::new(),
            }),
            Value::Object(entry) => Self::from_entry(entry),
            _ => None,
        }
    }

    fn from_entry(entry: &Map<String, Value>) -> Option<Self> {
        let total = entry.get("hits")?.as_u64()?;
        let per_country = match entry.get("hitsPerCountry") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(countries)) => countries
                .iter()
                .map(|(code, n)| n.as_u64().map(|n| (code.clone(), n)))
                .collect::<Option<Vec<_>>>()?,
            Some(_) => return None,
        };
        Some(Self { total, per_country })
    }

    /// One `(country, hits)` pair per country, plus an empty-country pair
    /// for the hits the breakdown leaves unattributed. Without a breakdown
    /// that is a single pair holding the whole total.
    fn into_rows(self) -> Vec<(String, u64)> {
        let attributed = self
            .per_country
            .iter()
            .fold(0u64, |sum, (_, n)| sum.saturating_add(*n));
        let rest = self.total.saturating_sub(attributed);

        let mut rows = self.per_country;
        if rows.is_empty() || rest > 0 {
            rows.push((String::new(), rest));
        }
        rows
    }
}

/// Report-level `hits`/`hitsPerCountry` as [`RowKind::Total`] figures and
/// `hitsPerLanguage` as [`RowKind::Language`] figures.
fn report_totals(report: &Map<String, Value>) -> Vec<Parsed<Figure>> {
    let mut parsed = Vec::new();

    if report.contains_key("hits") || report.contains_key("hitsPerCountry") {
        parsed.push(Hits::from_entry(report).map_or_else(
            || malformed("hits", String::new()),
            |hits| {
                Parsed::Rows(
                    hits.into_rows()
                        .into_iter()
                        .map(|(country, n)| {
                            Figure::new(RowKind::Total, "", country, OUTCOME_ALL, n)
                        })
                        .collect(),
                )
            },
        ));
    }

    match section(report, "hitsPerLanguage") {
        Ok(Some(languages)) => parsed.extend(languages.iter().map(|(language, n)| {
            n.as_u64().map_or_else(
                || malformed("hitsPerLanguage", language.clone()),
                |n| {
                    Parsed::Rows(vec![Figure::new(
                        RowKind::Language,
                        language,
                        String::new(),
                        OUTCOME_ALL,
                        n,
                    )])
                },
            )
        })),
        Ok(None) => {}
        Err(reason) => parsed.push(Parsed::Skipped(reason)),
    }

    parsed
}

fn counted_entries(
    section: &'static str,
    kind: RowKind,
    entries: &Map<String, Value>,
) -> Vec<Parsed<Figure>> {
    entries
        .iter()
        .map(|(key, value)| {
            Hits::parse(value).map_or_else(
                || malformed(section, key.clone()),
                |hits| {
                    Parsed::Rows(
                        hits.into_rows()
                            .into_iter()
                            .map(|(country, n)| Figure::new(kind, key, country, OUTCOME_OK, n))
                            .collect(),
                    )
                },
            )
        })
        .collect()
}

/// Expands `{"<code>": {"hits": n, "paths": {"<path>": n}}}` into one row
/// per path plus a path-less row for the hits no path accounts for, or a
/// single path-less row when the code has no path breakdown.
fn error_entries(errors: &Map<String, Value>) -> Vec<Parsed<Figure>> {
    let error = |code: &str, path: &str, n| {
        Parsed::Rows(vec![Figure::new(RowKind::Error, path, String::new(), code, n)])
    };
    let mut parsed = Vec::new();

    for (code, value) in errors {
        let Value::Object(entry) = value else {
            parsed.push(malformed("errors", code.clone()));
            continue;
        };

        let total = match entry.get("hits") {
            None | Some(Value::Null) => None,
            Some(hits) => {
                let Some(n) = hits.as_u64() else {
                    parsed.push(malformed("errors", code.clone()));
                    continue;
                };
                Some(n)
            }
        };

        match entry.get("paths") {
            Some(Value::Object(paths)) if !paths.is_empty() => {
                let mut attributed = 0u64;
                for (path, n) in paths {
                    match n.as_u64() {
                        Some(n) => {
                            attributed = attributed.saturating_add(n);
                            parsed.push(error(code, path, n));
                        }
                        None => parsed.push(malformed("errors", format!("{code} {path}"))),
                    }
                }
                if let Some(rest) = total
                    .map(|t| t.saturating_sub(attributed))
                    .filter(|rest| *rest > 0)
                {
                    parsed.push(error(code, "", rest));
                }
            }
            None | Some(Value::Null | Value::Object(_)) => parsed.push(
                total.map_or_else(|| malformed("errors", code.clone()), |n| error(code, "", n)),
            ),
            Some(_) => parsed.push(malformed("errors", code.clone())),
        }
    }

    parsed
}
