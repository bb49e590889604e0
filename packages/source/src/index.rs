//! Parsing and filtering of upstream `index.json` listings.
//!
//! An index is a JSON array of file names. Daily reports are named
//! `YYYY-MM-DD.json`; anything else is ignored.

use chrono::NaiveDate;
use fdroid_metrics_models::Period;

use crate::SourceError;

/// Parses an index body into its list of file names.
///
/// # Errors
///
/// Returns [`SourceError::Json`] if the body is not a JSON array of strings.
pub fn parse_index(body: &str) -> Result<Vec<String>, SourceError> {
    Ok(serde_json::from_str(body)?)
}

/// Extracts the report date from a `YYYY-MM-DD.json` file name.
#[must_use]
pub fn report_date(file: &str) -> Option<NaiveDate> {
    let stem = file.strip_suffix(".json")?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

/// Returns every daily report in `files`, sorted by date.
#[must_use]
pub fn dated_reports(files: &[String], ignored: &[String]) -> Vec<(NaiveDate, String)> {
    let mut reports: Vec<(NaiveDate, String)> = files
        .iter()
        .filter(|f| !ignored.contains(f))
        .filter_map(|f| report_date(f).map(|d| (d, f.clone())))
        .collect();
    reports.sort();
    reports.dedup();
    reports
}

/// Returns the daily reports in `files` that fall within `period`.
#[must_use]
pub fn reports_for_period(
    files: &[String],
    ignored: &[String],
    period: Period,
) -> Vec<(NaiveDate, String)> {
    dated_reports(files, ignored)
        .into_iter()
        .filter(|(date, _)| period.contains(*date))
        .collect()
}
