//! Local storage of normalized tables.
//!
//! Each (source, period) pair maps to one CSV file,
//! `<dir>/<source>-<YYYY>-<MM>.csv`, so readers can discover tables by
//! period without an index. Writes are atomic: rows go to a `.tmp` file
//! which is renamed over the final path only once fully written.

use std::fs;
use std::path::{Path, PathBuf};

use fdroid_metrics_models::{DownloadRecord, MetricsSource, Period, SearchRecord};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Errors that can occur while reading or writing tables.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem error.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path that was being accessed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// CSV encoding or decoding error.
    #[error("CSV error on {path}: {source}")]
    Csv {
        /// Path that was being accessed.
        path: String,
        /// Underlying error.
        source: csv::Error,
    },
}

/// A row type with a fixed column layout.
pub trait TableRow: Serialize + DeserializeOwned + Ord {
    /// Column names, in field order.
    const HEADER: &'static [&'static str];
}

impl TableRow for SearchRecord {
    const HEADER: &'static [&'static str] =
        &["date", "kind", "query", "country", "outcome", "hits"];
}

impl TableRow for DownloadRecord {
    const HEADER: &'static [&'static str] = &[
        "date",
        "server",
        "kind",
        "path",
        "category",
        "package_id",
        "version",
        "country",
        "outcome",
        "hits",
    ];
}

/// File name of the table for `source` and `period`.
#[must_use]
pub fn table_file_name(source: MetricsSource, period: Period) -> String {
    format!("{source}-{period}.csv")
}

/// Full path of the table for `source` and `period` under `dir`.
#[must_use]
pub fn table_path(dir: &Path, source: MetricsSource, period: Period) -> PathBuf {
    dir.join(table_file_name(source, period))
}

/// Inverse of [`table_file_name`].
#[must_use]
pub fn parse_table_file_name(name: &str) -> Option<(MetricsSource, Period)> {
    let stem = name.strip_suffix(".csv")?;
    let mut parts = stem.rsplitn(3, '-');
    let month = parts.next()?;
    let year = parts.next()?;
    let source = parts.next()?.parse().ok()?;
    if year.len() != 4 || month.len() != 2 {
        return None;
    }
    let period = Period::new(year.parse().ok()?, month.parse().ok()?)?;
    Some((source, period))
}

/// Writes `records` as the table for `source` and `period`, replacing any
/// previous table for the same key. Returns the written path.
///
/// Rows are written in the order given; callers sort them first so that
/// identical data produces identical files.
///
/// # Errors
///
/// Returns [`StoreError`] if the directory cannot be created or the file
/// cannot be written. No partial file is left behind.
pub fn write_table<R: TableRow>(
    dir: &Path,
    source: MetricsSource,
    period: Period,
    records: &[R],
) -> Result<PathBuf, StoreError> {
    fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;

    let path = table_path(dir, source, period);
    let tmp_path = path.with_extension("csv.tmp");

    if let Err(e) = write_csv(&tmp_path, records) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    // Atomic rename
    if let Err(e) = fs::rename(&tmp_path, &path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(io_error(&path, e));
    }

    log::info!("Wrote {} rows to {}", records.len(), path.display());
    Ok(path)
}

fn write_csv<R: TableRow>(path: &Path, records: &[R]) -> Result<(), StoreError> {
    let csv_error = |source| StoreError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_error)?;

    writer.write_record(R::HEADER).map_err(csv_error)?;
    for record in records {
        writer.serialize(record).map_err(csv_error)?;
    }
    writer.flush().map_err(|e| io_error(path, e))
}

/// Reads the table for `source` and `period`, or `None` if no table has
/// been written for it.
///
/// # Errors
///
/// Returns [`StoreError`] if the file exists but cannot be read or does
/// not match the row schema.
pub fn read_table<R: TableRow>(
    dir: &Path,
    source: MetricsSource,
    period: Period,
) -> Result<Option<Vec<R>>, StoreError> {
    let path = table_path(dir, source, period);
    if !path.exists() {
        return Ok(None);
    }

    let csv_error = |source| StoreError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut reader = csv::Reader::from_path(&path).map_err(csv_error)?;
    let records = reader
        .deserialize()
        .collect::<Result<Vec<R>, _>>()
        .map_err(csv_error)?;
    Ok(Some(records))
}

/// Reads the search table for `period`.
///
/// # Errors
///
/// See [`read_table`].
pub fn read_search_table(
    dir: &Path,
    period: Period,
) -> Result<Option<Vec<SearchRecord>>, StoreError> {
    read_table(dir, MetricsSource::Search, period)
}

/// Reads the app-download table for `period`.
///
/// # Errors
///
/// See [`read_table`].
pub fn read_download_table(
    dir: &Path,
    period: Period,
) -> Result<Option<Vec<DownloadRecord>>, StoreError> {
    read_table(dir, MetricsSource::Apps, period)
}

/// Periods with a stored table for `source`, oldest first. A missing
/// directory has no tables.
///
/// # Errors
///
/// Returns [`StoreError::Io`] if the directory exists but cannot be read.
pub fn local_periods(dir: &Path, source: MetricsSource) -> Result<Vec<Period>, StoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut periods: Vec<Period> = fs::read_dir(dir)
        .map_err(|e| io_error(dir, e))?
        .filter_map(Result::ok)
        .filter_map(|entry| parse_table_file_name(&entry.file_name().to_string_lossy()))
        .filter(|(s, _)| *s == source)
        .map(|(_, period)| period)
        .collect();
    periods.sort_unstable();
    Ok(periods)
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}
