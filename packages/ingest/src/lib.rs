#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Library for fetching one month of F-Droid metrics and storing it as a
//! local table.
//!
//! [`run_fetch`] drives a single invocation through its stages
//! (`RESOLVING → FETCHING → NORMALIZING → WRITING → DONE`) and returns a
//! [`RunSummary`]. The two binaries are thin wrappers over [`cli::run`].

pub mod cli;
pub mod config;
pub mod period;
pub mod store;

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;

use fdroid_metrics_ingest_models::{Availability, RunSummary, Stage};
use fdroid_metrics_models::{FetchStatus, MetricsSource, Period};
use fdroid_metrics_source::{MetricsClient, SourceError};

use crate::store::{StoreError, TableRow};

/// Errors that end a fetch invocation.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The positional arguments do not form a `[year] [month]` pair.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The year or month is malformed, out of range, or in the future.
    #[error("invalid period: {0}")]
    InvalidPeriod(String),

    /// The upstream could not be reached, or every mirror failed.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The upstream has no data for the requested period.
    #[error("not found: {0}")]
    NotFound(String),

    /// The local table could not be written or read.
    #[error("write error: {0}")]
    WriteError(#[from] StoreError),
}

impl From<SourceError> for FetchError {
    fn from(e: SourceError) -> Self {
        if e.is_not_found() {
            Self::NotFound(e.to_string())
        } else {
            Self::RemoteUnavailable(e.to_string())
        }
    }
}

/// Tracks and logs the stage of one invocation.
struct StageTracker {
    source: MetricsSource,
    period: Period,
    stage: Stage,
}

impl StageTracker {
    const fn new(source: MetricsSource, period: Period) -> Self {
        Self {
            source,
            period,
            stage: Stage::Resolving,
        }
    }

    fn advance(&mut self, next: Stage) {
        if self.stage.is_terminal() {
            log::warn!(
                "{} {}: already {}, not moving to {next}",
                self.source,
                self.period,
                self.stage
            );
            return;
        }
        log::debug!(
            "{} {}: {} -> {}",
            self.source,
            self.period,
            self.stage,
            next
        );
        self.stage = next;
    }

    fn fail(&mut self, error: FetchError) -> FetchError {
        log::debug!("{} {} failed during {}: {error}", self.source, self.period, self.stage);
        self.advance(Stage::Failed);
        error
    }
}

/// Fetches `period` with `client`, normalizes it into a canonical row
/// order, and writes the table under `data_dir`.
///
/// The client downloads and parses reports during [`Stage::Fetching`];
/// [`Stage::Normalizing`] puts the parsed rows into canonical order.
///
/// * `success` and `partial` results with rows are written; a partial run
///   ends in [`Stage::PartialDone`] and its summary lists the failed
///   mirrors.
/// * A partial result with no rows ends in [`Stage::PartialDone`] without
///   touching the store, so the month still shows as missing locally.
/// * `empty` results end in [`Stage::Done`] without touching the store.
/// * `failed` results and client errors write nothing.
///
/// # Errors
///
/// Returns [`FetchError::NotFound`] when the upstream has nothing for the
/// period, [`FetchError::RemoteUnavailable`] when it cannot be reached or
/// every mirror failed, and [`FetchError::WriteError`] when the table
/// cannot be written.
pub async fn run_fetch<C>(
    client: &C,
    period: Period,
    data_dir: &Path,
) -> Result<RunSummary, FetchError>
where
    C: MetricsClient,
    C::Record: TableRow,
{
    let start = Instant::now();
    let source = client.source();
    let mut stages = StageTracker::new(source, period);
    log::info!("Fetching {source} metrics for {period}");

    stages.advance(Stage::Fetching);
    let result = match client.fetch(period).await {
        Ok(result) => result,
        Err(e) => return Err(stages.fail(e.into())),
    };

    if result.status == FetchStatus::Failed {
        let failed = result
            .failed_mirrors()
            .map(|m| m.server.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(stages.fail(FetchError::RemoteUnavailable(format!(
            "all mirrors failed ({failed})"
        ))));
    }

    stages.advance(Stage::Normalizing);
    let mut records = result.records.unwrap_or_default();
    records.sort_unstable();

    let output = if result.status.is_writable() && !records.is_empty() {
        stages.advance(Stage::Writing);
        match store::write_table(data_dir, source, period, &records) {
            Ok(path) => Some(path),
            Err(e) => return Err(stages.fail(e.into())),
        }
    } else if result.status == FetchStatus::Partial {
        log::warn!("Succeeding mirrors had no rows for {source} {period}, nothing written");
        None
    } else {
        log::info!("No rows published for {source} {period}, nothing written");
        None
    };

    stages.advance(if result.status == FetchStatus::Partial {
        Stage::PartialDone
    } else {
        Stage::Done
    });

    Ok(RunSummary {
        source,
        period,
        status: result.status,
        stage: stages.stage,
        files: result.files,
        rows: records.len() as u64,
        skipped: result.skipped,
        output,
        mirrors: result.mirrors,
        duration: start.elapsed(),
    })
}

/// Compares the periods published upstream with the tables stored under
/// `data_dir`.
///
/// # Errors
///
/// Returns [`FetchError::WriteError`] if the data directory cannot be
/// listed, or a remote error if no upstream index can be fetched.
pub async fn availability<C: MetricsClient>(
    client: &C,
    data_dir: &Path,
) -> Result<Availability, FetchError> {
    let source = client.source();
    let local = store::local_periods(data_dir, source)?;
    let remote: BTreeSet<Period> = client
        .available_dates()
        .await?
        .into_iter()
        .map(Period::from_date)
        .collect();

    Ok(Availability {
        source,
        local,
        remote: remote.into_iter().collect(),
    })
}
