//! Client for the app-download access metrics published per HTTP mirror.
//!
//! Mirrors share no state, so each one is fetched independently and
//! concurrently. A mirror failure is recorded in its [`MirrorOutcome`] and
//! never aborts the other mirrors; the overall [`FetchStatus`] is derived
//! from the per-mirror outcomes once every mirror has finished.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use fdroid_metrics_models::{
    DownloadRecord, FetchResult, FetchStatus, MetricsSource, MirrorOutcome, Period,
};
use futures::stream::{self, StreamExt as _};

use crate::index::{dated_reports, parse_index, reports_for_period};
use crate::normalize::{self, Normalized};
use crate::progress::{ProgressCallback, null_progress};
use crate::source_def::SourceDefinition;
use crate::{MetricsClient, SourceError, Transport};

/// What one mirror produced for a period.
struct MirrorFetch {
    files: u64,
    table: Normalized<DownloadRecord>,
}

/// Fetches a month of daily access reports from every configured mirror.
pub struct AppsClient<T> {
    transport: T,
    definition: SourceDefinition,
    progress: Arc<dyn ProgressCallback>,
}

impl<T: Transport> AppsClient<T> {
    #[must_use]
    pub fn new(transport: T, definition: SourceDefinition) -> Self {
        Self {
            transport,
            definition,
            progress: null_progress(),
        }
    }

    /// Reports one unit of progress per finished mirror.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// The configured mirror host names.
    #[must_use]
    pub fn mirrors(&self) -> &[String] {
        &self.definition.hosts
    }

    async fn index(&self, server: &str) -> Result<Vec<String>, SourceError> {
        log::info!("Fetching index for {server}...");
        let files = parse_index(
            &self
                .transport
                .get_text(&self.definition.index_url(server))
                .await?,
        )?;
        log::info!("Found {} available files for {server}", files.len());
        Ok(files)
    }

    async fn fetch_mirror(&self, server: &str, period: Period) -> Result<MirrorFetch, SourceError> {
        let files = self.index(server).await?;
        let reports = reports_for_period(&files, &self.definition.ignored_files, period);

        if reports.is_empty() {
            log::info!("No files found for {server} in {period}");
        }

        let mut table = Normalized::default();
        for (date, file) in &reports {
            log::debug!("Downloading {server}/{file}...");
            let body = self
                .transport
                .get_text(&self.definition.report_url(server, file))
                .await?;
            table.merge(normalize::download_report(period, *date, server, &body));
        }

        Ok(MirrorFetch {
            files: reports.len() as u64,
            table,
        })
    }
}

#[async_trait]
impl<T: Transport> MetricsClient for AppsClient<T> {
    type Record = DownloadRecord;

    fn source(&self) -> MetricsSource {
        MetricsSource::Apps
    }

    async fn fetch(&self, period: Period) -> Result<FetchResult<DownloadRecord>, SourceError> {
        let mirrors = self.mirrors();
        let concurrency = mirrors.len().max(1);
        self.progress.set_total(mirrors.len() as u64);

        let mut results: Vec<(usize, String, Result<MirrorFetch, SourceError>)> =
            stream::iter(mirrors.iter().cloned().enumerate().map(|(i, server)| async move {
                let result = self.fetch_mirror(&server, period).await;
                self.progress.set_message(format!("{server} done"));
                self.progress.inc(1);
                (i, server, result)
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        // Report mirrors in configured order regardless of completion order.
        results.sort_by_key(|(i, _, _)| *i);

        let mut records = Vec::new();
        let mut outcomes = Vec::with_capacity(results.len());
        let mut files = 0;
        let mut skipped = 0;

        for (_, server, result) in results {
            match result {
                Ok(fetch) => {
                    log::info!(
                        "{server}: {} files, {} rows, {} skipped",
                        fetch.files,
                        fetch.table.records.len(),
                        fetch.table.skipped
                    );
                    files += fetch.files;
                    skipped += fetch.table.skipped;
                    outcomes.push(MirrorOutcome {
                        server,
                        files: fetch.files,
                        rows: fetch.table.records.len() as u64,
                        skipped: fetch.table.skipped,
                        error: None,
                    });
                    records.extend(fetch.table.records);
                }
                Err(e) => {
                    log::warn!("Failed to process {server}: {e}");
                    outcomes.push(MirrorOutcome {
                        server,
                        files: 0,
                        rows: 0,
                        skipped: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let succeeded = outcomes.iter().filter(|m| m.succeeded()).count();
        let status = FetchStatus::classify(succeeded, outcomes.len() - succeeded, records.len());
        self.progress
            .finish(format!("{succeeded}/{} mirrors fetched", outcomes.len()));

        Ok(FetchResult {
            period,
            status,
            records: (status != FetchStatus::Failed).then_some(records),
            files,
            skipped,
            mirrors: outcomes,
        })
    }

    async fn available_dates(&self) -> Result<Vec<NaiveDate>, SourceError> {
        let mut dates = BTreeSet::new();
        let mut last_error = None;

        for server in self.mirrors() {
            match self.index(server).await {
                Ok(files) => dates.extend(
                    dated_reports(&files, &self.definition.ignored_files)
                        .into_iter()
                        .map(|(date, _)| date),
                ),
                Err(e) => {
                    log::warn!("Failed to fetch index for {server}: {e}");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if dates.is_empty() => Err(e),
            _ => Ok(dates.into_iter().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::registry;
    use crate::testing::StubTransport;

    const BASE: &str = "https://stub.example/metrics";

    fn definition(mirrors: &[&str]) -> SourceDefinition {
        registry::with_overrides(
            registry::all_sources()
                .unwrap()
                .into_iter()
                .find(|s| s.id == MetricsSource::Apps)
                .unwrap(),
            Some(BASE.to_string()),
            Some(mirrors.join(",")),
        )
    }

    fn december() -> Period {
        Period::new(2024, 12).unwrap()
    }

    fn serve_mirror(transport: StubTransport, server: &str, hits: u64) -> StubTransport {
        transport
            .serve(
                &format!("{BASE}/{server}/index.json"),
                r#"["2024-12-01.json", "2025-01-01.json"]"#,
            )
            .serve(
                &format!("{BASE}/{server}/2024-12-01.json"),
                json!({
                    "paths": {
                        "/repo/index-v1.jar": hits,
                        "/repo/diff/1733011200000.json": 1
                    }
                })
                .to_string(),
            )
    }

    #[tokio::test]
    async fn merges_rows_from_every_mirror() {
        let mut transport = StubTransport::default();
        for server in ["m1.example", "m2.example"] {
            transport = serve_mirror(transport, server, 5);
        }

        let result = AppsClient::new(transport, definition(&["m1.example", "m2.example"]))
            .fetch(december())
            .await
            .unwrap();

        assert_eq!(result.status, FetchStatus::Success);
        assert_eq!(result.row_count(), 4);
        assert_eq!(result.files, 2);
        assert_eq!(result.mirrors.len(), 2);
        assert!(result.mirrors.iter().all(MirrorOutcome::succeeded));
    }

    #[tokio::test]
    async fn two_of_five_mirrors_down_is_partial() {
        let mirrors = ["m1.example", "m2.example", "m3.example", "m4.example", "m5.example"];
        let mut transport = StubTransport::default()
            .fail_host("m2.example")
            .fail_host("m4.example");
        for server in ["m1.example", "m3.example", "m5.example"] {
            transport = serve_mirror(transport, server, 7);
        }

        let result = AppsClient::new(transport, definition(&mirrors))
            .fetch(december())
            .await
            .unwrap();

        assert_eq!(result.status, FetchStatus::Partial);
        let servers: BTreeSet<&str> = result
            .records
            .as_ref()
            .unwrap()
            .iter()
            .map(|r| r.server.as_str())
            .collect();
        assert_eq!(
            servers,
            BTreeSet::from(["m1.example", "m3.example", "m5.example"])
        );

        let failed: Vec<&str> = result.failed_mirrors().map(|m| m.server.as_str()).collect();
        assert_eq!(failed, vec!["m2.example", "m4.example"]);
    }

    #[tokio::test]
    async fn all_mirrors_down_is_failed_without_records() {
        let transport = StubTransport::default()
            .fail_host("m1.example")
            .fail_host("m2.example");

        let result = AppsClient::new(transport, definition(&["m1.example", "m2.example"]))
            .fetch(december())
            .await
            .unwrap();

        assert_eq!(result.status, FetchStatus::Failed);
        assert!(result.records.is_none());
        assert_eq!(result.failed_mirrors().count(), 2);
    }

    #[tokio::test]
    async fn mirror_missing_its_index_counts_as_failed() {
        let transport = serve_mirror(StubTransport::default(), "m1.example", 3);

        let result = AppsClient::new(transport, definition(&["m1.example", "m2.example"]))
            .fetch(december())
            .await
            .unwrap();

        assert_eq!(result.status, FetchStatus::Partial);
        assert_eq!(result.row_count(), 2);
    }

    #[tokio::test]
    async fn mirrors_without_reports_for_period_are_empty() {
        let transport = StubTransport::default()
            .serve(&format!("{BASE}/m1.example/index.json"), r#"["2024-11-01.json"]"#);

        let result = AppsClient::new(transport, definition(&["m1.example"]))
            .fetch(december())
            .await
            .unwrap();

        assert_eq!(result.status, FetchStatus::Empty);
        assert_eq!(result.row_count(), 0);
    }

    #[tokio::test]
    async fn available_dates_union_every_reachable_mirror() {
        let transport = StubTransport::default()
            .serve(&format!("{BASE}/m1.example/index.json"), r#"["2024-12-01.json"]"#)
            .serve(
                &format!("{BASE}/m2.example/index.json"),
                r#"["2024-12-01.json", "2024-12-08.json"]"#,
            )
            .fail_host("m3.example");

        let dates = AppsClient::new(
            transport,
            definition(&["m1.example", "m2.example", "m3.example"]),
        )
        .available_dates()
        .await
        .unwrap();

        assert_eq!(dates.len(), 2);
    }
}
