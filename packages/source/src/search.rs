//! Client for the `search.f-droid.org` query metrics.

use async_trait::async_trait;
use chrono::NaiveDate;
use fdroid_metrics_models::{FetchResult, FetchStatus, MetricsSource, Period, SearchRecord};

use crate::index::{dated_reports, parse_index, reports_for_period};
use crate::normalize::{self, Normalized};
use crate::source_def::SourceDefinition;
use crate::{MetricsClient, SourceError, Transport};

/// Fetches a month of daily search reports.
///
/// Any report that cannot be fetched fails the whole fetch: a search table
/// with silently missing days would look complete to the dashboard.
pub struct SearchClient<T> {
    transport: T,
    definition: SourceDefinition,
}

impl<T: Transport> SearchClient<T> {
    #[must_use]
    pub const fn new(transport: T, definition: SourceDefinition) -> Self {
        Self {
            transport,
            definition,
        }
    }

    fn host(&self) -> Result<&str, SourceError> {
        self.definition
            .hosts
            .first()
            .map(String::as_str)
            .ok_or(SourceError::UnknownSource(MetricsSource::Search))
    }

    async fn index(&self, host: &str) -> Result<Vec<String>, SourceError> {
        log::info!("Fetching search index...");
        let files = parse_index(
            &self
                .transport
                .get_text(&self.definition.index_url(host))
                .await?,
        )?;
        log::info!("Found {} available files", files.len());
        Ok(files)
    }
}

#[async_trait]
impl<T: Transport> MetricsClient for SearchClient<T> {
    type Record = SearchRecord;

    fn source(&self) -> MetricsSource {
        MetricsSource::Search
    }

    async fn fetch(&self, period: Period) -> Result<FetchResult<SearchRecord>, SourceError> {
        let host = self.host()?;
        let files = self.index(host).await?;

        let reports = reports_for_period(&files, &self.definition.ignored_files, period);
        if reports.is_empty() {
            log::info!("No files found for {period}");
            return Err(SourceError::NoData { period });
        }
        log::info!("Found {} files for {period}", reports.len());

        let mut table = Normalized::default();
        for (date, file) in &reports {
            log::info!("Downloading {file}...");
            let body = self
                .transport
                .get_text(&self.definition.report_url(host, file))
                .await?;
            let day = normalize::search_report(period, *date, &body);
            log::debug!(
                "{file}: {} rows, {} skipped",
                day.records.len(),
                day.skipped
            );
            table.merge(day);
        }

        let status = FetchStatus::classify(1, 0, table.records.len());
        Ok(FetchResult {
            period,
            status,
            records: Some(table.records),
            files: reports.len() as u64,
            skipped: table.skipped,
            mirrors: Vec::new(),
        })
    }

    async fn available_dates(&self) -> Result<Vec<NaiveDate>, SourceError> {
        let files = self.index(self.host()?).await?;
        Ok(dated_reports(&files, &self.definition.ignored_files)
            .into_iter()
            .map(|(date, _)| date)
            .collect())
    }
}
