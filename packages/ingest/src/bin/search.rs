#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fetches one month of `search.f-droid.org` query metrics.

use fdroid_metrics_models::MetricsSource;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fdroid_metrics_ingest::cli::run(MetricsSource::Search).await
}
