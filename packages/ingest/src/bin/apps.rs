#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Fetches one month of app download metrics from every F-Droid mirror.

use fdroid_metrics_models::MetricsSource;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fdroid_metrics_ingest::cli::run(MetricsSource::Apps).await
}
