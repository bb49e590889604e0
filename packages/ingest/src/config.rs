//! Fetch configuration from the environment and command-line flags.
//!
//! Flags override environment variables, which override the defaults in
//! [`FetchConfig::default`].

use std::path::PathBuf;
use std::time::Duration;

use fdroid_metrics_ingest_models::FetchConfig;

/// Directory tables are written to.
pub const DATA_DIR_ENV: &str = "FDROID_METRICS_DATA_DIR";

/// Per-request timeout in whole seconds.
pub const TIMEOUT_ENV: &str = "FDROID_METRICS_TIMEOUT_SECS";

/// Reads [`DATA_DIR_ENV`] and [`TIMEOUT_ENV`] on top of the defaults.
#[must_use]
pub fn config_from_env() -> FetchConfig {
    config_from_vars(
        std::env::var(DATA_DIR_ENV).ok(),
        std::env::var(TIMEOUT_ENV).ok(),
    )
}

fn config_from_vars(data_dir: Option<String>, timeout: Option<String>) -> FetchConfig {
    let mut config = FetchConfig::default();

    if let Some(dir) = data_dir.filter(|d| !d.trim().is_empty()) {
        config.data_dir = PathBuf::from(dir.trim());
    }

    if let Some(raw) = timeout {
        match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => config.timeout = Duration::from_secs(secs),
            _ => log::warn!(
                "Ignoring {TIMEOUT_ENV}={raw:?}, using {}s",
                config.timeout.as_secs()
            ),
        }
    }

    config
}

/// Applies `--data-dir` and `--timeout` over `config`.
#[must_use]
pub fn apply_cli(
    mut config: FetchConfig,
    data_dir: Option<PathBuf>,
    timeout_secs: Option<u64>,
) -> FetchConfig {
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    match timeout_secs {
        Some(0) => log::warn!(
            "Ignoring --timeout 0, using {}s",
            config.timeout.as_secs()
        ),
        Some(secs) => config.timeout = Duration::from_secs(secs),
        None => {}
    }
    config
}
