//! Command-line front end shared by the `fdroid_metrics_search` and
//! `fdroid_metrics_apps` binaries.

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, FromArgMatches, Parser};
use fdroid_metrics_cli_utils::{IndicatifProgress, MultiProgress, init_logger};
use fdroid_metrics_ingest_models::{Availability, FetchConfig, RunSummary};
use fdroid_metrics_models::{FetchStatus, MetricsSource, Period};
use fdroid_metrics_source::apps::AppsClient;
use fdroid_metrics_source::http::HttpTransport;
use fdroid_metrics_source::search::SearchClient;
use fdroid_metrics_source::{MetricsClient, registry};

use crate::period::{SystemClock, resolve_period};
use crate::store::TableRow;
use crate::{availability, config, run_fetch};

/// Missing periods listed by `--status` before the list is cut short.
const MISSING_SHOWN: usize = 10;

#[derive(Parser, Debug)]
pub struct Cli {
    /// Four-digit year. Given together with MONTH; both default to the
    /// current month
    pub year: Option<String>,
    /// Month number (1-12)
    pub month: Option<String>,
    /// Log debug output (`RUST_LOG` takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
    /// Directory tables are written to (overrides `FDROID_METRICS_DATA_DIR`)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Per-request timeout in seconds (overrides `FDROID_METRICS_TIMEOUT_SECS`)
    #[arg(long)]
    pub timeout: Option<u64>,
    /// Report which months are published upstream but missing locally
    /// instead of fetching
    #[arg(long)]
    pub status: bool,
}

impl Cli {
    /// Parses the process arguments for the binary serving `source`.
    #[must_use]
    pub fn parse_for(source: MetricsSource) -> Self {
        let matches = command(source).get_matches();
        Self::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
    }
}

fn command(source: MetricsSource) -> clap::Command {
    let (name, about) = match source {
        MetricsSource::Search => (
            "fdroid_metrics_search",
            "Fetch one month of F-Droid search metrics into a local table",
        ),
        MetricsSource::Apps => (
            "fdroid_metrics_apps",
            "Fetch one month of F-Droid app download metrics from every mirror",
        ),
    };
    Cli::command().name(name).bin_name(name).about(about)
}

/// Runs one invocation for `source`.
///
/// # Errors
///
/// Returns the [`crate::FetchError`] or setup error that ended the
/// invocation. A partial app-download fetch is not an error.
pub async fn run(source: MetricsSource) -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse_for(source);
    let multi = init_logger(if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });
    let config = config::apply_cli(config::config_from_env(), cli.data_dir.clone(), cli.timeout);

    if cli.status {
        return report_status(source, &config).await;
    }

    let period = resolve_period(cli.year.as_deref(), cli.month.as_deref(), &SystemClock)
        .inspect_err(|_| eprintln!("{}", command(source).render_usage()))?;

    fetch(source, period, &config, &multi).await
}

async fn fetch(
    source: MetricsSource,
    period: Period,
    config: &FetchConfig,
    multi: &MultiProgress,
) -> Result<(), Box<dyn Error>> {
    let transport = HttpTransport::new(config.timeout)?;
    let definition = registry::source(source)?;

    match source {
        MetricsSource::Search => {
            fetch_with(&SearchClient::new(transport, definition), period, config).await
        }
        MetricsSource::Apps => {
            let progress =
                IndicatifProgress::steps_bar(multi, "Mirrors", definition.hosts.len() as u64);
            let client = AppsClient::new(transport, definition).with_progress(progress);
            fetch_with(&client, period, config).await
        }
    }
}

async fn fetch_with<C>(
    client: &C,
    period: Period,
    config: &FetchConfig,
) -> Result<(), Box<dyn Error>>
where
    C: MetricsClient,
    C::Record: TableRow,
{
    let summary = run_fetch(client, period, &config.data_dir).await?;
    log_summary(&summary);
    Ok(())
}

fn log_summary(summary: &RunSummary) {
    log::info!(
        "{} {}: {} ({} files, {} rows, {} skipped) in {:.1?}",
        summary.source,
        summary.period,
        summary.status,
        summary.files,
        summary.rows,
        summary.skipped,
        summary.duration
    );

    if summary.status == FetchStatus::Partial {
        let failed: Vec<_> = summary.mirrors.iter().filter(|m| !m.succeeded()).collect();
        log::warn!(
            "{}/{} mirrors failed, the table only covers the others",
            failed.len(),
            summary.mirrors.len()
        );
        for mirror in failed {
            log::warn!(
                "  {}: {}",
                mirror.server,
                mirror.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

async fn report_status(
    source: MetricsSource,
    config: &FetchConfig,
) -> Result<(), Box<dyn Error>> {
    let transport = HttpTransport::new(config.timeout)?;
    let definition = registry::source(source)?;

    let report = match source {
        MetricsSource::Search => {
            availability(&SearchClient::new(transport, definition), &config.data_dir).await?
        }
        MetricsSource::Apps => {
            availability(&AppsClient::new(transport, definition), &config.data_dir).await?
        }
    };

    for line in status_lines(&report, &config.data_dir) {
        println!("{line}");
    }
    Ok(())
}

fn status_lines(report: &Availability, data_dir: &Path) -> Vec<String> {
    let span = |periods: &[Period]| match (periods.first(), periods.last()) {
        (Some(first), Some(last)) => format!("{} months ({first} to {last})", periods.len()),
        _ => "none".to_string(),
    };

    let mut lines = vec![
        format!("{} metrics", report.source),
        format!("  remote: {}", span(&report.remote)),
        format!("  local:  {} in {}", span(&report.local), data_dir.display()),
    ];

    let missing = report.missing();
    if missing.is_empty() {
        lines.push("  up to date".to_string());
        return lines;
    }

    lines.push(format!("  missing locally: {}", missing.len()));
    lines.extend(
        missing
            .iter()
            .take(MISSING_SHOWN)
            .map(|period| format!("    {period}")),
    );
    if missing.len() > MISSING_SHOWN {
        lines.push(format!("    ... and {} more", missing.len() - MISSING_SHOWN));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn months(range: std::ops::RangeInclusive<u32>) -> Vec<Period> {
        range.map(|m| Period::new(2024, m).unwrap()).collect()
    }

    #[test]
    fn parses_period_and_flags() {
        let cli = Cli::try_parse_from([
            "fdroid_metrics_apps",
            "2024",
            "12",
            "-v",
            "--data-dir",
            "/tmp/out",
            "--timeout",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.year.as_deref(), Some("2024"));
        assert_eq!(cli.month.as_deref(), Some("12"));
        assert!(cli.verbose);
        assert!(!cli.status);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(cli.timeout, Some(5));
    }

    #[test]
    fn positional_arguments_are_optional() {
        let cli = Cli::try_parse_from(["fdroid_metrics_search", "--status"]).unwrap();
        assert!(cli.year.is_none() && cli.month.is_none());
        assert!(cli.status);
    }

    #[test]
    fn extra_positional_argument_is_a_usage_error() {
        assert!(Cli::try_parse_from(["fdroid_metrics_search", "2024", "1", "2"]).is_err());
    }

    #[test]
    fn binaries_are_named_per_source() {
        assert_eq!(command(MetricsSource::Search).get_name(), "fdroid_metrics_search");
        assert_eq!(command(MetricsSource::Apps).get_name(), "fdroid_metrics_apps");
    }

    #[test]
    fn status_lists_first_ten_missing_periods() {
        let report = Availability {
            source: MetricsSource::Apps,
            local: months(1..=1),
            remote: months(1..=12),
        };

        let lines = status_lines(&report, Path::new("data"));

        assert_eq!(lines[0], "apps metrics");
        assert_eq!(lines[1], "  remote: 12 months (2024-01 to 2024-12)");
        assert!(lines.contains(&"  missing locally: 11".to_string()));
        assert!(lines.contains(&"    2024-02".to_string()));
        assert!(lines.contains(&"    2024-11".to_string()));
        assert!(!lines.contains(&"    2024-12".to_string()));
        assert_eq!(lines.last().unwrap(), "    ... and 1 more");
    }

    #[test]
    fn status_reports_up_to_date() {
        let report = Availability {
            source: MetricsSource::Search,
            local: months(3..=4),
            remote: months(3..=4),
        };
        let lines = status_lines(&report, Path::new("data"));
        assert_eq!(lines.last().unwrap(), "  up to date");
    }
}
