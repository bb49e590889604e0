//! Source registry: loads the metrics feed definitions from embedded TOML
//! configs and applies environment overrides.
//!
//! Each `.toml` file in `packages/source/sources/` is baked into the binary
//! at compile time via [`include_str!`].

use fdroid_metrics_models::MetricsSource;

use crate::SourceError;
use crate::source_def::{SourceDefinition, parse_source_toml};

/// Overrides the base URL of every feed.
pub const BASE_URL_ENV: &str = "FDROID_METRICS_BASE_URL";

/// Comma-separated mirror list overriding the app-download hosts.
pub const MIRRORS_ENV: &str = "FDROID_METRICS_MIRRORS";

/// TOML configs embedded at compile time.
const SOURCE_TOMLS: &[(&str, &str)] = &[
    ("search", include_str!("../sources/search.toml")),
    ("apps", include_str!("../sources/apps.toml")),
];

/// Returns all configured feed definitions, parsed from embedded TOML.
///
/// # Errors
///
/// Returns [`SourceError::Config`] if an embedded config is malformed.
pub fn all_sources() -> Result<Vec<SourceDefinition>, SourceError> {
    SOURCE_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_source_toml(toml).map_err(|e| {
                log::error!("Failed to parse {name}.toml: {e}");
                SourceError::Config(e)
            })
        })
        .collect()
}

/// Returns the definition for `id` with environment overrides applied.
///
/// # Errors
///
/// Returns [`SourceError`] if the embedded configs are malformed or have no
/// entry for `id`.
pub fn source(id: MetricsSource) -> Result<SourceDefinition, SourceError> {
    let def = all_sources()?
        .into_iter()
        .find(|s| s.id == id)
        .ok_or(SourceError::UnknownSource(id))?;

    Ok(with_overrides(
        def,
        std::env::var(BASE_URL_ENV).ok(),
        std::env::var(MIRRORS_ENV).ok(),
    ))
}

/// Applies a base URL override and, for the app-download feed, a
/// comma-separated mirror list override. Blank values are ignored.
#[must_use]
pub fn with_overrides(
    mut def: SourceDefinition,
    base_url: Option<String>,
    mirrors: Option<String>,
) -> SourceDefinition {
    if let Some(url) = base_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        log::debug!("{}: base URL overridden to {url}", def.id);
        def = def.with_base_url(url);
    }

    if def.id == MetricsSource::Apps {
        if let Some(list) = mirrors {
            let hosts: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(String::from)
                .collect();
            if !hosts.is_empty() {
                log::debug!("{}: mirrors overridden to {}", def.id, hosts.join(", "));
                def = def.with_hosts(hosts);
            }
        }
    }

    def
}
