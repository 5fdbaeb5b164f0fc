// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./strata.toml` > `~/.config/strata/strata.toml`
//! > `/etc/strata/strata.toml`, with environment variable overrides via
//! the `STRATA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::StrataConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/strata/strata.toml` (system-wide)
/// 3. `~/.config/strata/strata.toml` (user XDG config)
/// 4. `./strata.toml` (local directory)
/// 5. `STRATA_*` environment variables
pub fn load_config() -> Result<StrataConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(StrataConfig::default()))
        .merge(Toml::file("/etc/strata/strata.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("strata/strata.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("strata.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<StrataConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(StrataConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<StrataConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(StrataConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` so underscore-containing key
/// names stay unambiguous: `STRATA_PROVIDER_API_KEY` must map to
/// `provider.api_key`, not `provider.api.key`.
fn env_provider() -> Env {
    const SECTIONS: [&str; 7] = [
        "engine_",
        "provider_",
        "storage_",
        "chunking_",
        "embedding_",
        "retrieval_",
        "learning_",
    ];
    Env::prefixed("STRATA_").map(|key| {
        let key_str = key.as_str();
        for section in SECTIONS {
            // Only the leading section name becomes a dot; field names that
            // themselves contain a section word (provider.embedding_url)
            // must stay intact.
            if let Some(rest) = key_str.strip_prefix(section) {
                return format!("{}.{rest}", &section[..section.len() - 1]).into();
            }
        }
        key_str.into()
    })
}
