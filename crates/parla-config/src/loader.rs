// SPDX-FileCopyrightText: 2026 Parla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./parla.toml` > `~/.config/parla/parla.toml` > `/etc/parla/parla.toml`
//! with environment variable overrides via `PARLA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ParlaConfig;

/// Sections whose keys may be overridden through `PARLA_<SECTION>_<KEY>`.
const ENV_SECTIONS: &[&str] = &[
    "service",
    "storage",
    "chat",
    "audio",
    "anthropic",
    "speech",
    "worker",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/parla/parla.toml` (system-wide)
/// 3. `~/.config/parla/parla.toml` (user XDG config)
/// 4. `./parla.toml` (local directory)
/// 5. `PARLA_*` environment variables
pub fn load_config() -> Result<ParlaConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ParlaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParlaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ParlaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParlaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ParlaConfig::default()))
        .merge(Toml::file("/etc/parla/parla.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("parla/parla.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("parla.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `PARLA_AUDIO_URL_TTL_SECS` must map to `audio.url_ttl_secs`.
fn env_provider() -> Env {
    Env::prefixed("PARLA_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to its dotted config path.
fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(section)
            && let Some(field) = rest.strip_prefix('_')
        {
            return format!("{section}.{field}");
        }
    }
    key.to_string()
}
