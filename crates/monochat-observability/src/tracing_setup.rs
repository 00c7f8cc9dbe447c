//! Subscriber setup for MonoChat binaries.
//!
//! Filtering comes from [`LogConfig`] unless `RUST_LOG` is set, in which
//! case the environment wins. Output always goes to stderr; stdout belongs
//! to the chat messages a binary prints.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// The `log` section of a MonoChat config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Level applied to every target without an override.
    #[serde(default = "default_level")]
    pub level: String,
    /// Per-crate levels keyed by package name, e.g. `"monochat-engine": "trace"`.
    #[serde(default)]
    pub components: BTreeMap<String, String>,
    /// JSON lines instead of the compact text format.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: BTreeMap::new(),
            json: false,
        }
    }
}

/// `EnvFilter` directives for `config`, such as `warn,monochat_core=debug`.
///
/// Package names use `-`, tracing targets use `_`.
pub fn directives(config: &LogConfig) -> String {
    std::iter::once(config.level.clone())
        .chain(
            config
                .components
                .iter()
                .map(|(krate, level)| format!("{}={level}", krate.replace('-', "_"))),
        )
        .collect::<Vec<_>>()
        .join(",")
}

fn filter(config: &LogConfig) -> EnvFilter {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
    }
    EnvFilter::try_new(directives(config)).unwrap_or_else(|_| EnvFilter::new(default_level()))
}

/// Install the global subscriber. Returns `false` if one was already set,
/// in which case nothing changes.
pub fn init_tracing(config: &LogConfig) -> bool {
    let registry = tracing_subscriber::registry().with(filter(config));
    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    installed.is_ok()
}
