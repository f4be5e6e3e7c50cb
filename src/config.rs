//! Environment configuration.

use std::env;
use std::path::PathBuf;

/// Install directory used when `BRUNCH_HOME` is unset and `$HOME` is unknown.
const FALLBACK_HOME: &str = ".brunch";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    pub home: PathBuf,
    pub log_file: Option<String>,
    pub debug: bool,
    pub default_provider: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            home: env_string_opt("BRUNCH_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(default_home),
            log_file: env_string_opt("BRUNCH_LOG_FILE"),
            debug: env_flag("BRUNCH_DEBUG"),
            default_provider: env_string_opt("BRUNCH_DEFAULT_PROVIDER"),
        }
    }

    /// Directive used when `RUST_LOG` does not override the filter.
    #[must_use]
    pub fn default_log_directive(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

fn default_home() -> PathBuf {
    env_string_opt("HOME")
        .map(|home| PathBuf::from(home).join(FALLBACK_HOME))
        .unwrap_or_else(|| PathBuf::from(FALLBACK_HOME))
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
