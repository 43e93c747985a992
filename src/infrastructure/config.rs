//! Host configuration
//!
//! Settings owned by the build host rather than the pipeline. Every field
//! can be overridden through a `PIPEXEC_*` environment variable.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::compiler::DEFAULT_CACHE_ROOT;
use crate::pipeline::DEFAULT_WORKSPACE_ROOT;

/// Host configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host directory holding per-repository caches
    pub cache_root: String,
    /// Workspace root inside build containers
    pub workspace_root: String,
    /// Build time limit when the repository sets none
    pub default_timeout_minutes: u64,
    /// Seconds a container gets to stop before it is killed
    pub stop_grace_secs: u64,
    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_root: DEFAULT_CACHE_ROOT.to_string(),
            workspace_root: DEFAULT_WORKSPACE_ROOT.to_string(),
            default_timeout_minutes: 60,
            stop_grace_secs: 5,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Defaults overridden by `PIPEXEC_*` variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, fallback: u64| match text(key) {
            Some(v) => v.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key = %key, value = %v, "Ignoring invalid number");
                fallback
            }),
            None => fallback,
        };

        if let Some(v) = text("PIPEXEC_CACHE_ROOT") {
            config.cache_root = v;
        }
        if let Some(v) = text("PIPEXEC_WORKSPACE_ROOT") {
            config.workspace_root = v;
        }
        if let Some(v) = text("PIPEXEC_LOG_LEVEL") {
            config.log_level = v;
        }
        config.default_timeout_minutes =
            number("PIPEXEC_TIMEOUT_MINUTES", config.default_timeout_minutes);
        config.stop_grace_secs = number("PIPEXEC_STOP_GRACE_SECS", config.stop_grace_secs);
        config
    }

    /// Build time limit, preferring the repository's own setting
    #[must_use]
    pub fn timeout(&self, repo_minutes: u64) -> Duration {
        let minutes = if repo_minutes == 0 {
            self.default_timeout_minutes
        } else {
            repo_minutes
        };
        Duration::from_secs(minutes * 60)
    }

    /// Grace period before a stopping container is killed
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}
