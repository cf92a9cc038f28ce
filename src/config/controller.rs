//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_ERROR_BACKOFF_MAX_SECS, DEFAULT_ERROR_BACKOFF_MIN_SECS, DEFAULT_FIELD_OWNER,
    DEFAULT_FINALIZER, DEFAULT_HEALTH_PORT, DEFAULT_INTENDED_REQUEUE_SECS,
    DEFAULT_MANIFEST_ROOT, DEFAULT_MAX_CONCURRENT_RECONCILIATIONS, DEFAULT_PARSER_CACHE_TTL_SECS,
    DEFAULT_RECONCILE_TIMEOUT_SECS, DEFAULT_SERVER_POLL_INTERVAL_MS,
    DEFAULT_SERVER_STARTUP_TIMEOUT_SECS, DEFAULT_SUCCESS_REQUEUE_SECS, DEFAULT_TARGET_NAMESPACE,
    DEFAULT_WATCH_RESTART_DELAY_SECS,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Requeue interval after a reconciliation reached steady state (seconds)
    pub success_requeue_secs: u64,
    /// Requeue interval when a reconciliation only advanced the state machine (seconds)
    pub intended_requeue_secs: u64,
    /// Fibonacci error backoff lower bound (seconds)
    pub error_backoff_min_secs: u64,
    /// Fibonacci error backoff upper bound (seconds)
    pub error_backoff_max_secs: u64,
    /// Deadline of a single reconciliation (seconds)
    pub reconcile_timeout_secs: u64,
    pub finalizer: String,
    /// Field manager for server-side apply on target clusters
    pub field_owner: String,
    /// Namespace rendered resources land in when they omit one
    pub target_namespace: String,
    /// Create the target namespace when building a cluster client
    pub create_namespace: bool,
    /// Labels stamped on every rendered resource in addition to the defaults
    pub extra_labels: BTreeMap<String, String>,
    /// Directory holding unpacked content layers
    pub manifest_root: PathBuf,
    /// How long parsed manifests stay cached (seconds)
    pub parser_cache_ttl_secs: u64,
    /// Port of the health check server
    pub health_port: u16,
    /// HTTP server startup timeout (seconds)
    pub server_startup_timeout_secs: u64,
    /// HTTP server readiness poll interval (milliseconds)
    pub server_poll_interval_ms: u64,
    /// Fallback filter directive when `RUST_LOG` is unset
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Maximum concurrent reconciliations
    pub max_concurrent_reconciliations: u16,
    /// Delay before restarting the watch stream after it ended (seconds)
    pub watch_restart_delay_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            success_requeue_secs: DEFAULT_SUCCESS_REQUEUE_SECS,
            intended_requeue_secs: DEFAULT_INTENDED_REQUEUE_SECS,
            error_backoff_min_secs: DEFAULT_ERROR_BACKOFF_MIN_SECS,
            error_backoff_max_secs: DEFAULT_ERROR_BACKOFF_MAX_SECS,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            finalizer: DEFAULT_FINALIZER.to_string(),
            field_owner: DEFAULT_FIELD_OWNER.to_string(),
            target_namespace: DEFAULT_TARGET_NAMESPACE.to_string(),
            create_namespace: true,
            extra_labels: BTreeMap::new(),
            manifest_root: PathBuf::from(DEFAULT_MANIFEST_ROOT),
            parser_cache_ttl_secs: DEFAULT_PARSER_CACHE_TTL_SECS,
            health_port: DEFAULT_HEALTH_PORT,
            server_startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            server_poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            success_requeue_secs: env_var_or_default(
                "SUCCESS_REQUEUE_SECS",
                defaults.success_requeue_secs,
            ),
            intended_requeue_secs: env_var_or_default(
                "INTENDED_REQUEUE_SECS",
                defaults.intended_requeue_secs,
            ),
            error_backoff_min_secs: env_var_or_default(
                "ERROR_BACKOFF_MIN_SECS",
                defaults.error_backoff_min_secs,
            ),
            error_backoff_max_secs: env_var_or_default(
                "ERROR_BACKOFF_MAX_SECS",
                defaults.error_backoff_max_secs,
            ),
            reconcile_timeout_secs: env_var_or_default(
                "RECONCILE_TIMEOUT_SECS",
                defaults.reconcile_timeout_secs,
            ),
            finalizer: env_var_or_default_str("MANIFEST_FINALIZER", &defaults.finalizer),
            field_owner: env_var_or_default_str("FIELD_OWNER", &defaults.field_owner),
            target_namespace: env_var_or_default_str(
                "TARGET_NAMESPACE",
                &defaults.target_namespace,
            ),
            create_namespace: env_var_or_default_bool(
                "CREATE_NAMESPACE",
                defaults.create_namespace,
            ),
            extra_labels: std::env::var("EXTRA_LABELS")
                .map_or(defaults.extra_labels, |v| parse_labels(&v)),
            manifest_root: std::env::var("MANIFEST_ROOT")
                .map_or(defaults.manifest_root, PathBuf::from),
            parser_cache_ttl_secs: env_var_or_default(
                "PARSER_CACHE_TTL_SECS",
                defaults.parser_cache_ttl_secs,
            ),
            health_port: env_var_or_default("HEALTH_PORT", defaults.health_port),
            server_startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                defaults.server_startup_timeout_secs,
            ),
            server_poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                defaults.server_poll_interval_ms,
            ),
            log_level: env_var_or_default_str("LOG_LEVEL", &defaults.log_level),
            log_format: env_var_or_default_str("LOG_FORMAT", &defaults.log_format),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                defaults.max_concurrent_reconciliations,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                defaults.watch_restart_delay_secs,
            ),
        }
    }

    #[must_use]
    pub fn success_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.success_requeue_secs)
    }

    #[must_use]
    pub fn intended_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.intended_requeue_secs)
    }

    #[must_use]
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    #[must_use]
    pub fn parser_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.parser_cache_ttl_secs)
    }

    #[must_use]
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse `key=value` pairs separated by commas, skipping malformed entries
fn parse_labels(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key).ok().map_or(default, |v| {
        matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
    })
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
