//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use super::{env_var_or_default, env_var_or_default_str};
use crate::constants::{
    DEFAULT_BACKOFF_MAX_SECS, DEFAULT_BACKOFF_MIN_SECS, DEFAULT_CONFLICT_REQUEUE_SECS,
    DEFAULT_CONTROLLER_NAMESPACE, DEFAULT_FIELD_MANAGER, DEFAULT_MAX_NUM_REQUEUES,
    DEFAULT_METRICS_PORT, DEFAULT_NUM_WORKERS,
};
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Maximum number of requeues for a failing request generation
    /// After this the key is dropped and the failure lives only in status
    pub max_num_requeues: u32,
    /// Concurrent reconciliations per request kind
    pub num_workers: u16,
    /// Fibonacci backoff minimum (seconds)
    pub backoff_min_secs: u64,
    /// Fibonacci backoff maximum (seconds)
    pub backoff_max_secs: u64,
    /// Delay before re-reading an object after a write conflict (seconds)
    pub conflict_requeue_secs: u64,
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    /// Namespace where the controller is deployed
    pub controller_namespace: String,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Field manager for status patches and server-side apply
    pub field_manager: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_num_requeues: DEFAULT_MAX_NUM_REQUEUES,
            num_workers: DEFAULT_NUM_WORKERS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            conflict_requeue_secs: DEFAULT_CONFLICT_REQUEUE_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let backoff_min_secs = env_var_or_default("BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS).max(1);
        Self {
            max_num_requeues: env_var_or_default("MAX_NUM_REQUEUES", DEFAULT_MAX_NUM_REQUEUES),
            num_workers: env_var_or_default("NUM_WORKERS", DEFAULT_NUM_WORKERS).max(1),
            backoff_min_secs,
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS)
                .max(backoff_min_secs),
            conflict_requeue_secs: env_var_or_default(
                "CONFLICT_REQUEUE_SECS",
                DEFAULT_CONFLICT_REQUEUE_SECS,
            ),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            controller_namespace: env_var_or_default_str("POD_NAMESPACE", DEFAULT_CONTROLLER_NAMESPACE),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            field_manager: env_var_or_default_str("FIELD_MANAGER", DEFAULT_FIELD_MANAGER),
        }
    }

    /// Get conflict requeue duration
    #[must_use]
    pub fn conflict_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.conflict_requeue_secs)
    }

    /// Whether logs should be emitted as JSON
    #[must_use]
    pub fn json_logs(&self) -> bool {
        !self.log_format.eq_ignore_ascii_case("text")
    }
}
