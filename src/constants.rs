//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group of every CRD served by the controller
pub const API_GROUP: &str = "engine.kubevault.dev";

/// Finalizer guarding lease revocation on request deletion
pub const FINALIZER: &str = "engine.kubevault.dev/finalizer";

/// Field manager used for server-side apply and status patches
pub const DEFAULT_FIELD_MANAGER: &str = "credential-request-controller";

/// Label key marking objects created by the controller
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Label key carrying the request name on issued objects, set when the name
/// fits in a label value
pub const REQUEST_NAME_LABEL: &str = "engine.kubevault.dev/request";

/// Annotation key carrying the full request name on issued objects
pub const REQUEST_NAME_ANNOTATION: &str = "engine.kubevault.dev/request-name";

/// Longest value Kubernetes accepts for a label
pub const MAX_LABEL_VALUE_LENGTH: usize = 63;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default maximum number of times a failing request key is requeued
pub const DEFAULT_MAX_NUM_REQUEUES: u32 = 5;

/// Default number of concurrent reconciliations per request kind
pub const DEFAULT_NUM_WORKERS: u16 = 2;

/// Default Fibonacci backoff minimum (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default Fibonacci backoff maximum (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default requeue delay after an optimistic-concurrency conflict (seconds)
pub const DEFAULT_CONFLICT_REQUEUE_SECS: u64 = 1;

/// Default namespace the controller runs in
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "kubevault-system";

/// Default Vault Kubernetes auth mount
pub const DEFAULT_VAULT_AUTH_PATH: &str = "kubernetes";

/// Default timeout for a single Vault HTTP request (seconds)
pub const DEFAULT_VAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Projected service account token used for Vault Kubernetes auth
pub const DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Length of the random suffix appended to issued secret names
pub const SECRET_NAME_SUFFIX_LEN: usize = 6;
