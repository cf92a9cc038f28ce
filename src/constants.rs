//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group of the Manifest custom resource
pub const API_GROUP: &str = "operator.declarative.io";

/// Default HTTP server port for health checks
pub const DEFAULT_HEALTH_PORT: u16 = 8081;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Requeue interval after a reconciliation that reached steady state (seconds)
pub const DEFAULT_SUCCESS_REQUEUE_SECS: u64 = 30;

/// Requeue interval for intended requeues (finalizer added, synced set changed, ...) (seconds)
pub const DEFAULT_INTENDED_REQUEUE_SECS: u64 = 1;

/// Fibonacci error backoff lower bound (seconds)
pub const DEFAULT_ERROR_BACKOFF_MIN_SECS: u64 = 5;

/// Fibonacci error backoff upper bound (seconds)
pub const DEFAULT_ERROR_BACKOFF_MAX_SECS: u64 = 300;

/// Upper bound for a single reconciliation before in-flight work is cancelled (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 120;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default maximum number of Manifests reconciled at once
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Finalizer owned by the reconciliation engine
pub const DEFAULT_FINALIZER: &str = "declarative.kyma-project.io/finalizer";

/// Finalizer held while the embedded module custom resource still exists on the target
pub const CUSTOM_RESOURCE_MANAGER_FINALIZER: &str = "resource.kyma-project.io/finalizer";

/// Field manager used for server-side apply on target clusters
pub const DEFAULT_FIELD_OWNER: &str = "declarative.kyma-project.io/applier";

/// Field manager used when the controller patches its own Manifest objects
pub const MANIFEST_FIELD_OWNER: &str = "manifest-controller";

/// Namespace rendered resources land in when they omit one
pub const DEFAULT_TARGET_NAMESPACE: &str = "default";

/// Namespace that cleanup never deletes
pub const PROTECTED_NAMESPACE: &str = "kyma-system";

/// Annotation recording the content reference of the last fully synced revision
pub const SYNCED_CONTENT_REF_ANNOTATION: &str = "sync-oci-ref";

/// Label which, when set to `"true"`, makes the engine skip an object
pub const SKIP_RECONCILIATION_LABEL: &str = "operator.declarative.io/skip-reconciliation";

/// Label naming the target cluster of a Manifest; also keys the client cache
pub const CLUSTER_NAME_LABEL: &str = "operator.declarative.io/cluster-name";

/// Label put on every rendered resource
pub const MANAGED_BY_LABEL: &str = "operator.declarative.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGED_BY_VALUE: &str = "declarative-v2";

/// Label put on rendered resources so watchers can route events back
pub const WATCHED_BY_LABEL: &str = "operator.declarative.io/watched-by";

/// Value of [`WATCHED_BY_LABEL`]
pub const WATCHED_BY_VALUE: &str = "manifest-controller";

/// Standard component label, set to the module name
pub const COMPONENT_LABEL: &str = "app.kubernetes.io/component";

/// Standard part-of label
pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";

/// Annotation warning users against hand edits of managed resources
pub const DISCLAIMER_ANNOTATION: &str = "operator.declarative.io/managed-by-disclaimer";

/// Value of [`DISCLAIMER_ANNOTATION`]
pub const DISCLAIMER_VALUE: &str = "DO NOT EDIT - This resource is managed by the manifest controller.\n\
    Any modifications are discarded and the resource is reverted to the original state.";

/// Secret data key holding a kubeconfig for remote targets
pub const KUBECONFIG_SECRET_KEY: &str = "config";

/// Default directory holding unpacked content layers
pub const DEFAULT_MANIFEST_ROOT: &str = "/var/lib/manifests";

/// File name of the rendered manifest inside a content layer directory
pub const RAW_MANIFEST_FILE: &str = "raw-manifest.yaml";

/// How long parsed manifests stay cached (seconds)
pub const DEFAULT_PARSER_CACHE_TTL_SECS: u64 = 600;

/// Value of [`PART_OF_LABEL`] on rendered resources
pub const PART_OF_VALUE: &str = "kyma";
