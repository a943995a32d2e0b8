//! Batch provisioning constants.

/// Default username prefix; users are named `{prefix}{n}`.
pub const DEFAULT_PREFIX: &str = "user";

/// Default namespace suffix; namespaces are named `{user}-{suffix}`.
pub const DEFAULT_SUFFIX: &str = "ws";

/// Largest batch a single invocation accepts.
pub const MAX_USERS: u32 = 100;

/// Upper bound for `--concurrency`.
pub const MAX_CONCURRENCY: usize = 16;

/// Default number of users provisioned at once (sequential).
pub const DEFAULT_CONCURRENCY: usize = 1;

// ─── Credential store ─────────────────────────────────────────────────────

/// Name of the secret holding the htpasswd credential file.
pub const CREDENTIAL_SECRET: &str = "workshop-htpasswd";

/// Namespace holding the shared credential store.
pub const CREDENTIAL_NAMESPACE: &str = "workshop-system";

// ─── RBAC ─────────────────────────────────────────────────────────────────

/// Namespace-scoped role granted to each participant.
pub const ADMIN_ROLE: &str = "admin";

/// Name of the role binding created in every user namespace.
pub const ROLE_BINDING_NAME: &str = "workshop-admin";

/// Service account bound alongside the user in each namespace.
pub const SERVICE_ACCOUNT: &str = "workspace";

/// Name of the quota object created in every user namespace.
pub const QUOTA_NAME: &str = "workshop-quota";

// ─── Readiness polling ────────────────────────────────────────────────────

/// Seconds between two workspace phase checks.
pub const READY_POLL_INTERVAL_SECS: u64 = 10;

/// Phase checks before a workspace is declared timed out (5 minutes).
pub const READY_MAX_ATTEMPTS: u32 = 30;
