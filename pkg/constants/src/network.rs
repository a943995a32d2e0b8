//! Endpoint defaults and the environment variables that override them.

// ─── Cluster API ──────────────────────────────────────────────────────────

/// Default cluster API endpoint.
pub const DEFAULT_SERVER: &str = "http://127.0.0.1:6443";

/// Overrides the cluster API endpoint when `--server` is not given.
pub const ENV_SERVER: &str = "WORKSHOP_SERVER";

/// Overrides the bearer token when `--token` is not given.
pub const ENV_TOKEN: &str = "WORKSHOP_TOKEN";

/// Per-request timeout for cluster API calls, in seconds.
pub const API_TIMEOUT_SECS: u64 = 30;

// ─── Auxiliary service probes ─────────────────────────────────────────────

pub const ENV_DB_HOST: &str = "WORKSHOP_DB_HOST";
pub const ENV_DB_PORT: &str = "WORKSHOP_DB_PORT";
pub const DEFAULT_DB_HOST: &str = "localhost";
pub const DEFAULT_DB_PORT: u16 = 5432;

pub const ENV_BROKER_HOST: &str = "WORKSHOP_BROKER_HOST";
pub const ENV_BROKER_PORT: &str = "WORKSHOP_BROKER_PORT";
pub const DEFAULT_BROKER_HOST: &str = "localhost";
pub const DEFAULT_BROKER_PORT: u16 = 9092;

pub const ENV_TOOL_HOST: &str = "WORKSHOP_TOOL_HOST";
pub const ENV_TOOL_PORT: &str = "WORKSHOP_TOOL_PORT";
pub const DEFAULT_TOOL_HOST: &str = "localhost";
pub const DEFAULT_TOOL_PORT: u16 = 8080;

/// TCP connect timeout for a single service probe, in seconds.
pub const PROBE_TIMEOUT_SECS: u64 = 3;
