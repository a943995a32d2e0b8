//! Defaults for the per-user workspace descriptor.

/// Name given to the workspace in each user namespace.
pub const WORKSPACE_NAME: &str = "tutorial";

/// Default base URL of the workspace console.
pub const DEFAULT_CONSOLE_URL: &str = "https://workspaces.apps.cluster.local";

/// Default tutorial source repository.
pub const DEFAULT_REPOSITORY: &str = "https://github.com/workshop/attendee-registration";

/// Default deployment descriptor path inside the repository.
pub const DEFAULT_DESCRIPTOR_PATH: &str = "devfile.yaml";

// ─── Primary tool container ───────────────────────────────────────────────

pub const TOOL_IMAGE: &str = "quay.io/devfile/universal-developer-image:ubi8-latest";
pub const TOOL_ENDPOINT_NAME: &str = "http";
pub const TOOL_PORT: u16 = 8080;

// ─── Sidecars ─────────────────────────────────────────────────────────────

pub const DB_IMAGE: &str = "docker.io/library/postgres:15";
pub const DB_PORT: u16 = 5432;
pub const BROKER_IMAGE: &str = "docker.io/bitnami/kafka:3.6";
pub const BROKER_PORT: u16 = 9092;
