//! Label keys stamped on provisioned resources.
//!
//! Detection and cleanup filter on these, so changing a value orphans
//! everything provisioned under the old one.

/// Username of the participant owning the namespace.
pub const OWNER: &str = "workshop.dev/owner";

/// Marks a namespace as created by this tool.
pub const DEPLOYMENT_TYPE: &str = "workshop.dev/deployment-type";

/// Value of [`DEPLOYMENT_TYPE`] for per-user environments.
pub const DEPLOYMENT_TYPE_VALUE: &str = "user-workspace";
