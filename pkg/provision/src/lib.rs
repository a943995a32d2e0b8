//! Provisioning of per-user workshop environments: credentials, namespaces
//! with quota and scoped admin rights, and a ready-to-use workspace.

pub mod access;
pub mod batch;
pub mod detector;
pub mod error;
pub mod identity;
pub mod namespace;
pub mod settings;
pub mod setup;
pub mod users;
pub mod workspace;

pub use batch::{BatchController, BatchOptions, Confirm};
pub use error::{ProvisionError, Result};
pub use settings::{ProvisionSettings, ReadinessPolicy, WorkspaceTemplate};
pub use users::UserSource;
