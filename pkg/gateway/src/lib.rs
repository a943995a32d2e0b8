//! Cluster API gateway.
//!
//! Thin, authenticated access to the four resource kinds the provisioner
//! manages: identities (the shared credential store), namespaces, role
//! bindings plus quotas, and workspace descriptors. Everything above this
//! crate talks to the cluster through [`ClusterApi`] only.

pub mod error;
pub mod http;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

use async_trait::async_trait;
use pkg_types::identity::CredentialSet;
use pkg_types::namespace::Namespace;
use pkg_types::quota::ResourceQuota;
use pkg_types::rbac::RoleBinding;
use pkg_types::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use error::{GatewayError, Result};

/// The identity the gateway is authenticated as.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub name: String,
    #[serde(default)]
    pub cluster_admin: bool,
}

/// "Can `user` perform `verb` on `resource` in `namespace`?"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessReview {
    pub user: String,
    pub verb: String,
    pub resource: String,
    pub namespace: String,
}

/// Location of the shared credential store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    pub namespace: String,
    pub name: String,
}

impl SecretRef {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn whoami(&self) -> Result<Principal>;

    // --- Identities ---

    /// Current credential store contents, `None` if the store does not exist.
    async fn read_credentials(&self, store: &SecretRef) -> Result<Option<CredentialSet>>;

    /// Replace the whole store in one call.
    ///
    /// `set.revision` must equal the revision returned by the last read
    /// (`None` creates the store); otherwise the call fails with
    /// [`GatewayError::Conflict`]. Returns the set with its new revision.
    async fn replace_credentials(
        &self,
        store: &SecretRef,
        set: &CredentialSet,
    ) -> Result<CredentialSet>;

    // --- Namespaces ---

    /// Namespaces carrying every `key=value` label in `selector`.
    async fn list_namespaces(&self, selector: &HashMap<String, String>) -> Result<Vec<Namespace>>;
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>>;
    async fn create_namespace(&self, ns: &Namespace) -> Result<Namespace>;
    /// Deleting a namespace removes everything inside it.
    async fn delete_namespace(&self, name: &str) -> Result<()>;

    // --- Quotas and role bindings (declarative upsert) ---

    async fn apply_quota(&self, quota: &ResourceQuota) -> Result<()>;
    async fn list_quotas(&self, namespace: &str) -> Result<Vec<ResourceQuota>>;
    async fn apply_role_binding(&self, binding: &RoleBinding) -> Result<()>;
    async fn list_role_bindings(&self, namespace: &str) -> Result<Vec<RoleBinding>>;

    // --- Workspaces ---

    async fn list_workspaces(&self, namespace: &str) -> Result<Vec<Workspace>>;
    async fn get_workspace(&self, namespace: &str, name: &str) -> Result<Option<Workspace>>;
    async fn create_workspace(&self, workspace: &Workspace) -> Result<Workspace>;

    // --- Authorization ---

    async fn access_review(&self, review: &AccessReview) -> Result<bool>;

    /// Whether the cluster serves the workspace resource kind at all.
    async fn workspace_api_available(&self) -> Result<bool>;
}
