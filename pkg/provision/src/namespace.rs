//! Per-user namespace with quota and namespace-scoped admin binding.

use pkg_constants::labels;
use pkg_constants::provision::{ADMIN_ROLE, QUOTA_NAME, ROLE_BINDING_NAME, SERVICE_ACCOUNT};
use pkg_gateway::{ClusterApi, GatewayError};
use pkg_types::identity::User;
use pkg_types::namespace::Namespace;
use pkg_types::quota::ResourceQuota;
use pkg_types::rbac::{RoleBinding, Subject};
use pkg_types::snapshot::Snapshot;
use tracing::{info, warn};

use crate::detector::is_owned_by;
use crate::error::{ProvisionError, Result};
use crate::settings::ProvisionSettings;

/// Result of one ensure step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Created,
    Skipped,
}

/// The namespace object created for `user`, labelled for detection and cleanup.
pub fn namespace_for_user(user: &User) -> Namespace {
    Namespace::new(&user.namespace)
        .with_label(labels::OWNER, &user.username)
        .with_label(labels::DEPLOYMENT_TYPE, labels::DEPLOYMENT_TYPE_VALUE)
}

pub fn quota_for_user(user: &User, settings: &ProvisionSettings) -> ResourceQuota {
    ResourceQuota {
        name: QUOTA_NAME.to_string(),
        namespace: user.namespace.clone(),
        hard: settings.quota.clone(),
    }
}

/// Admin on the user's own namespace for the user and the workspace service account.
pub fn role_binding_for_user(user: &User) -> RoleBinding {
    RoleBinding {
        name: ROLE_BINDING_NAME.to_string(),
        namespace: user.namespace.clone(),
        role_ref: ADMIN_ROLE.to_string(),
        subjects: vec![
            Subject::user(&user.username),
            Subject::service_account(SERVICE_ACCOUNT, &user.namespace),
        ],
    }
}

pub struct NamespaceProvisioner<'a> {
    api: &'a dyn ClusterApi,
    settings: &'a ProvisionSettings,
}

impl<'a> NamespaceProvisioner<'a> {
    pub fn new(api: &'a dyn ClusterApi, settings: &'a ProvisionSettings) -> Self {
        Self { api, settings }
    }

    /// Create the namespace unless the snapshot has it, then (re-)apply quota
    /// and role binding so a half-configured namespace heals on re-run.
    ///
    /// A same-named namespace the workshop does not own fails the user
    /// without touching it.
    pub async fn ensure_namespace(
        &self,
        user: &User,
        snapshot: &Snapshot,
        dry_run: bool,
        actions: &mut Vec<String>,
    ) -> Result<StepOutcome> {
        let name = &user.namespace;
        if snapshot.is_unmanaged(name) {
            return Err(self.unmanaged(name));
        }
        let outcome = if snapshot.has_namespace(name) {
            info!("Namespace {} already exists, skipping creation", name);
            StepOutcome::Skipped
        } else if dry_run {
            actions.push(format!("create namespace {}", name));
            StepOutcome::Created
        } else {
            match self.api.create_namespace(&namespace_for_user(user)).await {
                Ok(_) => {
                    info!("Created namespace {} for {}", name, user.username);
                    actions.push(format!("created namespace {}", name));
                    StepOutcome::Created
                }
                Err(GatewayError::Conflict(_)) => {
                    let current = self
                        .api
                        .get_namespace(name)
                        .await
                        .map_err(|e| ProvisionError::cluster(format!("namespace {}", name), e))?;
                    if !current.is_some_and(|ns| is_owned_by(&ns, &user.username)) {
                        return Err(self.unmanaged(name));
                    }
                    warn!("Namespace {} appeared after detection, treating as existing", name);
                    StepOutcome::Skipped
                }
                Err(e) => return Err(ProvisionError::cluster(format!("namespace {}", name), e)),
            }
        };

        let quota = quota_for_user(user, self.settings);
        let binding = role_binding_for_user(user);
        if dry_run {
            actions.push(format!("apply quota {}/{}", name, quota.name));
            actions.push(format!("apply rolebinding {}/{}", name, binding.name));
            return Ok(outcome);
        }

        self.api
            .apply_quota(&quota)
            .await
            .map_err(|e| ProvisionError::cluster(format!("quota {}/{}", name, quota.name), e))?;
        self.api.apply_role_binding(&binding).await.map_err(|e| {
            ProvisionError::cluster(format!("rolebinding {}/{}", name, binding.name), e)
        })?;
        info!("Applied quota and rolebinding in {}", name);
        Ok(outcome)
    }

    fn unmanaged(&self, name: &str) -> ProvisionError {
        warn!("Namespace {} is not a workshop namespace, leaving it alone", name);
        ProvisionError::cluster(
            format!("namespace {}", name),
            GatewayError::Conflict(format!("{} exists without the workshop labels", name)),
        )
    }
}
