//! Batch controller: resolves the user list and drives every user through
//! the provisioning or cleanup chain with a bounded number in flight.

use futures_util::{StreamExt, TryStreamExt, stream};
use pkg_gateway::{ClusterApi, GatewayError};
use pkg_types::batch::{BatchMode, BatchReport, Outcome, UserResult};
use pkg_types::identity::{User, UserStatus};
use pkg_types::snapshot::Snapshot;
use pkg_types::workspace::WorkspacePhase;
use tracing::{debug, error, info, warn};

use crate::detector::{UserPattern, detect};
use crate::error::{ProvisionError, Result};
use crate::identity::{IdentityOutcome, ensure_users};
use crate::namespace::{NamespaceProvisioner, StepOutcome};
use crate::settings::ProvisionSettings;
use crate::users::UserSource;
use crate::workspace::{Readiness, WorkspaceOrchestrator};

/// Asks the operator before anything is deleted.
pub trait Confirm: Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F: Fn(&str) -> bool + Sync> Confirm for F {
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Read and plan only; no mutating call is issued.
    pub dry_run: bool,
    /// Skip the cleanup confirmation.
    pub force: bool,
    /// Leave users whose namespace and workspace both exist completely alone.
    pub incremental: bool,
}

pub struct BatchController<'a> {
    api: &'a dyn ClusterApi,
    settings: &'a ProvisionSettings,
}

impl<'a> BatchController<'a> {
    pub fn new(api: &'a dyn ClusterApi, settings: &'a ProvisionSettings) -> Self {
        Self { api, settings }
    }

    /// Fail fast unless the caller is logged in as a cluster admin.
    pub async fn require_admin(&self) -> Result<String> {
        let principal = self.api.whoami().await.map_err(ProvisionError::Auth)?;
        if !principal.cluster_admin {
            return Err(ProvisionError::Auth(GatewayError::Forbidden(format!(
                "{} is not a cluster admin",
                principal.name
            ))));
        }
        info!("Authenticated as {}", principal.name);
        Ok(principal.name)
    }

    /// Usage checks, authentication and detection shared by every mode.
    pub async fn prepare(&self, source: &UserSource) -> Result<(Vec<String>, Snapshot)> {
        self.settings.validate()?;
        let requested = source
            .resolve_static(&self.settings.prefix, &self.settings.suffix)?
            .unwrap_or_default();
        self.require_admin().await?;
        let pattern = UserPattern::for_prefix(&self.settings.prefix)?;
        let snapshot = detect(self.api, self.settings, &pattern, &requested).await?;
        let users = source.resolve(&self.settings.prefix, &self.settings.suffix, &snapshot)?;
        Ok((users, snapshot))
    }

    /// Provision every resolved user.
    ///
    /// Credentials for the whole batch are written once before any user is
    /// processed. Per-user failures are recorded and the batch carries on;
    /// only fatal errors (authentication, credential store) end it early.
    pub async fn run_provision(
        &self,
        source: &UserSource,
        password: &str,
        options: BatchOptions,
    ) -> Result<BatchReport> {
        if password.is_empty() {
            return Err(ProvisionError::usage("password must not be empty"));
        }
        let (users, snapshot) = self.prepare(source).await?;
        info!(
            "Provisioning {} users with concurrency {}{}",
            users.len(),
            self.settings.concurrency,
            if options.dry_run { " (dry run)" } else { "" }
        );

        let identities = ensure_users(
            self.api,
            &self.settings.credential_store,
            &users,
            password,
            options.dry_run,
        )
        .await?;

        let results: Vec<UserResult> = stream::iter(users.iter())
            .map(|username| self.provision_user(username, &snapshot, &identities, options))
            .buffered(self.settings.concurrency)
            .try_collect()
            .await?;

        let mut report = BatchReport::new(BatchMode::Provision, options.dry_run);
        for result in results {
            report.record(result);
        }
        info!(
            "Provisioning finished: {} created, {} skipped, {} failed",
            report.created_count(),
            report.skipped_count(),
            report.failed_count()
        );
        Ok(report)
    }

    /// One user's chain: namespace, quota and binding, workspace, readiness.
    async fn provision_user(
        &self,
        username: &str,
        snapshot: &Snapshot,
        identities: &IdentityOutcome,
        options: BatchOptions,
    ) -> Result<UserResult> {
        let mut user = User::new(username, &self.settings.suffix);
        let orchestrator = WorkspaceOrchestrator::new(self.api, self.settings);
        let handle = orchestrator.handle_for(&user);
        let mut actions = Vec::new();
        if identities.touched(username) {
            actions.push(if options.dry_run {
                format!("write credentials for {}", username)
            } else {
                format!("wrote credentials for {}", username)
            });
        }

        if options.incremental
            && snapshot.has_namespace(&user.namespace)
            && snapshot.workspace(&handle.namespace, &handle.name).is_some()
        {
            info!("{} already provisioned, skipping (incremental)", username);
            let outcome = if actions.is_empty() {
                Outcome::Skipped
            } else {
                Outcome::Created
            };
            let mut result = UserResult::new(username, outcome);
            result.actions = actions;
            return Ok(result);
        }

        let step = self.provision_steps(&mut user, snapshot, options, &mut actions).await;
        match step {
            Ok(created) => {
                debug!("{} is {}", username, user.status);
                let outcome = if created || identities.touched(username) {
                    Outcome::Created
                } else {
                    Outcome::Skipped
                };
                let mut result = UserResult::new(username, outcome);
                result.actions = actions;
                Ok(result)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!("Provisioning {} failed: {}", username, e);
                Ok(UserResult::failed(
                    username,
                    actions,
                    format!("[{}] {}", e.category(), e),
                ))
            }
        }
    }

    /// Returns whether anything was (or would be) created.
    async fn provision_steps(
        &self,
        user: &mut User,
        snapshot: &Snapshot,
        options: BatchOptions,
        actions: &mut Vec<String>,
    ) -> Result<bool> {
        let ns = NamespaceProvisioner::new(self.api, self.settings)
            .ensure_namespace(user, snapshot, options.dry_run, actions)
            .await?;
        let orchestrator = WorkspaceOrchestrator::new(self.api, self.settings);
        let deployment = orchestrator
            .deploy_workspace(user, snapshot, options.dry_run, actions)
            .await?;
        user.status = UserStatus::Provisioned;
        let created = ns == StepOutcome::Created || deployment.created;
        if options.dry_run {
            return Ok(created);
        }

        match deployment.phase {
            WorkspacePhase::Failed => {
                let message = snapshot
                    .workspace(&deployment.handle.namespace, &deployment.handle.name)
                    .and_then(|w| w.status.message.clone())
                    .unwrap_or_else(|| "workspace is in phase Failed".to_string());
                return Readiness::Failed { message }
                    .into_result(&deployment.handle)
                    .map(|_| created);
            }
            WorkspacePhase::Running | WorkspacePhase::Stopped => {}
            WorkspacePhase::Starting => {
                let url = orchestrator
                    .await_ready(&deployment.handle, self.settings.readiness)
                    .await?
                    .into_result(&deployment.handle)?;
                if let Some(url) = url {
                    info!("Workspace {} serving at {}", deployment.handle, url);
                }
            }
        }
        user.status = UserStatus::Ready;
        Ok(created)
    }

    /// Delete the namespaces of every resolved user.
    ///
    /// Workspaces go with their namespace. Credential entries are kept. Only
    /// namespaces carrying the workshop labels for their user are deleted.
    pub async fn run_cleanup(
        &self,
        source: &UserSource,
        options: BatchOptions,
        confirm: &dyn Confirm,
    ) -> Result<BatchReport> {
        let (users, snapshot) = self.prepare(source).await?;
        let targets: Vec<&String> = users
            .iter()
            .filter(|u| snapshot.has_namespace(&self.settings.namespace_for(u)))
            .collect();

        if !options.dry_run && !options.force && !targets.is_empty() {
            let names: Vec<String> = targets
                .iter()
                .map(|u| self.settings.namespace_for(u))
                .collect();
            let prompt = format!(
                "Delete {} namespaces ({}) and everything in them?",
                names.len(),
                names.join(", ")
            );
            if !confirm.confirm(&prompt) {
                warn!("Cleanup declined, nothing removed");
                return Err(ProvisionError::Aborted);
            }
        }

        let results: Vec<UserResult> = stream::iter(users.iter())
            .map(|username| self.cleanup_user(username, &snapshot, options))
            .buffered(self.settings.concurrency)
            .try_collect()
            .await?;

        let mut report = BatchReport::new(BatchMode::Cleanup, options.dry_run);
        for result in results {
            report.record(result);
        }
        info!(
            "Cleanup finished: {} removed, {} skipped, {} failed",
            report.created_count(),
            report.skipped_count(),
            report.failed_count()
        );
        Ok(report)
    }

    async fn cleanup_user(
        &self,
        username: &str,
        snapshot: &Snapshot,
        options: BatchOptions,
    ) -> Result<UserResult> {
        let mut user = User::new(username, &self.settings.suffix);
        let mut actions = Vec::new();
        if snapshot.has_identity(username) {
            actions.push(format!("kept credential entry for {}", username));
        }
        if snapshot.is_unmanaged(&user.namespace) {
            warn!(
                "Namespace {} is not a workshop namespace of {}, leaving it",
                user.namespace, username
            );
            actions.push(format!("left unmanaged namespace {}", user.namespace));
            let mut result = UserResult::new(username, Outcome::Skipped);
            result.actions = actions;
            return Ok(result);
        }
        if !snapshot.has_namespace(&user.namespace) {
            info!("Namespace {} not found, nothing to remove", user.namespace);
            let mut result = UserResult::new(username, Outcome::Skipped);
            result.actions = actions;
            return Ok(result);
        }
        if options.dry_run {
            actions.push(format!("delete namespace {}", user.namespace));
            let mut result = UserResult::new(username, Outcome::Created);
            result.actions = actions;
            return Ok(result);
        }

        let outcome = match self.api.delete_namespace(&user.namespace).await {
            Ok(()) => {
                info!("Deleted namespace {}", user.namespace);
                actions.push(format!("deleted namespace {}", user.namespace));
                user.status = UserStatus::Removed;
                Outcome::Created
            }
            Err(e) if e.is_not_found() => {
                warn!("Namespace {} vanished before deletion", user.namespace);
                Outcome::Skipped
            }
            Err(e) => {
                let e = ProvisionError::cluster(format!("namespace {}", user.namespace), e);
                if e.is_fatal() {
                    return Err(e);
                }
                error!("Removing {} failed: {}", username, e);
                return Ok(UserResult::failed(
                    username,
                    actions,
                    format!("[{}] {}", e.category(), e),
                ));
            }
        };
        debug!("{} is {}", username, user.status);
        let mut result = UserResult::new(username, outcome);
        result.actions = actions;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::WorkspaceTemplate;
    use pkg_gateway::memory::{CredentialFault, InMemoryCluster};

    fn settings() -> ProvisionSettings {
        ProvisionSettings::new("u", "ws", &WorkspaceTemplate::default()).unwrap()
    }

    #[tokio::test]
    async fn usage_errors_precede_cluster_calls() {
        let cluster = InMemoryCluster::new();
        cluster.log_out();
        let settings = settings();
        let controller = BatchController::new(&cluster, &settings);

        let err = controller
            .run_provision(&UserSource::Count(0), "p1", BatchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.category(), "usage");

        let err = controller
            .run_provision(&UserSource::Count(101), "p1", BatchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.category(), "usage");

        let err = controller
            .run_provision(&UserSource::Count(2), "", BatchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.category(), "usage");
    }

    #[tokio::test]
    async fn logged_out_fails_fast() {
        let cluster = InMemoryCluster::new();
        cluster.log_out();
        let settings = settings();
        let err = BatchController::new(&cluster, &settings)
            .run_provision(&UserSource::Count(2), "p1", BatchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.category(), "auth");
        assert!(cluster.namespace_names().is_empty());
    }

    #[tokio::test]
    async fn non_admin_is_rejected() {
        let cluster = InMemoryCluster::new();
        cluster.set_principal("developer", false);
        let settings = settings();
        let err = BatchController::new(&cluster, &settings)
            .run_cleanup(&UserSource::Count(1), BatchOptions::default(), &|_: &str| true)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "auth");
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_issues_no_mutation() {
        let cluster = InMemoryCluster::new();
        let settings = settings();
        let options = BatchOptions {
            dry_run: true,
            ..BatchOptions::default()
        };
        let report = BatchController::new(&cluster, &settings)
            .run_provision(&UserSource::Count(3), "p1", options)
            .await
            .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.created_count(), 3);
        assert_eq!(cluster.mutation_count(), 0);
        assert!(report.results[0].actions.iter().any(|a| a.contains("u1-ws")));
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_decline_removes_nothing() {
        let cluster = InMemoryCluster::new();
        let settings = settings();
        let controller = BatchController::new(&cluster, &settings);
        controller
            .run_provision(&UserSource::Count(1), "p1", BatchOptions::default())
            .await
            .unwrap();

        let err = controller
            .run_cleanup(&UserSource::Count(1), BatchOptions::default(), &|_: &str| false)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Aborted));
        assert_eq!(cluster.namespace_names(), vec!["u1-ws".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_of_absent_namespace_is_skipped() {
        let cluster = InMemoryCluster::new();
        let settings = settings();
        let report = BatchController::new(&cluster, &settings)
            .run_cleanup(
                &UserSource::List(vec!["u7".to_string()]),
                BatchOptions::default(),
                &|_: &str| -> bool { panic!("nothing to confirm") },
            )
            .await
            .unwrap();
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.total(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_credential_write_ends_the_batch() {
        for fault in [CredentialFault::Conflict, CredentialFault::Unavailable] {
            let cluster = InMemoryCluster::new();
            cluster.fail_next_credential_write(fault);
            let settings = settings();
            let err = BatchController::new(&cluster, &settings)
                .run_provision(&UserSource::Count(3), "p1", BatchOptions::default())
                .await
                .unwrap_err();
            assert_eq!(err.category(), "credential-store");
            assert!(err.is_fatal());
            assert!(cluster.namespace_names().is_empty());
            assert_eq!(cluster.workspace_count(), 0);
            assert_eq!(cluster.mutation_count(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_dry_run_removes_nothing() {
        let cluster = InMemoryCluster::new();
        let settings = settings();
        let controller = BatchController::new(&cluster, &settings);
        controller
            .run_provision(&UserSource::Count(2), "p1", BatchOptions::default())
            .await
            .unwrap();
        let before = cluster.mutation_count();

        let options = BatchOptions {
            dry_run: true,
            ..BatchOptions::default()
        };
        let report = controller
            .run_cleanup(&UserSource::Count(2), options, &|_: &str| -> bool {
                panic!("dry run never prompts")
            })
            .await
            .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.created_count(), 2);
        assert!(
            report.results[0]
                .actions
                .iter()
                .any(|a| a == "delete namespace u1-ws")
        );
        assert_eq!(cluster.mutation_count(), before);
        assert_eq!(cluster.namespace_names(), vec!["u1-ws", "u2-ws"]);
        assert_eq!(cluster.workspace_count(), 2);
    }
}
