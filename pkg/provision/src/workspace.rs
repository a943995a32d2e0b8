//! Workspace deployment and readiness polling.

use pkg_gateway::{ClusterApi, GatewayError};
use pkg_types::identity::User;
use pkg_types::snapshot::Snapshot;
use pkg_types::workspace::{Workspace, WorkspacePhase};
use std::fmt;
use tracing::{debug, error, info, warn};

use crate::error::{ProvisionError, Result};
use crate::settings::{ProvisionSettings, ReadinessPolicy};

/// Identifies one user's workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceHandle {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for WorkspaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct Deployment {
    pub handle: WorkspaceHandle,
    /// False when the workspace already existed.
    pub created: bool,
    /// Phase as last seen; `Starting` for fresh deployments.
    pub phase: WorkspacePhase,
}

/// Terminal state of a readiness wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Running { url: Option<String> },
    Failed { message: String },
    TimedOut { attempts: u32 },
}

impl Readiness {
    pub fn into_result(self, handle: &WorkspaceHandle) -> Result<Option<String>> {
        match self {
            Readiness::Running { url } => Ok(url),
            Readiness::Failed { message } => Err(ProvisionError::WorkspaceFailed {
                workspace: handle.to_string(),
                message,
            }),
            Readiness::TimedOut { attempts } => Err(ProvisionError::TimedOut {
                workspace: handle.to_string(),
                attempts,
            }),
        }
    }
}

pub struct WorkspaceOrchestrator<'a> {
    api: &'a dyn ClusterApi,
    settings: &'a ProvisionSettings,
}

impl<'a> WorkspaceOrchestrator<'a> {
    pub fn new(api: &'a dyn ClusterApi, settings: &'a ProvisionSettings) -> Self {
        Self { api, settings }
    }

    pub fn handle_for(&self, user: &User) -> WorkspaceHandle {
        WorkspaceHandle {
            namespace: user.namespace.clone(),
            name: self.settings.workspace_name.clone(),
        }
    }

    /// Create the user's workspace unless the snapshot already holds one with
    /// the same identifier.
    pub async fn deploy_workspace(
        &self,
        user: &User,
        snapshot: &Snapshot,
        dry_run: bool,
        actions: &mut Vec<String>,
    ) -> Result<Deployment> {
        let handle = self.handle_for(user);
        if let Some(existing) = snapshot.workspace(&handle.namespace, &handle.name) {
            info!(
                "Workspace {} already exists (phase {}), skipping",
                handle, existing.status.phase
            );
            return Ok(Deployment {
                handle,
                created: false,
                phase: existing.status.phase,
            });
        }

        if dry_run {
            actions.push(format!("create workspace {}", handle));
            return Ok(Deployment {
                handle,
                created: true,
                phase: WorkspacePhase::Stopped,
            });
        }

        let workspace = Workspace::new(
            &handle.name,
            &handle.namespace,
            self.settings.workspace_spec.clone(),
        );
        let created = self
            .api
            .create_workspace(&workspace)
            .await
            .map_err(|e| ProvisionError::cluster(format!("workspace {}", handle), e))?;
        info!("Created workspace {} for {}", handle, user.username);
        actions.push(format!("created workspace {}", handle));
        Ok(Deployment {
            handle,
            created: true,
            phase: created.status.phase,
        })
    }

    /// Poll the workspace phase until it settles or the attempt budget runs out.
    ///
    /// Transient read errors count as a spent attempt. Authentication errors
    /// abort the wait.
    pub async fn await_ready(
        &self,
        handle: &WorkspaceHandle,
        policy: ReadinessPolicy,
    ) -> Result<Readiness> {
        for attempt in 1..=policy.max_attempts {
            match self.api.get_workspace(&handle.namespace, &handle.name).await {
                Ok(Some(ws)) => match ws.status.phase {
                    WorkspacePhase::Running => {
                        info!("Workspace {} is running", handle);
                        return Ok(Readiness::Running { url: ws.status.url });
                    }
                    WorkspacePhase::Failed => {
                        let message = ws
                            .status
                            .message
                            .clone()
                            .unwrap_or_else(|| "no reason reported".to_string());
                        dump_diagnostics(&ws);
                        return Ok(Readiness::Failed { message });
                    }
                    phase => debug!(
                        "Workspace {} is {} (check {}/{})",
                        handle, phase, attempt, policy.max_attempts
                    ),
                },
                Ok(None) => {
                    return Ok(Readiness::Failed {
                        message: "workspace disappeared while starting".to_string(),
                    });
                }
                Err(e) if e.is_auth() => return Err(ProvisionError::Auth(e)),
                Err(e @ GatewayError::Transient(_)) => {
                    warn!("Check {} for workspace {} failed: {}", attempt, handle, e);
                }
                Err(e) => {
                    return Err(ProvisionError::cluster(format!("workspace {}", handle), e));
                }
            }
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }
        warn!(
            "Workspace {} not running after {} checks",
            handle, policy.max_attempts
        );
        Ok(Readiness::TimedOut {
            attempts: policy.max_attempts,
        })
    }
}

fn dump_diagnostics(ws: &Workspace) {
    error!(
        "Workspace {} failed: {}",
        ws.id(),
        ws.status.message.as_deref().unwrap_or("no reason reported")
    );
    for c in &ws.spec.components {
        error!(
            "  component {} image={} cpu={}..{} memory={}..{}",
            c.name,
            c.image,
            c.resources.cpu_request,
            c.resources.cpu_limit,
            c.resources.memory_request,
            c.resources.memory_limit
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::NamespaceProvisioner;
    use crate::settings::WorkspaceTemplate;
    use pkg_gateway::memory::{InMemoryCluster, WorkspaceBehavior};
    use std::time::Duration;

    fn settings() -> ProvisionSettings {
        ProvisionSettings::new("u", "ws", &WorkspaceTemplate::default()).unwrap()
    }

    async fn cluster_with_namespace(settings: &ProvisionSettings, user: &User) -> InMemoryCluster {
        let cluster = InMemoryCluster::new();
        NamespaceProvisioner::new(&cluster, settings)
            .ensure_namespace(user, &Snapshot::default(), false, &mut Vec::new())
            .await
            .unwrap();
        cluster
    }

    fn policy(max_attempts: u32) -> ReadinessPolicy {
        ReadinessPolicy {
            interval: Duration::from_secs(10),
            max_attempts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deploys_and_becomes_ready() {
        let settings = settings();
        let user = User::new("u1", "ws");
        let cluster = cluster_with_namespace(&settings, &user).await;
        cluster.set_default_workspace_behavior(WorkspaceBehavior::ReadyAfter(3));

        let orchestrator = WorkspaceOrchestrator::new(&cluster, &settings);
        let deployment = orchestrator
            .deploy_workspace(&user, &Snapshot::default(), false, &mut Vec::new())
            .await
            .unwrap();
        assert!(deployment.created);
        assert_eq!(deployment.phase, WorkspacePhase::Starting);

        let start = tokio::time::Instant::now();
        let readiness = orchestrator
            .await_ready(&deployment.handle, policy(5))
            .await
            .unwrap();
        assert!(matches!(readiness, Readiness::Running { url: Some(_) }));
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_time_out() {
        let settings = settings();
        let user = User::new("u1", "ws");
        let cluster = cluster_with_namespace(&settings, &user).await;
        cluster.set_default_workspace_behavior(WorkspaceBehavior::NeverReady);

        let orchestrator = WorkspaceOrchestrator::new(&cluster, &settings);
        let deployment = orchestrator
            .deploy_workspace(&user, &Snapshot::default(), false, &mut Vec::new())
            .await
            .unwrap();
        let start = tokio::time::Instant::now();
        let readiness = orchestrator
            .await_ready(&deployment.handle, policy(4))
            .await
            .unwrap();
        assert_eq!(readiness, Readiness::TimedOut { attempts: 4 });
        assert_eq!(start.elapsed(), Duration::from_secs(30));

        let err = readiness.into_result(&deployment.handle).unwrap_err();
        assert_eq!(err.category(), "timed-out");
        assert!(!err.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_phase_is_surfaced() {
        let settings = settings();
        let user = User::new("u1", "ws");
        let cluster = cluster_with_namespace(&settings, &user).await;
        cluster.set_workspace_behavior(
            "u1-ws",
            WorkspaceBehavior::FailAfter(2, "image pull backoff".to_string()),
        );

        let orchestrator = WorkspaceOrchestrator::new(&cluster, &settings);
        let deployment = orchestrator
            .deploy_workspace(&user, &Snapshot::default(), false, &mut Vec::new())
            .await
            .unwrap();
        let readiness = orchestrator
            .await_ready(&deployment.handle, policy(10))
            .await
            .unwrap();
        assert_eq!(
            readiness,
            Readiness::Failed {
                message: "image pull backoff".to_string()
            }
        );
    }

    #[tokio::test]
    async fn existing_workspace_is_not_redeployed() {
        let settings = settings();
        let user = User::new("u1", "ws");
        let cluster = cluster_with_namespace(&settings, &user).await;
        let orchestrator = WorkspaceOrchestrator::new(&cluster, &settings);
        orchestrator
            .deploy_workspace(&user, &Snapshot::default(), false, &mut Vec::new())
            .await
            .unwrap();
        let before = cluster.mutation_count();

        let snapshot = Snapshot {
            workspaces: cluster.list_workspaces("u1-ws").await.unwrap(),
            ..Snapshot::default()
        };
        let deployment = orchestrator
            .deploy_workspace(&user, &snapshot, false, &mut Vec::new())
            .await
            .unwrap();
        assert!(!deployment.created);
        assert_eq!(cluster.mutation_count(), before);
    }

    #[tokio::test]
    async fn missing_namespace_fails_the_deploy() {
        let settings = settings();
        let cluster = InMemoryCluster::new();
        let err = WorkspaceOrchestrator::new(&cluster, &settings)
            .deploy_workspace(&User::new("u9", "ws"), &Snapshot::default(), false, &mut Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.category(), "cluster");
    }
}
