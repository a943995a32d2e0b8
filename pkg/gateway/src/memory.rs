//! In-process control plane implementing [`ClusterApi`].
//!
//! Behaves like the real API where the provisioner depends on it: namespace
//! deletion cascades, quotas reject oversized workspaces, access reviews are
//! answered from role bindings, and workspaces advance through their phases
//! as they are polled. Faults can be injected per namespace and on the
//! credential store.

use async_trait::async_trait;
use chrono::Utc;
use pkg_types::identity::CredentialSet;
use pkg_types::namespace::Namespace;
use pkg_types::quota::ResourceQuota;
use pkg_types::rbac::RoleBinding;
use pkg_types::workspace::{Workspace, WorkspacePhase};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::error::{GatewayError, Result};
use crate::{AccessReview, ClusterApi, Principal, SecretRef};

/// How a workspace progresses once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceBehavior {
    /// Reaches `Running` on the n-th phase read.
    ReadyAfter(u32),
    /// Reaches `Failed` with the message on the n-th phase read.
    FailAfter(u32, String),
    /// Stays `Starting` forever.
    NeverReady,
}

/// How the next credential store replace fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialFault {
    /// Another writer replaced the store after it was read.
    Conflict,
    /// The API server could not be reached.
    Unavailable,
}

struct WorkspaceRecord {
    workspace: Workspace,
    polls: u32,
}

struct State {
    principal: Principal,
    authenticated: bool,
    workspace_api: bool,
    credentials: HashMap<(String, String), (CredentialSet, u64)>,
    namespaces: BTreeMap<String, Namespace>,
    quotas: BTreeMap<(String, String), ResourceQuota>,
    bindings: BTreeMap<(String, String), RoleBinding>,
    workspaces: BTreeMap<(String, String), WorkspaceRecord>,
    default_behavior: WorkspaceBehavior,
    behaviors: HashMap<String, WorkspaceBehavior>,
    failing_namespaces: HashSet<String>,
    credential_fault: Option<CredentialFault>,
    mutations: usize,
}

pub struct InMemoryCluster {
    state: Mutex<State>,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    /// An empty cluster, authenticated as a cluster admin. Workspaces become
    /// ready on their first phase read.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                principal: Principal {
                    name: "admin".to_string(),
                    cluster_admin: true,
                },
                authenticated: true,
                workspace_api: true,
                credentials: HashMap::new(),
                namespaces: BTreeMap::new(),
                quotas: BTreeMap::new(),
                bindings: BTreeMap::new(),
                workspaces: BTreeMap::new(),
                default_behavior: WorkspaceBehavior::ReadyAfter(1),
                behaviors: HashMap::new(),
                failing_namespaces: HashSet::new(),
                credential_fault: None,
                mutations: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- Scenario setup ---

    pub fn set_principal(&self, name: &str, cluster_admin: bool) {
        self.state().principal = Principal {
            name: name.to_string(),
            cluster_admin,
        };
    }

    /// Reject every call as unauthenticated.
    pub fn log_out(&self) {
        self.state().authenticated = false;
    }

    pub fn set_workspace_api(&self, available: bool) {
        self.state().workspace_api = available;
    }

    pub fn set_default_workspace_behavior(&self, behavior: WorkspaceBehavior) {
        self.state().default_behavior = behavior;
    }

    pub fn set_workspace_behavior(&self, namespace: &str, behavior: WorkspaceBehavior) {
        self.state()
            .behaviors
            .insert(namespace.to_string(), behavior);
    }

    /// Make creation of this namespace fail with a transient error.
    pub fn fail_namespace_create(&self, name: &str) {
        self.state().failing_namespaces.insert(name.to_string());
    }

    pub fn fail_next_credential_write(&self, fault: CredentialFault) {
        self.state().credential_fault = Some(fault);
    }

    /// Seed the credential store without counting as a mutation.
    pub fn seed_credentials(&self, store: &SecretRef, set: CredentialSet) {
        self.state().credentials.insert(
            (store.namespace.clone(), store.name.clone()),
            (set, 1),
        );
    }

    /// Drop a quota behind the provisioner's back.
    pub fn remove_quota(&self, namespace: &str, name: &str) {
        self.state()
            .quotas
            .remove(&(namespace.to_string(), name.to_string()));
    }

    // --- Inspection ---

    /// Number of mutating calls served so far.
    pub fn mutation_count(&self) -> usize {
        self.state().mutations
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.state().namespaces.keys().cloned().collect()
    }

    pub fn credentials(&self, store: &SecretRef) -> Option<CredentialSet> {
        self.state()
            .credentials
            .get(&(store.namespace.clone(), store.name.clone()))
            .map(|(set, _)| set.clone())
    }

    pub fn workspace(&self, namespace: &str, name: &str) -> Option<Workspace> {
        self.state()
            .workspaces
            .get(&(namespace.to_string(), name.to_string()))
            .map(|r| r.workspace.clone())
    }

    pub fn workspace_count(&self) -> usize {
        self.state().workspaces.len()
    }
}

impl State {
    fn check_auth(&self) -> Result<()> {
        if self.authenticated {
            Ok(())
        } else {
            Err(GatewayError::Unauthenticated("token rejected".to_string()))
        }
    }

    fn require_namespace(&self, name: &str) -> Result<()> {
        if self.namespaces.contains_key(name) {
            Ok(())
        } else {
            Err(GatewayError::NotFound(format!("namespace {}", name)))
        }
    }

    fn check_quota(&self, workspace: &Workspace) -> Result<()> {
        let ns = &workspace.namespace;
        let pods = self.workspaces.keys().filter(|(n, _)| n == ns).count() as u32 + 1;
        for ((qns, _), quota) in &self.quotas {
            if qns != ns {
                continue;
            }
            let hard = &quota.hard;
            let spec = &workspace.spec;
            if spec.total_memory_limit() > hard.memory_limit.bytes()
                || spec.total_memory_request() > hard.memory_request.bytes()
                || spec.total_cpu_request() > hard.cpu_request.0
                || pods > hard.max_pods
            {
                return Err(GatewayError::QuotaExceeded(format!(
                    "workspace {} exceeded quota {}",
                    workspace.id(),
                    quota.name
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterApi for InMemoryCluster {
    async fn whoami(&self) -> Result<Principal> {
        let state = self.state();
        state.check_auth()?;
        Ok(state.principal.clone())
    }

    async fn read_credentials(&self, store: &SecretRef) -> Result<Option<CredentialSet>> {
        let state = self.state();
        state.check_auth()?;
        Ok(state
            .credentials
            .get(&(store.namespace.clone(), store.name.clone()))
            .map(|(set, rev)| CredentialSet {
                entries: set.entries.clone(),
                revision: Some(rev.to_string()),
            }))
    }

    async fn replace_credentials(
        &self,
        store: &SecretRef,
        set: &CredentialSet,
    ) -> Result<CredentialSet> {
        let mut state = self.state();
        state.check_auth()?;
        match state.credential_fault.take() {
            Some(CredentialFault::Conflict) => {
                return Err(GatewayError::Conflict(format!(
                    "credential store {} changed since it was read",
                    store
                )));
            }
            Some(CredentialFault::Unavailable) => {
                return Err(GatewayError::Transient(format!(
                    "credential store {} unavailable",
                    store
                )));
            }
            None => {}
        }
        let key = (store.namespace.clone(), store.name.clone());
        let current = state.credentials.get(&key).map(|(_, rev)| rev.to_string());
        if current != set.revision {
            return Err(GatewayError::Conflict(format!(
                "credential store {} changed since it was read",
                store
            )));
        }
        let next = state.credentials.get(&key).map_or(1, |(_, rev)| rev + 1);
        let stored = CredentialSet {
            entries: set.entries.clone(),
            revision: None,
        };
        state.credentials.insert(key, (stored, next));
        state.mutations += 1;
        Ok(CredentialSet {
            entries: set.entries.clone(),
            revision: Some(next.to_string()),
        })
    }

    async fn list_namespaces(&self, selector: &HashMap<String, String>) -> Result<Vec<Namespace>> {
        let state = self.state();
        state.check_auth()?;
        Ok(state
            .namespaces
            .values()
            .filter(|ns| ns.matches(selector))
            .cloned()
            .collect())
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        let state = self.state();
        state.check_auth()?;
        Ok(state.namespaces.get(name).cloned())
    }

    async fn create_namespace(&self, ns: &Namespace) -> Result<Namespace> {
        let mut state = self.state();
        state.check_auth()?;
        if state.failing_namespaces.contains(&ns.name) {
            return Err(GatewayError::Transient(format!(
                "namespace {} could not be admitted",
                ns.name
            )));
        }
        if state.namespaces.contains_key(&ns.name) {
            return Err(GatewayError::Conflict(format!("namespace {}", ns.name)));
        }
        let mut created = ns.clone();
        created.created_at = Some(Utc::now());
        state.namespaces.insert(ns.name.clone(), created.clone());
        state.mutations += 1;
        Ok(created)
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        state.check_auth()?;
        if state.namespaces.remove(name).is_none() {
            return Err(GatewayError::NotFound(format!("namespace {}", name)));
        }
        state.quotas.retain(|(ns, _), _| ns != name);
        state.bindings.retain(|(ns, _), _| ns != name);
        state.workspaces.retain(|(ns, _), _| ns != name);
        state.mutations += 1;
        Ok(())
    }

    async fn apply_quota(&self, quota: &ResourceQuota) -> Result<()> {
        let mut state = self.state();
        state.check_auth()?;
        state.require_namespace(&quota.namespace)?;
        state.quotas.insert(
            (quota.namespace.clone(), quota.name.clone()),
            quota.clone(),
        );
        state.mutations += 1;
        Ok(())
    }

    async fn list_quotas(&self, namespace: &str) -> Result<Vec<ResourceQuota>> {
        let state = self.state();
        state.check_auth()?;
        Ok(state
            .quotas
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, q)| q.clone())
            .collect())
    }

    async fn apply_role_binding(&self, binding: &RoleBinding) -> Result<()> {
        let mut state = self.state();
        state.check_auth()?;
        state.require_namespace(&binding.namespace)?;
        state.bindings.insert(
            (binding.namespace.clone(), binding.name.clone()),
            binding.clone(),
        );
        state.mutations += 1;
        Ok(())
    }

    async fn list_role_bindings(&self, namespace: &str) -> Result<Vec<RoleBinding>> {
        let state = self.state();
        state.check_auth()?;
        Ok(state
            .bindings
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn list_workspaces(&self, namespace: &str) -> Result<Vec<Workspace>> {
        let state = self.state();
        state.check_auth()?;
        Ok(state
            .workspaces
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, r)| r.workspace.clone())
            .collect())
    }

    async fn get_workspace(&self, namespace: &str, name: &str) -> Result<Option<Workspace>> {
        let mut state = self.state();
        state.check_auth()?;
        let behavior = state
            .behaviors
            .get(namespace)
            .cloned()
            .unwrap_or_else(|| state.default_behavior.clone());
        let key = (namespace.to_string(), name.to_string());
        let Some(record) = state.workspaces.get_mut(&key) else {
            return Ok(None);
        };
        if record.workspace.status.phase == WorkspacePhase::Starting {
            record.polls += 1;
            match behavior {
                WorkspaceBehavior::ReadyAfter(n) if record.polls >= n => {
                    record.workspace.status.phase = WorkspacePhase::Running;
                    record.workspace.status.url = Some(format!(
                        "https://{}.{}.apps.cluster.local",
                        name, namespace
                    ));
                }
                WorkspaceBehavior::FailAfter(n, ref message) if record.polls >= n => {
                    record.workspace.status.phase = WorkspacePhase::Failed;
                    record.workspace.status.message = Some(message.clone());
                }
                _ => {}
            }
        }
        Ok(Some(record.workspace.clone()))
    }

    async fn create_workspace(&self, workspace: &Workspace) -> Result<Workspace> {
        let mut state = self.state();
        state.check_auth()?;
        state.require_namespace(&workspace.namespace)?;
        let key = (workspace.namespace.clone(), workspace.name.clone());
        if state.workspaces.contains_key(&key) {
            return Err(GatewayError::Conflict(format!("workspace {}", workspace.id())));
        }
        state.check_quota(workspace)?;
        let mut created = workspace.clone();
        created.created_at = Some(Utc::now());
        created.status.phase = if workspace.spec.started {
            WorkspacePhase::Starting
        } else {
            WorkspacePhase::Stopped
        };
        state.workspaces.insert(
            key,
            WorkspaceRecord {
                workspace: created.clone(),
                polls: 0,
            },
        );
        state.mutations += 1;
        Ok(created)
    }

    async fn access_review(&self, review: &AccessReview) -> Result<bool> {
        let state = self.state();
        state.check_auth()?;
        if !state.namespaces.contains_key(&review.namespace) {
            return Ok(false);
        }
        Ok(state
            .bindings
            .iter()
            .filter(|((ns, _), _)| ns == &review.namespace)
            .any(|(_, b)| b.binds_user(&review.user)))
    }

    async fn workspace_api_available(&self) -> Result<bool> {
        let state = self.state();
        state.check_auth()?;
        Ok(state.workspace_api)
    }
}
