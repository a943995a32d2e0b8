//! Per-user checks against the live cluster.
//!
//! Every check is independent and ends as pass, fail or skip. A gateway error
//! fails the check it occurred in; only authentication problems stop the run.

use pkg_constants::network::PROBE_TIMEOUT_SECS;
use pkg_constants::provision::{QUOTA_NAME, ROLE_BINDING_NAME};
use pkg_gateway::{AccessReview, ClusterApi, GatewayError};
use pkg_provision::detector::{UserPattern, detect};
use pkg_provision::{ProvisionError, ProvisionSettings, UserSource};
use pkg_types::snapshot::Snapshot;
use pkg_types::workspace::WorkspacePhase;
use std::time::Duration;
use tracing::info;

use crate::error::Result;
use crate::probe::{ServiceEndpoint, probe};
use crate::report::{CheckResult, TestReport};

#[derive(Debug, Clone)]
pub struct ValidationScope {
    pub source: UserSource,
    /// Service endpoints to probe; empty skips probing.
    pub probes: Vec<ServiceEndpoint>,
}

pub async fn validate(
    api: &dyn ClusterApi,
    settings: &ProvisionSettings,
    scope: &ValidationScope,
) -> Result<TestReport> {
    settings.validate()?;
    let requested = scope
        .source
        .resolve_static(&settings.prefix, &settings.suffix)?
        .unwrap_or_default();
    let principal = api.whoami().await.map_err(ProvisionError::Auth)?;
    info!("Validating as {}", principal.name);
    let pattern = UserPattern::for_prefix(&settings.prefix)?;
    let snapshot = detect(api, settings, &pattern, &requested).await?;
    let users = scope
        .source
        .resolve(&settings.prefix, &settings.suffix, &snapshot)?;

    let checker = Checker {
        api,
        settings,
        snapshot: &snapshot,
    };
    let mut checks = Vec::new();
    for (i, user) in users.iter().enumerate() {
        checks.push(checker.identity(user));
        checks.push(checker.namespace(user));
        checks.push(checker.role_binding(user).await?);
        checks.push(checker.quota(user).await?);
        checks.push(checker.workspace(user));
        let other = &users[(i + 1) % users.len()];
        checks.push(checker.isolation(user, other).await?);
    }
    let timeout = Duration::from_secs(PROBE_TIMEOUT_SECS);
    for endpoint in &scope.probes {
        checks.push(probe(endpoint, timeout).await);
    }

    let report = TestReport::new(checks);
    info!(
        "Validation finished: {} passed, {} failed, {} skipped",
        report.passed, report.failed, report.skipped
    );
    Ok(report)
}

struct Checker<'a> {
    api: &'a dyn ClusterApi,
    settings: &'a ProvisionSettings,
    snapshot: &'a Snapshot,
}

impl Checker<'_> {
    fn identity(&self, user: &str) -> CheckResult {
        if self.snapshot.has_identity(user) {
            CheckResult::pass("identity", user, "credential entry present")
        } else {
            CheckResult::fail("identity", user, "no credential entry")
        }
    }

    fn namespace(&self, user: &str) -> CheckResult {
        let ns = self.settings.namespace_for(user);
        if self.snapshot.has_namespace(&ns) {
            CheckResult::pass("namespace", user, format!("{} exists", ns))
        } else if self.snapshot.is_unmanaged(&ns) {
            CheckResult::fail("namespace", user, format!("{} lacks the workshop labels", ns))
        } else {
            CheckResult::fail("namespace", user, format!("{} missing", ns))
        }
    }

    async fn role_binding(&self, user: &str) -> Result<CheckResult> {
        let ns = self.settings.namespace_for(user);
        if !self.snapshot.has_namespace(&ns) {
            return Ok(CheckResult::skip("rolebinding", user, "no namespace"));
        }
        Ok(match self.api.list_role_bindings(&ns).await {
            Ok(bindings) => {
                match bindings.iter().find(|b| b.name == ROLE_BINDING_NAME) {
                    Some(b) if b.binds_user(user) => CheckResult::pass(
                        "rolebinding",
                        user,
                        format!("{} grants {} in {}", b.name, b.role_ref, ns),
                    ),
                    Some(b) => CheckResult::fail(
                        "rolebinding",
                        user,
                        format!("{} does not bind {}", b.name, user),
                    ),
                    None => CheckResult::fail(
                        "rolebinding",
                        user,
                        format!("{} missing in {}", ROLE_BINDING_NAME, ns),
                    ),
                }
            }
            Err(e) => gateway_failure("rolebinding", user, e)?,
        })
    }

    async fn quota(&self, user: &str) -> Result<CheckResult> {
        let ns = self.settings.namespace_for(user);
        if !self.snapshot.has_namespace(&ns) {
            return Ok(CheckResult::skip("quota", user, "no namespace"));
        }
        Ok(match self.api.list_quotas(&ns).await {
            Ok(quotas) => match quotas.iter().find(|q| q.name == QUOTA_NAME) {
                Some(q) => CheckResult::pass(
                    "quota",
                    user,
                    format!(
                        "{}: cpu {} memory {}/{} pods {}",
                        q.name,
                        q.hard.cpu_request,
                        q.hard.memory_request,
                        q.hard.memory_limit,
                        q.hard.max_pods
                    ),
                ),
                None => CheckResult::fail("quota", user, format!("{} missing in {}", QUOTA_NAME, ns)),
            },
            Err(e) => gateway_failure("quota", user, e)?,
        })
    }

    fn workspace(&self, user: &str) -> CheckResult {
        let ns = self.settings.namespace_for(user);
        if !self.snapshot.has_namespace(&ns) {
            return CheckResult::skip("workspace", user, "no namespace");
        }
        let Some(ws) = self.snapshot.workspace(&ns, &self.settings.workspace_name) else {
            return CheckResult::skip("workspace", user, "no workspace yet");
        };
        match ws.status.phase {
            WorkspacePhase::Running => CheckResult::pass(
                "workspace",
                user,
                ws.status.url.clone().unwrap_or_else(|| "Running".to_string()),
            ),
            WorkspacePhase::Failed => CheckResult::fail(
                "workspace",
                user,
                format!(
                    "Failed: {}",
                    ws.status.message.as_deref().unwrap_or("no reason reported")
                ),
            ),
            phase => CheckResult::fail("workspace", user, format!("not running ({})", phase)),
        }
    }

    /// `user` must not be able to read `other`'s namespace.
    async fn isolation(&self, user: &str, other: &str) -> Result<CheckResult> {
        if user == other {
            return Ok(CheckResult::skip("isolation", user, "needs at least two users"));
        }
        let other_ns = self.settings.namespace_for(other);
        if !self.snapshot.has_namespace(&other_ns) {
            return Ok(CheckResult::skip("isolation", user, format!("{} missing", other_ns)));
        }
        let review = AccessReview {
            user: user.to_string(),
            verb: "get".to_string(),
            resource: "pods".to_string(),
            namespace: other_ns.clone(),
        };
        Ok(match self.api.access_review(&review).await {
            Ok(false) => CheckResult::pass("isolation", user, format!("cannot read {}", other_ns)),
            Ok(true) => CheckResult::fail("isolation", user, format!("CAN read {}", other_ns)),
            Err(e) => gateway_failure("isolation", user, e)?,
        })
    }
}

fn gateway_failure(check: &str, user: &str, e: GatewayError) -> Result<CheckResult> {
    if e.is_auth() {
        return Err(ProvisionError::Auth(e).into());
    }
    Ok(CheckResult::fail(check, user, e.to_string()))
}
