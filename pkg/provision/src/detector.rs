//! Read-only detection of what already exists on the cluster.

use pkg_constants::labels;
use pkg_gateway::ClusterApi;
use pkg_types::namespace::Namespace;
use pkg_types::snapshot::Snapshot;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::{ProvisionError, Result};
use crate::settings::ProvisionSettings;

/// Recognizes generated usernames (`^{prefix}\d+$`).
#[derive(Debug, Clone)]
pub struct UserPattern {
    regex: Regex,
}

impl UserPattern {
    pub fn for_prefix(prefix: &str) -> Result<Self> {
        let regex = Regex::new(&format!(r"^{}\d+$", regex::escape(prefix)))
            .map_err(|e| ProvisionError::usage(format!("invalid user pattern: {}", e)))?;
        Ok(Self { regex })
    }

    pub fn matches(&self, username: &str) -> bool {
        self.regex.is_match(username)
    }
}

/// Labels carried by every namespace this tool creates.
pub fn workshop_selector() -> HashMap<String, String> {
    HashMap::from([(
        labels::DEPLOYMENT_TYPE.to_string(),
        labels::DEPLOYMENT_TYPE_VALUE.to_string(),
    )])
}

/// Whether `ns` was created by this tool for `username`.
pub fn is_owned_by(ns: &Namespace, username: &str) -> bool {
    ns.matches(&workshop_selector())
        && ns.labels.get(labels::OWNER).is_some_and(|o| o == username)
}

/// Build the invocation's snapshot.
///
/// Identities are the credential-store entries matching `pattern` plus any
/// explicitly `requested` names that are present. A user's namespace
/// `{user}-{suffix}` counts only when it carries the workshop labels with
/// that user as owner; a same-named namespace without them is recorded as
/// unmanaged. Workspaces are listed inside the owned namespaces. Issues no
/// mutating call.
pub async fn detect(
    api: &dyn ClusterApi,
    settings: &ProvisionSettings,
    pattern: &UserPattern,
    requested: &[String],
) -> Result<Snapshot> {
    let store = &settings.credential_store;
    let credentials = api
        .read_credentials(store)
        .await
        .map_err(|e| ProvisionError::cluster(format!("credential store {}", store), e))?;

    let identities: Vec<String> = match &credentials {
        Some(set) => set
            .usernames()
            .filter(|u| pattern.matches(u) || requested.iter().any(|r| r == u))
            .map(str::to_string)
            .collect(),
        None => {
            debug!("Credential store {} does not exist yet", store);
            Vec::new()
        }
    };

    let mut candidates = identities.clone();
    for name in requested {
        if !candidates.contains(name) {
            candidates.push(name.clone());
        }
    }

    let labelled = api
        .list_namespaces(&workshop_selector())
        .await
        .map_err(|e| ProvisionError::cluster("workshop namespaces", e))?;

    let mut snapshot = Snapshot {
        identities,
        ..Snapshot::default()
    };
    for user in &candidates {
        let ns_name = settings.namespace_for(user);
        let owned = match labelled.iter().find(|ns| ns.name == ns_name) {
            Some(ns) if is_owned_by(ns, user) => Some(ns.clone()),
            Some(_) => None,
            None => {
                let existing = api
                    .get_namespace(&ns_name)
                    .await
                    .map_err(|e| ProvisionError::cluster(format!("namespace {}", ns_name), e))?;
                if existing.is_none() {
                    continue;
                }
                None
            }
        };
        let Some(ns) = owned else {
            warn!("Namespace {} exists but is not a workshop namespace of {}", ns_name, user);
            snapshot.unmanaged.push(ns_name);
            continue;
        };
        let workspaces = api
            .list_workspaces(&ns_name)
            .await
            .map_err(|e| ProvisionError::cluster(format!("workspaces in {}", ns_name), e))?;
        snapshot.namespaces.push(ns);
        snapshot.workspaces.extend(workspaces);
    }

    info!(
        "Detected {} identities, {} namespaces, {} workspaces",
        snapshot.identities.len(),
        snapshot.namespaces.len(),
        snapshot.workspaces.len()
    );
    if !snapshot.unmanaged.is_empty() {
        info!("Leaving {} unmanaged namespaces alone", snapshot.unmanaged.len());
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::namespace_for_user;
    use crate::settings::WorkspaceTemplate;
    use pkg_gateway::memory::InMemoryCluster;
    use pkg_types::identity::{CredentialSet, User};

    #[test]
    fn pattern_matches_numbered_users_only() {
        let pattern = UserPattern::for_prefix("u").unwrap();
        assert!(pattern.matches("u1"));
        assert!(pattern.matches("u42"));
        assert!(!pattern.matches("u"));
        assert!(!pattern.matches("user1"));
        assert!(!pattern.matches("xu1"));

        let dotted = UserPattern::for_prefix("a.b").unwrap();
        assert!(dotted.matches("a.b7"));
        assert!(!dotted.matches("axb7"));
    }

    #[tokio::test]
    async fn detection_filters_and_never_mutates() {
        let cluster = InMemoryCluster::new();
        let settings = ProvisionSettings::new("u", "ws", &WorkspaceTemplate::default()).unwrap();
        cluster.seed_credentials(
            &settings.credential_store,
            CredentialSet::parse_htpasswd("u1:x\nu2:x\nadmin:x\nalice:x\n").unwrap(),
        );
        cluster
            .create_namespace(&namespace_for_user(&User::new("u1", "ws")))
            .await
            .unwrap();
        cluster.create_namespace(&Namespace::new("alice-ws")).await.unwrap();
        let before = cluster.mutation_count();

        let pattern = UserPattern::for_prefix("u").unwrap();
        let snapshot = detect(&cluster, &settings, &pattern, &["alice".to_string()])
            .await
            .unwrap();

        assert_eq!(snapshot.identities, vec!["u1", "u2", "alice"]);
        assert!(snapshot.has_namespace("u1-ws"));
        assert!(!snapshot.has_namespace("alice-ws"));
        assert!(snapshot.is_unmanaged("alice-ws"));
        assert!(!snapshot.has_namespace("u2-ws"));
        assert!(!snapshot.is_unmanaged("u2-ws"));
        assert!(!snapshot.has_identity("admin"));
        assert_eq!(cluster.mutation_count(), before);
    }

    #[tokio::test]
    async fn foreign_owner_label_is_unmanaged() {
        let cluster = InMemoryCluster::new();
        let settings = ProvisionSettings::new("u", "ws", &WorkspaceTemplate::default()).unwrap();
        let hijacked = namespace_for_user(&User::new("u2", "ws")).with_label(labels::OWNER, "u9");
        cluster.create_namespace(&hijacked).await.unwrap();

        let pattern = UserPattern::for_prefix("u").unwrap();
        let snapshot = detect(&cluster, &settings, &pattern, &["u2".to_string()])
            .await
            .unwrap();
        assert!(!snapshot.has_namespace("u2-ws"));
        assert!(snapshot.is_unmanaged("u2-ws"));
        assert!(snapshot.workspaces.is_empty());
    }

    #[test]
    fn ownership_needs_both_labels() {
        let user = User::new("u1", "ws");
        assert!(is_owned_by(&namespace_for_user(&user), "u1"));
        assert!(!is_owned_by(&namespace_for_user(&user), "u2"));
        assert!(!is_owned_by(&Namespace::new("u1-ws").with_label(labels::OWNER, "u1"), "u1"));
    }

    #[tokio::test]
    async fn missing_store_means_no_identities() {
        let cluster = InMemoryCluster::new();
        let settings = ProvisionSettings::new("u", "ws", &WorkspaceTemplate::default()).unwrap();
        let pattern = UserPattern::for_prefix("u").unwrap();
        let snapshot = detect(&cluster, &settings, &pattern, &[]).await.unwrap();
        assert!(snapshot.identities.is_empty());
        assert!(snapshot.namespaces.is_empty());
    }
}
