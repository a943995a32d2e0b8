use serde::{Deserialize, Serialize};

use crate::namespace::Namespace;
use crate::workspace::Workspace;

/// Observed cluster state for one invocation.
///
/// Built once by detection and passed down by reference; nothing mutates it
/// afterwards and nothing outlives the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Usernames in the credential store matching the naming pattern.
    pub identities: Vec<String>,
    /// Workshop-labelled namespaces, each owned by the user it is named after.
    pub namespaces: Vec<Namespace>,
    /// Names of user namespaces that exist without the workshop labels.
    #[serde(default)]
    pub unmanaged: Vec<String>,
    /// Workspaces found inside `namespaces`.
    pub workspaces: Vec<Workspace>,
}

impl Snapshot {
    pub fn has_identity(&self, username: &str) -> bool {
        self.identities.iter().any(|i| i == username)
    }

    pub fn namespace(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.iter().find(|n| n.name == name)
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.namespace(name).is_some()
    }

    /// Taken by a namespace the workshop did not create; never touched.
    pub fn is_unmanaged(&self, name: &str) -> bool {
        self.unmanaged.iter().any(|n| n == name)
    }

    pub fn workspace(&self, namespace: &str, name: &str) -> Option<&Workspace> {
        self.workspaces
            .iter()
            .find(|w| w.namespace == namespace && w.name == name)
    }
}
