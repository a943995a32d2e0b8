use serde::{Deserialize, Serialize};

// --- Subject ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubjectKind {
    User,
    ServiceAccount,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subject {
    pub kind: SubjectKind,
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl Subject {
    pub fn user(name: &str) -> Self {
        Self {
            kind: SubjectKind::User,
            name: name.to_string(),
            namespace: None,
        }
    }

    pub fn service_account(name: &str, namespace: &str) -> Self {
        Self {
            kind: SubjectKind::ServiceAccount,
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
        }
    }
}

// --- RoleBinding ---

/// Grants `role_ref` to `subjects` inside `namespace` only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleBinding {
    pub name: String,
    pub namespace: String,
    /// A namespace-scoped role, never a cluster-wide one.
    pub role_ref: String,
    pub subjects: Vec<Subject>,
}

impl RoleBinding {
    pub fn binds_user(&self, username: &str) -> bool {
        self.subjects
            .iter()
            .any(|s| s.kind == SubjectKind::User && s.name == username)
    }
}
