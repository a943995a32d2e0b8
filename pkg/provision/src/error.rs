use pkg_gateway::GatewayError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Bad or conflicting input; raised before any cluster call.
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Auth(#[source] GatewayError),

    /// The batch credential write failed; no user of the batch is provisioned.
    #[error("credential store {store}: {source}")]
    CredentialStore {
        store: String,
        #[source]
        source: GatewayError,
    },

    #[error("{resource}: {source}")]
    Cluster {
        resource: String,
        #[source]
        source: GatewayError,
    },

    #[error("workspace {workspace} failed: {message}")]
    WorkspaceFailed { workspace: String, message: String },

    #[error("workspace {workspace} not running after {attempts} checks")]
    TimedOut { workspace: String, attempts: u32 },

    #[error("{0}")]
    Prerequisite(String),

    #[error("cleanup cancelled, nothing was removed")]
    Aborted,
}

impl ProvisionError {
    /// Wrap a gateway failure on `resource`, routing auth failures to [`ProvisionError::Auth`].
    pub fn cluster(resource: impl Into<String>, source: GatewayError) -> Self {
        if source.is_auth() {
            ProvisionError::Auth(source)
        } else {
            ProvisionError::Cluster {
                resource: resource.into(),
                source,
            }
        }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        ProvisionError::Usage(msg.into())
    }

    /// Short label printed in front of every failure line.
    pub fn category(&self) -> &'static str {
        match self {
            ProvisionError::Usage(_) => "usage",
            ProvisionError::Auth(_) => "auth",
            ProvisionError::CredentialStore { .. } => "credential-store",
            ProvisionError::Cluster { .. } => "cluster",
            ProvisionError::WorkspaceFailed { .. } => "workspace-failed",
            ProvisionError::TimedOut { .. } => "timed-out",
            ProvisionError::Prerequisite(_) => "prerequisite",
            ProvisionError::Aborted => "aborted",
        }
    }

    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            ProvisionError::Auth(e)
            | ProvisionError::CredentialStore { source: e, .. }
            | ProvisionError::Cluster { source: e, .. } => e.remediation(),
            ProvisionError::WorkspaceFailed { .. } => {
                Some("remove the user's namespace with --cleanup and provision again")
            }
            ProvisionError::TimedOut { .. } => {
                Some("the workspace may still start; check it later or raise ready-max-attempts")
            }
            ProvisionError::Usage(_) => Some("run with --help for usage"),
            ProvisionError::Prerequisite(_) => Some("run --setup-prerequisites as a cluster admin"),
            ProvisionError::Aborted => None,
        }
    }

    /// Failures that end the whole run rather than a single user.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProvisionError::Usage(_)
                | ProvisionError::Auth(_)
                | ProvisionError::CredentialStore { .. }
                | ProvisionError::Prerequisite(_)
                | ProvisionError::Aborted
        )
    }
}
