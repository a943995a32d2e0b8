use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Failure of a single call against the cluster API.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("not authenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("transient cluster error: {0}")]
    Transient(String),

    #[error("cluster returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    Invalid(String),
}

impl GatewayError {
    /// Not logged in or not allowed; retrying cannot help.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            GatewayError::Unauthenticated(_) | GatewayError::Forbidden(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }

    /// One-line hint for the operator, if there is a useful one.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            GatewayError::Unauthenticated(_) => {
                Some("log in to the cluster and pass the token with --token or WORKSHOP_TOKEN")
            }
            GatewayError::Forbidden(_) => {
                Some("the token needs cluster-admin rights to provision namespaces")
            }
            GatewayError::QuotaExceeded(_) => {
                Some("raise the namespace quota or shrink the workspace component resources")
            }
            GatewayError::Conflict(_) => {
                Some("another run modified the resource concurrently; re-run once it finishes")
            }
            GatewayError::Transient(_) => Some("check cluster reachability and re-run"),
            _ => None,
        }
    }
}
