use pkg_provision::ProvisionError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ValidationError>;

#[derive(Error, Debug)]
pub enum ValidationError {
    /// Resolving users, authenticating or detecting failed before any check ran.
    #[error(transparent)]
    Setup(#[from] ProvisionError),

    #[error("cannot write report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode report: {0}")]
    Encode(#[from] serde_json::Error),
}
