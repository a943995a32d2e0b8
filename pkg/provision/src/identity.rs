//! Batch credential management against the shared credential store.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pkg_gateway::{ClusterApi, SecretRef};
use pkg_types::identity::CredentialSet;
use sha1::{Digest, Sha1};
use tracing::{info, warn};

use crate::error::{ProvisionError, Result};

const SHA_SCHEME: &str = "{SHA}";

/// htpasswd `{SHA}` hash: base64 of the SHA-1 digest.
///
/// Deterministic, so re-hashing an unchanged password yields the same entry.
pub fn hash_password(password: &str) -> String {
    let digest = Sha1::digest(password.as_bytes());
    format!("{}{}", SHA_SCHEME, STANDARD.encode(digest))
}

/// Whether `hash` is a `{SHA}` hash of `password`. Other schemes never verify.
pub fn verify_password(hash: &str, password: &str) -> bool {
    hash.starts_with(SHA_SCHEME) && hash == hash_password(password)
}

/// What `ensure_users` did (or would do) to each requested user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityOutcome {
    pub created: Vec<String>,
    /// Existing entries whose password did not match.
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
}

impl IdentityOutcome {
    pub fn changed(&self) -> bool {
        !self.created.is_empty() || !self.updated.is_empty()
    }

    pub fn touched(&self, username: &str) -> bool {
        self.created.iter().chain(&self.updated).any(|u| u == username)
    }
}

/// Upsert credentials for `usernames` in one atomic replace.
///
/// Entries for other users are carried over untouched. When nothing changes no
/// write is issued. A failed replace fails the whole batch.
pub async fn ensure_users(
    api: &dyn ClusterApi,
    store: &SecretRef,
    usernames: &[String],
    password: &str,
    dry_run: bool,
) -> Result<IdentityOutcome> {
    if password.is_empty() {
        return Err(ProvisionError::usage("password must not be empty"));
    }
    if usernames.is_empty() {
        return Err(ProvisionError::usage("no users to create"));
    }

    let fatal = |source| ProvisionError::CredentialStore {
        store: store.to_string(),
        source,
    };
    let current = api.read_credentials(store).await.map_err(|e| {
        if e.is_auth() {
            ProvisionError::Auth(e)
        } else {
            fatal(e)
        }
    })?;
    let mut set = current.unwrap_or_else(|| {
        info!("Credential store {} not found, starting empty", store);
        CredentialSet::default()
    });

    let mut outcome = IdentityOutcome::default();
    for user in usernames {
        match set.get(user) {
            Some(entry) if verify_password(&entry.hash, password) => {
                outcome.unchanged.push(user.clone())
            }
            Some(_) => {
                set.upsert(user, hash_password(password));
                outcome.updated.push(user.clone());
            }
            None => {
                set.upsert(user, hash_password(password));
                outcome.created.push(user.clone());
            }
        }
    }

    if !outcome.changed() {
        info!("All {} credentials already up to date", usernames.len());
        return Ok(outcome);
    }
    if dry_run {
        info!(
            "[dry-run] Would write credential store {} ({} new, {} updated)",
            store,
            outcome.created.len(),
            outcome.updated.len()
        );
        return Ok(outcome);
    }

    api.replace_credentials(store, &set).await.map_err(|e| {
        warn!("Credential store replace failed: {}", e);
        if e.is_auth() {
            ProvisionError::Auth(e)
        } else {
            fatal(e)
        }
    })?;
    info!(
        "Wrote credential store {} ({} new, {} updated, {} entries total)",
        store,
        outcome.created.len(),
        outcome.updated.len(),
        set.entries.len()
    );
    Ok(outcome)
}
