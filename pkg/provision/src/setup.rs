//! One-time cluster preparation before the first batch.

use pkg_gateway::ClusterApi;
use pkg_types::identity::CredentialSet;
use tracing::info;

use crate::batch::BatchController;
use crate::error::{ProvisionError, Result};
use crate::settings::ProvisionSettings;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub admin: String,
    pub credential_store_created: bool,
}

/// Verify privileges, make sure the credential store exists and that the
/// cluster serves the workspace API. Safe to run repeatedly.
pub async fn setup_prerequisites(
    api: &dyn ClusterApi,
    settings: &ProvisionSettings,
    dry_run: bool,
) -> Result<SetupReport> {
    settings.validate()?;
    let admin = BatchController::new(api, settings).require_admin().await?;

    let available = api
        .workspace_api_available()
        .await
        .map_err(|e| ProvisionError::cluster("cluster info", e))?;
    if !available {
        return Err(ProvisionError::Prerequisite(
            "the cluster does not serve the workspace API; install the workspace operator first"
                .to_string(),
        ));
    }

    let store = &settings.credential_store;
    let existing = api
        .read_credentials(store)
        .await
        .map_err(|e| ProvisionError::cluster(format!("credential store {}", store), e))?;
    let mut report = SetupReport {
        admin,
        credential_store_created: false,
    };
    match existing {
        Some(set) => info!("Credential store {} present with {} entries", store, set.entries.len()),
        None if dry_run => {
            info!("[dry-run] Would create empty credential store {}", store);
            report.credential_store_created = true;
        }
        None => {
            api.replace_credentials(store, &CredentialSet::default())
                .await
                .map_err(|e| ProvisionError::CredentialStore {
                    store: store.to_string(),
                    source: e,
                })?;
            info!("Created empty credential store {}", store);
            report.credential_store_created = true;
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::WorkspaceTemplate;
    use pkg_gateway::memory::InMemoryCluster;

    fn settings() -> ProvisionSettings {
        ProvisionSettings::new("u", "ws", &WorkspaceTemplate::default()).unwrap()
    }

    #[tokio::test]
    async fn creates_store_once() {
        let cluster = InMemoryCluster::new();
        let settings = settings();
        let first = setup_prerequisites(&cluster, &settings, false).await.unwrap();
        assert!(first.credential_store_created);
        assert_eq!(first.admin, "admin");
        assert!(cluster.credentials(&settings.credential_store).is_some());

        let second = setup_prerequisites(&cluster, &settings, false).await.unwrap();
        assert!(!second.credential_store_created);
    }

    #[tokio::test]
    async fn missing_workspace_api_is_a_prerequisite_error() {
        let cluster = InMemoryCluster::new();
        cluster.set_workspace_api(false);
        let err = setup_prerequisites(&cluster, &settings(), false)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "prerequisite");
        assert_eq!(cluster.mutation_count(), 0);
    }
}
