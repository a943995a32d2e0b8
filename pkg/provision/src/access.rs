//! Per-user access summaries handed to workshop attendees.

use pkg_gateway::ClusterApi;
use serde::Serialize;
use std::fmt::Write as _;
use tracing::info;

use crate::detector::{UserPattern, detect};
use crate::error::{ProvisionError, Result};
use crate::settings::ProvisionSettings;
use crate::users::UserSource;

const INSTRUCTIONS: &[&str] = &[
    "Open the workspace URL and log in with your username and the workshop password.",
    "Wait for the workspace to finish starting; the tutorial project is cloned for you.",
    "Use the 'dev' command to start the application in live-reload mode.",
    "Work only inside your own namespace; other attendees' namespaces are not accessible.",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessSummary {
    pub username: String,
    pub namespace: String,
    pub workspace_url: String,
}

/// Console URL that opens the tutorial repository with its workspace descriptor.
pub fn workspace_url(settings: &ProvisionSettings) -> String {
    let source = &settings.workspace_spec.source;
    format!(
        "{}/#{}?devfilePath={}",
        settings.console_url.trim_end_matches('/'),
        source.repository,
        source.descriptor_path
    )
}

impl AccessSummary {
    pub fn for_user(settings: &ProvisionSettings, username: &str) -> Self {
        Self {
            username: username.to_string(),
            namespace: settings.namespace_for(username),
            workspace_url: workspace_url(settings),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "User:      {}", self.username);
        let _ = writeln!(out, "Namespace: {}", self.namespace);
        let _ = writeln!(out, "Workspace: {}", self.workspace_url);
        for (i, step) in INSTRUCTIONS.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, step);
        }
        out
    }
}

pub fn render_all(summaries: &[AccessSummary]) -> String {
    summaries
        .iter()
        .map(AccessSummary::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Summaries for the resolved users whose namespace exists. Read-only.
pub async fn generate_urls(
    api: &dyn ClusterApi,
    settings: &ProvisionSettings,
    source: &UserSource,
) -> Result<Vec<AccessSummary>> {
    settings.validate()?;
    let requested = source
        .resolve_static(&settings.prefix, &settings.suffix)?
        .unwrap_or_default();
    api.whoami().await.map_err(ProvisionError::Auth)?;
    let pattern = UserPattern::for_prefix(&settings.prefix)?;
    let snapshot = detect(api, settings, &pattern, &requested).await?;
    let users = source.resolve(&settings.prefix, &settings.suffix, &snapshot)?;

    let summaries: Vec<AccessSummary> = users
        .iter()
        .filter(|u| snapshot.has_namespace(&settings.namespace_for(u)))
        .map(|u| AccessSummary::for_user(settings, u))
        .collect();
    info!(
        "Generated {} access summaries ({} users without a namespace)",
        summaries.len(),
        users.len() - summaries.len()
    );
    Ok(summaries)
}
