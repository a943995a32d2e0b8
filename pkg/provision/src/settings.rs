//! Fully resolved inputs shared by every provisioning step.

use pkg_constants::{provision as defaults, workspace as ws};
use pkg_gateway::SecretRef;
use pkg_types::quantity::{Cpu, Memory};
use pkg_types::quota::Quota;
use pkg_types::validate::{validate_name, validate_prefix};
use pkg_types::workspace::{
    CommandKind, ComponentResources, ComponentSpec, SourceRef, WorkspaceCommand, WorkspaceSpec,
};
use std::time::Duration;

use crate::error::{ProvisionError, Result};

/// Fixed-interval readiness polling bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(defaults::READY_POLL_INTERVAL_SECS),
            max_attempts: defaults::READY_MAX_ATTEMPTS,
        }
    }
}

/// Images and source the per-user workspace is built from.
#[derive(Debug, Clone)]
pub struct WorkspaceTemplate {
    pub repository: String,
    pub descriptor_path: String,
    pub tool_image: String,
    pub db_image: String,
    pub broker_image: String,
}

impl Default for WorkspaceTemplate {
    fn default() -> Self {
        Self {
            repository: ws::DEFAULT_REPOSITORY.to_string(),
            descriptor_path: ws::DEFAULT_DESCRIPTOR_PATH.to_string(),
            tool_image: ws::TOOL_IMAGE.to_string(),
            db_image: ws::DB_IMAGE.to_string(),
            broker_image: ws::BROKER_IMAGE.to_string(),
        }
    }
}

impl WorkspaceTemplate {
    /// The tool container plus a database and a message broker sidecar.
    pub fn build(&self) -> anyhow::Result<WorkspaceSpec> {
        let tools = ComponentSpec::new(
            "tools",
            &self.tool_image,
            ComponentResources::new(
                (Cpu::millis(500), Cpu::cores(2)),
                (Memory::gibibytes(2), Memory::gibibytes(4)),
            )?,
        )
        .with_endpoint(ws::TOOL_ENDPOINT_NAME, ws::TOOL_PORT)
        .with_env("DB_HOST", "localhost")
        .with_env("DB_PORT", &ws::DB_PORT.to_string())
        .with_env("KAFKA_BOOTSTRAP_SERVERS", &format!("localhost:{}", ws::BROKER_PORT));

        let db = ComponentSpec::new(
            "postgres",
            &self.db_image,
            ComponentResources::new(
                (Cpu::millis(100), Cpu::millis(500)),
                (Memory::mebibytes(256), Memory::gibibytes(1)),
            )?,
        )
        .with_port(ws::DB_PORT)
        .with_env("POSTGRES_USER", "workshop")
        .with_env("POSTGRES_PASSWORD", "workshop")
        .with_env("POSTGRES_DB", "attendees");

        let broker = ComponentSpec::new(
            "kafka",
            &self.broker_image,
            ComponentResources::new(
                (Cpu::millis(250), Cpu::cores(1)),
                (Memory::mebibytes(512), Memory::gibibytes(2)),
            )?,
        )
        .with_port(ws::BROKER_PORT)
        .with_env("KAFKA_CFG_NODE_ID", "0")
        .with_env("KAFKA_CFG_PROCESS_ROLES", "controller,broker")
        .with_env(
            "KAFKA_CFG_LISTENERS",
            &format!("PLAINTEXT://:{},CONTROLLER://:9093", ws::BROKER_PORT),
        )
        .with_env("KAFKA_CFG_CONTROLLER_QUORUM_VOTERS", "0@localhost:9093")
        .with_env("KAFKA_CFG_CONTROLLER_LISTENER_NAMES", "CONTROLLER");

        let command = |id: &str, kind: CommandKind, line: &str| WorkspaceCommand {
            id: id.to_string(),
            kind,
            component: "tools".to_string(),
            command_line: line.to_string(),
        };

        WorkspaceSpec::new(
            SourceRef {
                repository: self.repository.clone(),
                descriptor_path: self.descriptor_path.clone(),
            },
            tools,
            vec![db, broker],
            vec![
                command("package", CommandKind::Build, "./mvnw package -DskipTests"),
                command("dev", CommandKind::Run, "./mvnw quarkus:dev"),
                command("test", CommandKind::Test, "./mvnw test"),
            ],
        )
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub prefix: String,
    pub suffix: String,
    pub credential_store: SecretRef,
    pub quota: Quota,
    pub workspace_name: String,
    pub workspace_spec: WorkspaceSpec,
    pub readiness: ReadinessPolicy,
    pub console_url: String,
    pub concurrency: usize,
}

impl ProvisionSettings {
    /// Settings with built-in defaults for everything but the naming.
    pub fn new(prefix: &str, suffix: &str, template: &WorkspaceTemplate) -> Result<Self> {
        let workspace_spec = template
            .build()
            .map_err(|e| ProvisionError::usage(format!("invalid workspace template: {}", e)))?;
        let settings = Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            credential_store: SecretRef::new(
                defaults::CREDENTIAL_NAMESPACE,
                defaults::CREDENTIAL_SECRET,
            ),
            quota: Quota::default(),
            workspace_name: ws::WORKSPACE_NAME.to_string(),
            workspace_spec,
            readiness: ReadinessPolicy::default(),
            console_url: ws::DEFAULT_CONSOLE_URL.to_string(),
            concurrency: defaults::DEFAULT_CONCURRENCY,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check everything that can be checked without the cluster.
    pub fn validate(&self) -> Result<()> {
        validate_prefix(&self.prefix).map_err(|e| ProvisionError::usage(e.to_string()))?;
        validate_name(&self.suffix)
            .map_err(|e| ProvisionError::usage(format!("suffix: {}", e)))?;
        validate_name(&self.credential_store.namespace)
            .map_err(|e| ProvisionError::usage(format!("credential namespace: {}", e)))?;
        self.quota
            .validate()
            .map_err(|e| ProvisionError::usage(e.to_string()))?;
        if self.concurrency == 0 || self.concurrency > defaults::MAX_CONCURRENCY {
            return Err(ProvisionError::usage(format!(
                "concurrency must be between 1 and {} (got {})",
                defaults::MAX_CONCURRENCY,
                self.concurrency
            )));
        }
        if self.readiness.max_attempts == 0 {
            return Err(ProvisionError::usage("ready-max-attempts must be at least 1"));
        }
        if self.workspace_spec.total_memory_limit() > self.quota.memory_limit.bytes() {
            return Err(ProvisionError::usage(format!(
                "workspace memory limit exceeds quota limits.memory {}",
                self.quota.memory_limit
            )));
        }
        Ok(())
    }

    pub fn namespace_for(&self, username: &str) -> String {
        pkg_types::identity::namespace_for(username, &self.suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_fits_default_quota() {
        let settings = ProvisionSettings::new("u", "ws", &WorkspaceTemplate::default()).unwrap();
        let spec = &settings.workspace_spec;
        assert_eq!(spec.components.len(), 3);
        assert!(spec.sidecars().iter().all(|c| c.endpoint.is_none()));
        assert!(spec.total_memory_request() <= settings.quota.memory_request.bytes());
        assert!(spec.total_cpu_request() <= settings.quota.cpu_request.0);
        assert_eq!(settings.namespace_for("u1"), "u1-ws");
    }

    #[test]
    fn rejects_bad_naming_and_bounds() {
        assert!(ProvisionSettings::new("", "ws", &WorkspaceTemplate::default()).is_err());
        assert!(ProvisionSettings::new("u", "Bad_Suffix", &WorkspaceTemplate::default()).is_err());

        let mut settings =
            ProvisionSettings::new("u", "ws", &WorkspaceTemplate::default()).unwrap();
        settings.concurrency = 0;
        assert!(settings.validate().is_err());
        settings.concurrency = defaults::MAX_CONCURRENCY + 1;
        assert!(settings.validate().is_err());
        settings.concurrency = 4;
        settings.quota.memory_limit = Memory::gibibytes(1);
        settings.quota.memory_request = Memory::gibibytes(1);
        assert!(matches!(settings.validate(), Err(ProvisionError::Usage(_))));
    }
}
