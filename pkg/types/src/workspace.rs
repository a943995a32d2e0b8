use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quantity::{Cpu, Memory};

// --- Component resources ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentResources {
    pub cpu_request: Cpu,
    pub cpu_limit: Cpu,
    pub memory_request: Memory,
    pub memory_limit: Memory,
}

impl ComponentResources {
    pub fn new(cpu: (Cpu, Cpu), memory: (Memory, Memory)) -> Result<Self> {
        let (cpu_request, cpu_limit) = cpu;
        let (memory_request, memory_limit) = memory;
        if cpu_request > cpu_limit {
            bail!("cpu request {} exceeds limit {}", cpu_request, cpu_limit);
        }
        if memory_request > memory_limit {
            bail!(
                "memory request {} exceeds limit {}",
                memory_request,
                memory_limit
            );
        }
        if memory_limit.bytes() == 0 || cpu_limit.0 == 0 {
            bail!("component limits must be non-zero");
        }
        Ok(Self {
            cpu_request,
            cpu_limit,
            memory_request,
            memory_limit,
        })
    }
}

// --- Endpoint ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Exposure {
    /// Routed from outside the cluster.
    #[default]
    Public,
    /// Reachable only from inside the workspace.
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub exposure: Exposure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

// --- Component spec ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentSpec {
    pub name: String,
    pub image: String,
    pub resources: ComponentResources,
    /// At most one externally exposed endpoint per component.
    #[serde(default)]
    pub endpoint: Option<Endpoint>,
    /// Container ports reachable from sibling components.
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

impl ComponentSpec {
    pub fn new(name: &str, image: &str, resources: ComponentResources) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            resources,
            endpoint: None,
            ports: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn with_endpoint(mut self, name: &str, port: u16) -> Self {
        self.endpoint = Some(Endpoint {
            name: name.to_string(),
            port,
            exposure: Exposure::Public,
        });
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.env.push(EnvVar::new(name, value));
        self
    }

    fn is_exposed(&self) -> bool {
        self.endpoint
            .as_ref()
            .is_some_and(|e| e.exposure == Exposure::Public)
    }
}

// --- Commands ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Build,
    Run,
    Test,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceCommand {
    pub id: String,
    pub kind: CommandKind,
    /// Component the command executes in.
    pub component: String,
    pub command_line: String,
}

// --- Source ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRef {
    pub repository: String,
    /// Deployment descriptor path inside the repository.
    pub descriptor_path: String,
}

// --- Spec ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceSpec {
    pub source: SourceRef,
    /// The primary tool container is always first.
    pub components: Vec<ComponentSpec>,
    #[serde(default)]
    pub commands: Vec<WorkspaceCommand>,
    /// Ask the cluster to start the workspace right after creation.
    #[serde(default = "default_started")]
    pub started: bool,
}

fn default_started() -> bool {
    true
}

impl WorkspaceSpec {
    /// Assemble and validate a descriptor.
    ///
    /// The primary component must expose exactly one public endpoint; sidecars
    /// may not expose any. Component names are unique and every command must
    /// target a declared component.
    pub fn new(
        source: SourceRef,
        primary: ComponentSpec,
        sidecars: Vec<ComponentSpec>,
        commands: Vec<WorkspaceCommand>,
    ) -> Result<Self> {
        if source.repository.is_empty() {
            bail!("workspace source repository must not be empty");
        }
        if !primary.is_exposed() {
            bail!(
                "primary component '{}' must expose a public endpoint",
                primary.name
            );
        }
        for sidecar in &sidecars {
            if sidecar.is_exposed() {
                bail!(
                    "sidecar '{}' must not expose an external endpoint",
                    sidecar.name
                );
            }
        }

        let mut components = Vec::with_capacity(sidecars.len() + 1);
        components.push(primary);
        components.extend(sidecars);

        for (i, c) in components.iter().enumerate() {
            crate::validate::validate_name(&c.name)?;
            if components[..i].iter().any(|o| o.name == c.name) {
                bail!("duplicate component name '{}'", c.name);
            }
        }
        for cmd in &commands {
            if !components.iter().any(|c| c.name == cmd.component) {
                bail!(
                    "command '{}' targets unknown component '{}'",
                    cmd.id,
                    cmd.component
                );
            }
        }

        Ok(Self {
            source,
            components,
            commands,
            started: true,
        })
    }

    pub fn primary(&self) -> Option<&ComponentSpec> {
        self.components.first()
    }

    pub fn sidecars(&self) -> &[ComponentSpec] {
        self.components.get(1..).unwrap_or_default()
    }

    pub fn total_memory_limit(&self) -> u64 {
        self.components
            .iter()
            .map(|c| c.resources.memory_limit.bytes())
            .sum()
    }

    pub fn total_memory_request(&self) -> u64 {
        self.components
            .iter()
            .map(|c| c.resources.memory_request.bytes())
            .sum()
    }

    pub fn total_cpu_request(&self) -> u64 {
        self.components.iter().map(|c| c.resources.cpu_request.0).sum()
    }
}

// --- Phase ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum WorkspacePhase {
    #[default]
    Stopped,
    Starting,
    Running,
    Failed,
}

impl std::fmt::Display for WorkspacePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkspacePhase::Stopped => write!(f, "Stopped"),
            WorkspacePhase::Starting => write!(f, "Starting"),
            WorkspacePhase::Running => write!(f, "Running"),
            WorkspacePhase::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct WorkspaceStatus {
    #[serde(default)]
    pub phase: WorkspacePhase,
    /// Reason reported by the cluster, mostly set on failure.
    #[serde(default)]
    pub message: Option<String>,
    /// URL of the running tool endpoint.
    #[serde(default)]
    pub url: Option<String>,
}

// --- Workspace ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// Unique within the namespace.
    pub name: String,
    pub namespace: String,
    pub spec: WorkspaceSpec,
    #[serde(default)]
    pub status: WorkspaceStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Workspace {
    pub fn new(name: &str, namespace: &str, spec: WorkspaceSpec) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            spec,
            status: WorkspaceStatus::default(),
            created_at: None,
        }
    }

    /// `namespace/name`
    pub fn id(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res() -> ComponentResources {
        ComponentResources::new(
            (Cpu::millis(250), Cpu::millis(500)),
            (Memory::mebibytes(256), Memory::mebibytes(512)),
        )
        .unwrap()
    }

    fn source() -> SourceRef {
        SourceRef {
            repository: "https://example.com/repo".to_string(),
            descriptor_path: "devfile.yaml".to_string(),
        }
    }

    #[test]
    fn resources_reject_request_above_limit() {
        assert!(
            ComponentResources::new(
                (Cpu::millis(900), Cpu::millis(500)),
                (Memory::mebibytes(1), Memory::mebibytes(2)),
            )
            .is_err()
        );
        assert!(
            ComponentResources::new(
                (Cpu::millis(100), Cpu::millis(500)),
                (Memory::mebibytes(4), Memory::mebibytes(2)),
            )
            .is_err()
        );
    }

    #[test]
    fn valid_spec_keeps_primary_first() {
        let spec = WorkspaceSpec::new(
            source(),
            ComponentSpec::new("tools", "img", res()).with_endpoint("http", 8080),
            vec![ComponentSpec::new("db", "pg", res()).with_port(5432)],
            vec![WorkspaceCommand {
                id: "build".to_string(),
                kind: CommandKind::Build,
                component: "tools".to_string(),
                command_line: "make".to_string(),
            }],
        )
        .unwrap();
        assert_eq!(spec.primary().unwrap().name, "tools");
        assert_eq!(spec.sidecars().len(), 1);
        assert_eq!(spec.total_memory_limit(), 2 * 512 * 1024 * 1024);
        assert_eq!(spec.total_cpu_request(), 500);
    }

    #[test]
    fn primary_must_be_exposed() {
        let err = WorkspaceSpec::new(
            source(),
            ComponentSpec::new("tools", "img", res()),
            vec![],
            vec![],
        );
        assert!(err.is_err());
    }

    #[test]
    fn sidecar_must_not_be_exposed() {
        let err = WorkspaceSpec::new(
            source(),
            ComponentSpec::new("tools", "img", res()).with_endpoint("http", 8080),
            vec![ComponentSpec::new("db", "pg", res()).with_endpoint("db", 5432)],
            vec![],
        );
        assert!(err.is_err());
    }

    #[test]
    fn duplicate_components_and_dangling_commands_rejected() {
        let dup = WorkspaceSpec::new(
            source(),
            ComponentSpec::new("tools", "img", res()).with_endpoint("http", 8080),
            vec![ComponentSpec::new("tools", "pg", res())],
            vec![],
        );
        assert!(dup.is_err());

        let dangling = WorkspaceSpec::new(
            source(),
            ComponentSpec::new("tools", "img", res()).with_endpoint("http", 8080),
            vec![],
            vec![WorkspaceCommand {
                id: "run".to_string(),
                kind: CommandKind::Run,
                component: "missing".to_string(),
                command_line: "run".to_string(),
            }],
        );
        assert!(dangling.is_err());
    }

    #[test]
    fn command_kind_wire_format() {
        assert_eq!(serde_json::to_string(&CommandKind::Test).unwrap(), "\"test\"");
    }
}
