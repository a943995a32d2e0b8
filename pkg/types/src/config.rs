use serde::{Deserialize, Serialize};

use crate::quota::Quota;

/// `workshopctl` configuration file (YAML).
///
/// Every field is optional; CLI flags win over the file, the file wins over
/// built-in defaults.
///
/// Example `config.yaml`:
/// ```yaml
/// server: https://api.cluster.local:6443
/// token: sha256~abc
/// prefix: user
/// suffix: ws
/// console-url: https://workspaces.apps.cluster.local
/// repository: https://github.com/workshop/attendee-registration
/// descriptor-path: devfile.yaml
/// ready-interval-secs: 10
/// ready-max-attempts: 30
/// concurrency: 4
/// quota:
///   requests.cpu: "4"
///   requests.memory: 8Gi
///   limits.memory: 16Gi
///   pods: 20
///   persistentvolumeclaims: 5
///   services: 10
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkshopConfigFile {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default, alias = "credential-namespace")]
    pub credential_namespace: Option<String>,
    #[serde(default, alias = "console-url")]
    pub console_url: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default, alias = "descriptor-path")]
    pub descriptor_path: Option<String>,
    #[serde(default, alias = "tool-image")]
    pub tool_image: Option<String>,
    #[serde(default, alias = "db-image")]
    pub db_image: Option<String>,
    #[serde(default, alias = "broker-image")]
    pub broker_image: Option<String>,
    #[serde(default, alias = "ready-interval-secs")]
    pub ready_interval_secs: Option<u64>,
    #[serde(default, alias = "ready-max-attempts")]
    pub ready_max_attempts: Option<u32>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub quota: Option<Quota>,
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}
