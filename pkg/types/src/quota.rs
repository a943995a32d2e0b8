use serde::{Deserialize, Serialize};

use crate::quantity::{Cpu, Memory};

/// Resource quota for a namespace, as exchanged with the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceQuota {
    pub name: String,
    pub namespace: String,
    pub hard: Quota,
}

/// Hard limits attached to exactly one namespace.
///
/// Field names on the wire follow the cluster's quota keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quota {
    /// Total CPU requested by all pods
    #[serde(rename = "requests.cpu")]
    pub cpu_request: Cpu,
    /// Total memory requested by all pods
    #[serde(rename = "requests.memory")]
    pub memory_request: Memory,
    /// Total memory limit across all pods
    #[serde(rename = "limits.memory")]
    pub memory_limit: Memory,
    #[serde(rename = "pods")]
    pub max_pods: u32,
    #[serde(rename = "persistentvolumeclaims")]
    pub max_pvcs: u32,
    #[serde(rename = "services")]
    pub max_services: u32,
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            cpu_request: Cpu::cores(4),
            memory_request: Memory::gibibytes(8),
            memory_limit: Memory::gibibytes(16),
            max_pods: 20,
            max_pvcs: 5,
            max_services: 10,
        }
    }
}

impl Quota {
    /// Reject quotas whose request exceeds its own limit.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.memory_request > self.memory_limit {
            anyhow::bail!(
                "quota requests.memory {} exceeds limits.memory {}",
                self.memory_request,
                self.memory_limit
            );
        }
        if self.max_pods == 0 {
            anyhow::bail!("quota must allow at least one pod");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_keys() {
        let json = serde_json::to_value(Quota::default()).unwrap();
        assert_eq!(json["requests.cpu"], "4");
        assert_eq!(json["requests.memory"], "8Gi");
        assert_eq!(json["limits.memory"], "16Gi");
        assert_eq!(json["pods"], 20);
        assert_eq!(json["persistentvolumeclaims"], 5);
        assert_eq!(json["services"], 10);
    }

    #[test]
    fn request_above_limit_is_invalid() {
        let quota = Quota {
            memory_request: Memory::gibibytes(32),
            ..Quota::default()
        };
        assert!(quota.validate().is_err());
        assert!(Quota::default().validate().is_ok());
    }
}
