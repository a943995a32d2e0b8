//! TCP reachability probes for the workshop's auxiliary services.

use pkg_constants::network::*;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use crate::report::CheckResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub name: &'static str,
    pub host: String,
    pub port: u16,
}

impl ServiceEndpoint {
    fn from_lookup(
        name: &'static str,
        (host_var, port_var): (&str, &str),
        (default_host, default_port): (&str, u16),
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Self {
        let host = lookup(host_var)
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| default_host.to_string());
        let port = lookup(port_var)
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(default_port);
        Self { name, host, port }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database, message broker and tool container, resolved through `lookup`.
/// Unset or unparsable values fall back to local defaults.
pub fn endpoints_with(lookup: impl Fn(&str) -> Option<String>) -> Vec<ServiceEndpoint> {
    vec![
        ServiceEndpoint::from_lookup(
            "database",
            (ENV_DB_HOST, ENV_DB_PORT),
            (DEFAULT_DB_HOST, DEFAULT_DB_PORT),
            &lookup,
        ),
        ServiceEndpoint::from_lookup(
            "broker",
            (ENV_BROKER_HOST, ENV_BROKER_PORT),
            (DEFAULT_BROKER_HOST, DEFAULT_BROKER_PORT),
            &lookup,
        ),
        ServiceEndpoint::from_lookup(
            "tool",
            (ENV_TOOL_HOST, ENV_TOOL_PORT),
            (DEFAULT_TOOL_HOST, DEFAULT_TOOL_PORT),
            &lookup,
        ),
    ]
}

pub fn endpoints_from_env() -> Vec<ServiceEndpoint> {
    endpoints_with(|key| std::env::var(key).ok())
}

pub async fn probe(endpoint: &ServiceEndpoint, timeout: Duration) -> CheckResult {
    let addr = endpoint.address();
    debug!("Probing {} at {}", endpoint.name, addr);
    match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(_)) => CheckResult::pass("probe", endpoint.name, format!("{} reachable", addr)),
        Ok(Err(e)) => CheckResult::fail("probe", endpoint.name, format!("{}: {}", addr, e)),
        Err(_) => CheckResult::fail(
            "probe",
            endpoint.name,
            format!("{}: no answer within {:?}", addr, timeout),
        ),
    }
}
