//! [`ClusterApi`] over the cluster's REST API.

use async_trait::async_trait;
use pkg_constants::network::API_TIMEOUT_SECS;
use pkg_types::identity::CredentialSet;
use pkg_types::namespace::Namespace;
use pkg_types::quota::ResourceQuota;
use pkg_types::rbac::RoleBinding;
use pkg_types::workspace::Workspace;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::{AccessReview, ClusterApi, Principal, SecretRef};

/// Key of the htpasswd file inside the credential secret.
const HTPASSWD_KEY: &str = "htpasswd";

/// Resource kind the workspace operator registers with the API server.
const WORKSPACE_RESOURCE: &str = "workspaces";

#[derive(Debug, Serialize, Deserialize)]
struct CredentialSecret {
    name: String,
    namespace: String,
    #[serde(default)]
    data: BTreeMap<String, String>,
    #[serde(default)]
    revision: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccessReviewResponse {
    allowed: bool,
}

#[derive(Debug, Deserialize)]
struct ClusterInfo {
    #[serde(default)]
    version: String,
    #[serde(default)]
    resources: Vec<String>,
}

/// Authenticated REST client for the cluster API server.
#[derive(Clone)]
pub struct HttpCluster {
    client: reqwest::Client,
    server: String,
    token: Option<String>,
}

impl HttpCluster {
    pub fn new(server: &str, token: Option<String>, insecure: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .map_err(|e| GatewayError::Invalid(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.server, path);
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let resp = builder
            .send()
            .await
            .map_err(|e| GatewayError::Transient(format!("{}: {}", what, e)))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        debug!("{} failed with {}: {}", what, status, body);
        Err(status_error(status.as_u16(), what, body))
    }

    /// GET `path`, narrowed to objects carrying every label in `selector`.
    fn select(&self, path: &str, selector: &HashMap<String, String>) -> RequestBuilder {
        let builder = self.request(Method::GET, path);
        if selector.is_empty() {
            builder
        } else {
            builder.query(&[("labelSelector", label_selector(selector))])
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let resp = self.execute(self.request(Method::GET, path), what).await?;
        decode(resp, what).await
    }

    async fn get_optional<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<Option<T>> {
        match self.get_json(path, what).await {
            Ok(v) => Ok(Some(v)),
            Err(GatewayError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        what: &str,
    ) -> Result<Response> {
        self.execute(self.request(method, path).json(body), what)
            .await
    }

    async fn delete(&self, path: &str, what: &str) -> Result<()> {
        self.execute(self.request(Method::DELETE, path), what)
            .await
            .map(|_| ())
    }
}

async fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T> {
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| GatewayError::Transient(format!("{}: {}", what, e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Map a non-success status onto the error taxonomy.
fn status_error(status: u16, what: &str, body: String) -> GatewayError {
    match status {
        401 => GatewayError::Unauthenticated(what.to_string()),
        403 if body.contains("exceeded quota") => {
            GatewayError::QuotaExceeded(format!("{}: {}", what, body))
        }
        403 => GatewayError::Forbidden(what.to_string()),
        404 => GatewayError::NotFound(what.to_string()),
        409 => GatewayError::Conflict(what.to_string()),
        429 | 500..=599 => GatewayError::Transient(format!("{} ({}): {}", what, status, body)),
        _ => GatewayError::Api { status, body },
    }
}

/// `k=v` pairs in key order, comma separated.
fn label_selector(selector: &HashMap<String, String>) -> String {
    let mut pairs: Vec<String> = selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    pairs.sort();
    pairs.join(",")
}

#[async_trait]
impl ClusterApi for HttpCluster {
    async fn whoami(&self) -> Result<Principal> {
        self.get_json("/api/v1/whoami", "whoami").await
    }

    async fn read_credentials(&self, store: &SecretRef) -> Result<Option<CredentialSet>> {
        let path = format!("/api/v1/namespaces/{}/secrets/{}", store.namespace, store.name);
        let what = format!("credential store {}", store);
        let Some(secret) = self.get_optional::<CredentialSecret>(&path, &what).await? else {
            return Ok(None);
        };
        let text = secret.data.get(HTPASSWD_KEY).cloned().unwrap_or_default();
        let mut set = CredentialSet::parse_htpasswd(&text)
            .map_err(|e| GatewayError::Invalid(format!("{}: {}", what, e)))?;
        set.revision = secret.revision;
        Ok(Some(set))
    }

    async fn replace_credentials(
        &self,
        store: &SecretRef,
        set: &CredentialSet,
    ) -> Result<CredentialSet> {
        let path = format!("/api/v1/namespaces/{}/secrets/{}", store.namespace, store.name);
        let what = format!("credential store {}", store);
        let body = CredentialSecret {
            name: store.name.clone(),
            namespace: store.namespace.clone(),
            data: BTreeMap::from([(HTPASSWD_KEY.to_string(), set.to_htpasswd())]),
            revision: set.revision.clone(),
        };
        let resp = self.send_json(Method::PUT, &path, &body, &what).await?;
        let stored: CredentialSecret = decode(resp, &what).await?;
        Ok(CredentialSet {
            entries: set.entries.clone(),
            revision: stored.revision,
        })
    }

    async fn list_namespaces(&self, selector: &HashMap<String, String>) -> Result<Vec<Namespace>> {
        let what = "list namespaces";
        let resp = self
            .execute(self.select("/api/v1/namespaces", selector), what)
            .await?;
        decode(resp, what).await
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>> {
        let path = format!("/api/v1/namespaces/{}", name);
        self.get_optional(&path, &format!("namespace {}", name))
            .await
    }

    async fn create_namespace(&self, ns: &Namespace) -> Result<Namespace> {
        let what = format!("namespace {}", ns.name);
        let resp = self
            .send_json(Method::POST, "/api/v1/namespaces", ns, &what)
            .await?;
        decode(resp, &what).await
    }

    async fn delete_namespace(&self, name: &str) -> Result<()> {
        let path = format!("/api/v1/namespaces/{}", name);
        self.delete(&path, &format!("namespace {}", name)).await
    }

    async fn apply_quota(&self, quota: &ResourceQuota) -> Result<()> {
        let path = format!(
            "/api/v1/namespaces/{}/resourcequotas/{}",
            quota.namespace, quota.name
        );
        let what = format!("quota {}/{}", quota.namespace, quota.name);
        self.send_json(Method::PUT, &path, quota, &what)
            .await
            .map(|_| ())
    }

    async fn list_quotas(&self, namespace: &str) -> Result<Vec<ResourceQuota>> {
        let path = format!("/api/v1/namespaces/{}/resourcequotas", namespace);
        self.get_json(&path, &format!("quotas in {}", namespace))
            .await
    }

    async fn apply_role_binding(&self, binding: &RoleBinding) -> Result<()> {
        let path = format!(
            "/api/v1/namespaces/{}/rolebindings/{}",
            binding.namespace, binding.name
        );
        let what = format!("rolebinding {}/{}", binding.namespace, binding.name);
        self.send_json(Method::PUT, &path, binding, &what)
            .await
            .map(|_| ())
    }

    async fn list_role_bindings(&self, namespace: &str) -> Result<Vec<RoleBinding>> {
        let path = format!("/api/v1/namespaces/{}/rolebindings", namespace);
        self.get_json(&path, &format!("rolebindings in {}", namespace))
            .await
    }

    async fn list_workspaces(&self, namespace: &str) -> Result<Vec<Workspace>> {
        let path = format!("/api/v1/namespaces/{}/workspaces", namespace);
        self.get_json(&path, &format!("workspaces in {}", namespace))
            .await
    }

    async fn get_workspace(&self, namespace: &str, name: &str) -> Result<Option<Workspace>> {
        let path = format!("/api/v1/namespaces/{}/workspaces/{}", namespace, name);
        self.get_optional(&path, &format!("workspace {}/{}", namespace, name))
            .await
    }

    async fn create_workspace(&self, workspace: &Workspace) -> Result<Workspace> {
        let path = format!("/api/v1/namespaces/{}/workspaces", workspace.namespace);
        let what = format!("workspace {}", workspace.id());
        let resp = self.send_json(Method::POST, &path, workspace, &what).await?;
        decode(resp, &what).await
    }

    async fn access_review(&self, review: &AccessReview) -> Result<bool> {
        let what = format!(
            "access review {} {} in {}",
            review.user, review.verb, review.namespace
        );
        let resp = self
            .send_json(Method::POST, "/api/v1/accessreviews", review, &what)
            .await?;
        let answer: AccessReviewResponse = decode(resp, &what).await?;
        Ok(answer.allowed)
    }

    async fn workspace_api_available(&self) -> Result<bool> {
        let info: ClusterInfo = self.get_json("/api/v1/cluster/info", "cluster info").await?;
        debug!("Cluster version {}", info.version);
        Ok(info.resources.iter().any(|r| r == WORKSPACE_RESOURCE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_categories() {
        assert!(matches!(
            status_error(401, "x", String::new()),
            GatewayError::Unauthenticated(_)
        ));
        assert!(matches!(
            status_error(403, "x", String::new()),
            GatewayError::Forbidden(_)
        ));
        assert!(matches!(
            status_error(403, "x", "pods \"a\" is forbidden: exceeded quota".to_string()),
            GatewayError::QuotaExceeded(_)
        ));
        assert!(matches!(
            status_error(404, "x", String::new()),
            GatewayError::NotFound(_)
        ));
        assert!(matches!(
            status_error(409, "x", String::new()),
            GatewayError::Conflict(_)
        ));
        assert!(matches!(
            status_error(503, "x", String::new()),
            GatewayError::Transient(_)
        ));
        assert!(matches!(
            status_error(418, "x", "teapot".to_string()),
            GatewayError::Api { status: 418, .. }
        ));
    }

    #[test]
    fn selector_is_sorted_and_encoded() {
        let selector = HashMap::from([
            ("workshop.dev/owner".to_string(), "u1".to_string()),
            ("a".to_string(), "b".to_string()),
        ]);
        assert_eq!(label_selector(&selector), "a=b,workshop.dev/owner=u1");

        let cluster = HttpCluster::new("http://127.0.0.1:6443", None, false).unwrap();
        let request = cluster
            .select("/api/v1/namespaces", &selector)
            .build()
            .unwrap();
        assert_eq!(
            request.url().query(),
            Some("labelSelector=a%3Db%2Cworkshop.dev%2Fowner%3Du1")
        );

        let unfiltered = cluster
            .select("/api/v1/namespaces", &HashMap::new())
            .build()
            .unwrap();
        assert_eq!(unfiltered.url().query(), None);
    }

    #[test]
    fn server_url_is_normalized() {
        let cluster = HttpCluster::new("http://127.0.0.1:6443/", None, false).unwrap();
        assert_eq!(cluster.server, "http://127.0.0.1:6443");
    }
}
