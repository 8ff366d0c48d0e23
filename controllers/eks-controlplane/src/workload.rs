//! Access to the managed (workload) cluster.
//!
//! The reconciler needs three things from inside the EKS cluster: the hostnames
//! of `LoadBalancer` Services for direct garbage collection, the `aws-auth`
//! ConfigMap for IAM authenticator bootstrap, and the API server's `/readyz`.
//! Credentials come from the `<cluster>-kubeconfig` Secret next to the control
//! plane object.

use crate::error::ControllerError;
use async_trait::async_trait;
use crds::{AccessEntry, EksControlPlane};
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::api::{ListParams, ObjectMeta, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, ResourceExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Label naming the owning Cluster API cluster.
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Key of the kubeconfig in the Secret.
pub const KUBECONFIG_SECRET_KEY: &str = "value";

/// Namespace and name of the IAM authenticator ConfigMap.
pub const AUTH_CONFIG_NAMESPACE: &str = "kube-system";
pub const AUTH_CONFIG_NAME: &str = "aws-auth";

/// One `mapRoles` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMapping {
    pub rolearn: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

/// One `mapUsers` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMapping {
    pub userarn: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

/// Desired IAM authenticator mappings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    pub map_roles: Vec<RoleMapping>,
    pub map_users: Vec<UserMapping>,
}

impl AuthConfig {
    /// Mappings for declared access entries that name a role or a user.
    pub fn from_access_entries(entries: &[AccessEntry]) -> Self {
        let mut config = Self::default();
        for entry in entries {
            let username = entry.username.clone().unwrap_or_default();
            let groups = entry.kubernetes_groups.clone();
            if entry.principal_arn.contains(":role/") {
                config.map_roles.push(RoleMapping {
                    rolearn: entry.principal_arn.clone(),
                    username,
                    groups,
                });
            } else if entry.principal_arn.contains(":user/") {
                config.map_users.push(UserMapping {
                    userarn: entry.principal_arn.clone(),
                    username,
                    groups,
                });
            }
        }
        config
    }

    /// Merge into existing ConfigMap data.
    ///
    /// Mappings already present (by ARN) are left as the cluster admin wrote
    /// them; missing ones are appended. Returns `None` when nothing changes.
    pub fn merge_into(&self, existing: &BTreeMap<String, String>) -> Result<Option<BTreeMap<String, String>>, ControllerError> {
        let mut roles: Vec<RoleMapping> = parse_mappings(existing.get("mapRoles"))?;
        let mut users: Vec<UserMapping> = parse_mappings(existing.get("mapUsers"))?;

        let mut changed = false;
        for role in &self.map_roles {
            if !roles.iter().any(|r| r.rolearn == role.rolearn) {
                roles.push(role.clone());
                changed = true;
            }
        }
        for user in &self.map_users {
            if !users.iter().any(|u| u.userarn == user.userarn) {
                users.push(user.clone());
                changed = true;
            }
        }
        if !changed && existing.contains_key("mapRoles") {
            return Ok(None);
        }

        let mut data = existing.clone();
        data.insert("mapRoles".to_string(), render(&roles)?);
        if !users.is_empty() {
            data.insert("mapUsers".to_string(), render(&users)?);
        }
        Ok(Some(data))
    }
}

fn parse_mappings<T: for<'de> Deserialize<'de>>(raw: Option<&String>) -> Result<Vec<T>, ControllerError> {
    match raw.map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(s) => serde_yaml::from_str(s).map_err(|e| ControllerError::Workload(format!("malformed aws-auth mapping: {e}"))),
        None => Ok(Vec::new()),
    }
}

fn render<T: Serialize>(mappings: &[T]) -> Result<String, ControllerError> {
    if mappings.is_empty() {
        return Ok(String::new());
    }
    serde_yaml::to_string(mappings).map_err(|e| ControllerError::Workload(e.to_string()))
}

/// Operations the reconciler performs inside the workload cluster.
#[async_trait]
pub trait WorkloadClusterClient: Send + Sync {
    /// Ingress hostnames of every `LoadBalancer` Service.
    async fn list_load_balancer_services(&self) -> Result<Vec<String>, ControllerError>;

    /// Create or extend `kube-system/aws-auth`.
    async fn apply_auth_config(&self, config: &AuthConfig) -> Result<(), ControllerError>;

    /// Whether `/readyz` answers `ok`.
    async fn api_server_ready(&self) -> Result<bool, ControllerError>;
}

/// Builds workload clients for control planes.
#[async_trait]
pub trait WorkloadClientFactory: Send + Sync {
    /// Client for the cluster behind `cp`, or `None` while no kubeconfig is published.
    async fn connect(&self, cp: &EksControlPlane) -> Result<Option<Arc<dyn WorkloadClusterClient>>, ControllerError>;
}

/// Name of the Secret holding the workload kubeconfig.
pub fn kubeconfig_secret_name(cp: &EksControlPlane) -> String {
    let cluster = cp
        .labels()
        .get(CLUSTER_NAME_LABEL)
        .cloned()
        .unwrap_or_else(|| cp.name_any());
    format!("{cluster}-kubeconfig")
}

/// Factory reading kubeconfig Secrets from the management cluster.
#[derive(Clone)]
pub struct KubeWorkloadClientFactory {
    client: Client,
}

impl KubeWorkloadClientFactory {
    /// Create a factory using the management cluster `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkloadClientFactory for KubeWorkloadClientFactory {
    async fn connect(&self, cp: &EksControlPlane) -> Result<Option<Arc<dyn WorkloadClusterClient>>, ControllerError> {
        let namespace = cp.namespace().unwrap_or_else(|| "default".to_string());
        let secret_name = kubeconfig_secret_name(cp);
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);

        let Some(secret) = secrets.get_opt(&secret_name).await? else {
            debug!("Kubeconfig secret {}/{} not found yet", namespace, secret_name);
            return Ok(None);
        };
        let raw = secret
            .data
            .as_ref()
            .and_then(|d| d.get(KUBECONFIG_SECRET_KEY))
            .ok_or_else(|| ControllerError::Workload(format!("secret {namespace}/{secret_name} has no '{KUBECONFIG_SECRET_KEY}' key")))?;
        let yaml = String::from_utf8(raw.0.clone())
            .map_err(|e| ControllerError::Workload(format!("kubeconfig is not UTF-8: {e}")))?;

        let kubeconfig = Kubeconfig::from_yaml(&yaml).map_err(|e| ControllerError::Workload(e.to_string()))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| ControllerError::Workload(e.to_string()))?;
        let client = Client::try_from(config)?;
        Ok(Some(Arc::new(KubeWorkloadClient { client })))
    }
}

/// Workload client backed by a kube `Client`.
#[derive(Clone)]
pub struct KubeWorkloadClient {
    client: Client,
}

#[async_trait]
impl WorkloadClusterClient for KubeWorkloadClient {
    async fn list_load_balancer_services(&self) -> Result<Vec<String>, ControllerError> {
        let services: Api<Service> = Api::all(self.client.clone());
        let list = services.list(&ListParams::default()).await?;
        Ok(load_balancer_hostnames(&list.items))
    }

    async fn apply_auth_config(&self, config: &AuthConfig) -> Result<(), ControllerError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), AUTH_CONFIG_NAMESPACE);
        match api.get_opt(AUTH_CONFIG_NAME).await? {
            None => {
                let data = config.merge_into(&BTreeMap::new())?.unwrap_or_default();
                let cm = ConfigMap {
                    metadata: ObjectMeta {
                        name: Some(AUTH_CONFIG_NAME.to_string()),
                        namespace: Some(AUTH_CONFIG_NAMESPACE.to_string()),
                        ..Default::default()
                    },
                    data: Some(data),
                    ..Default::default()
                };
                api.create(&PostParams::default(), &cm).await?;
                info!("Created {}/{}", AUTH_CONFIG_NAMESPACE, AUTH_CONFIG_NAME);
            }
            Some(mut cm) => {
                let existing = cm.data.clone().unwrap_or_default();
                if let Some(data) = config.merge_into(&existing)? {
                    cm.data = Some(data);
                    api.replace(AUTH_CONFIG_NAME, &PostParams::default(), &cm).await?;
                    info!("Updated {}/{}", AUTH_CONFIG_NAMESPACE, AUTH_CONFIG_NAME);
                }
            }
        }
        Ok(())
    }

    async fn api_server_ready(&self) -> Result<bool, ControllerError> {
        let request = axum::http::Request::get("/readyz")
            .body(Vec::new())
            .map_err(|e| ControllerError::Workload(e.to_string()))?;
        match self.client.request_text(request).await {
            Ok(body) => Ok(body.trim() == "ok"),
            Err(e) => {
                debug!("API server not ready: {}", e);
                Ok(false)
            }
        }
    }
}

/// Ingress hostnames of `LoadBalancer` Services, sorted and deduplicated.
pub fn load_balancer_hostnames(services: &[Service]) -> Vec<String> {
    let mut hostnames: Vec<String> = services
        .iter()
        .filter(|s| s.spec.as_ref().and_then(|spec| spec.type_.as_deref()) == Some("LoadBalancer"))
        .filter_map(|s| s.status.as_ref()?.load_balancer.as_ref()?.ingress.as_ref())
        .flatten()
        .filter_map(|ingress| ingress.hostname.clone())
        .collect();
    hostnames.sort();
    hostnames.dedup();
    hostnames
}
