//! AWS API models
//!
//! Wire types for the subset of EKS, IAM, ELB, EC2 and Resource Groups Tagging
//! the operator calls. Field names follow the AWS JSON shapes (camelCase for
//! EKS, PascalCase for the JSON-protocol services).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// AWS tag map.
pub type TagMap = BTreeMap<String, String>;

/// EKS cluster status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    Creating,
    Active,
    Deleting,
    Failed,
    Updating,
    Pending,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClusterStatus::Creating => "CREATING",
            ClusterStatus::Active => "ACTIVE",
            ClusterStatus::Deleting => "DELETING",
            ClusterStatus::Failed => "FAILED",
            ClusterStatus::Updating => "UPDATING",
            ClusterStatus::Pending => "PENDING",
            ClusterStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// EKS cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub name: String,
    #[serde(default)]
    pub arn: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub role_arn: Option<String>,
    #[serde(default)]
    pub resources_vpc_config: Option<VpcConfigResponse>,
    #[serde(default)]
    pub kubernetes_network_config: Option<KubernetesNetworkConfig>,
    #[serde(default)]
    pub logging: Option<Logging>,
    #[serde(default)]
    pub identity: Option<Identity>,
    pub status: ClusterStatus,
    #[serde(default)]
    pub encryption_config: Vec<EncryptionConfig>,
    #[serde(default)]
    pub access_config: Option<AccessConfigResponse>,
    #[serde(default)]
    pub tags: TagMap,
}

impl Cluster {
    /// Enabled log types, sorted.
    pub fn enabled_log_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .logging
            .iter()
            .flat_map(|l| l.cluster_logging.iter())
            .filter(|s| s.enabled)
            .flat_map(|s| s.types.iter().cloned())
            .collect();
        types.sort();
        types.dedup();
        types
    }

    /// OIDC issuer URL.
    pub fn oidc_issuer(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .and_then(|i| i.oidc.as_ref())
            .and_then(|o| o.issuer.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcConfigResponse {
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default)]
    pub cluster_security_group_id: Option<String>,
    #[serde(default)]
    pub vpc_id: Option<String>,
    #[serde(default)]
    pub endpoint_public_access: bool,
    #[serde(default)]
    pub endpoint_private_access: bool,
    #[serde(default)]
    pub public_access_cidrs: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcConfigRequest {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub subnet_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub security_group_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_public_access: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_private_access: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_access_cidrs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesNetworkConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_ipv4_cidr: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Logging {
    #[serde(default)]
    pub cluster_logging: Vec<LogSetup>,
}

impl Logging {
    /// Logging request enabling `enabled` and disabling the rest of `all`.
    pub fn from_enabled(enabled: &[String], all: &[&str]) -> Self {
        let disabled: Vec<String> = all
            .iter()
            .filter(|t| !enabled.iter().any(|e| e == *t))
            .map(|t| (*t).to_string())
            .collect();
        let mut cluster_logging = Vec::new();
        if !enabled.is_empty() {
            cluster_logging.push(LogSetup { types: enabled.to_vec(), enabled: true });
        }
        if !disabled.is_empty() {
            cluster_logging.push(LogSetup { types: disabled, enabled: false });
        }
        Self { cluster_logging }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSetup {
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub oidc: Option<Oidc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Oidc {
    #[serde(default)]
    pub issuer: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfig {
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub provider: Option<EncryptionProvider>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionProvider {
    pub key_arn: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfigResponse {
    #[serde(default)]
    pub authentication_mode: Option<String>,
    #[serde(default)]
    pub bootstrap_cluster_creator_admin_permissions: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccessConfigRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_cluster_creator_admin_permissions: Option<bool>,
}

/// CreateCluster request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClusterRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub role_arn: String,
    pub resources_vpc_config: VpcConfigRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_network_config: Option<KubernetesNetworkConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Logging>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub encryption_config: Vec<EncryptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_config: Option<CreateAccessConfigRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_self_managed_addons: Option<bool>,
    #[serde(skip_serializing_if = "TagMap::is_empty", default)]
    pub tags: TagMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_request_token: Option<String>,
}

/// UpdateClusterConfig request body; each call carries exactly one aspect
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClusterConfigRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources_vpc_config: Option<VpcConfigRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Logging>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_config: Option<CreateAccessConfigRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_request_token: Option<String>,
}

/// Asynchronous update handle returned by update calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// EKS managed add-on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Addon {
    pub addon_name: String,
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub addon_version: Option<String>,
    #[serde(default)]
    pub addon_arn: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub health: Option<AddonHealth>,
    #[serde(default)]
    pub service_account_role_arn: Option<String>,
    #[serde(default)]
    pub configuration_values: Option<String>,
    #[serde(default)]
    pub tags: TagMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddonHealth {
    #[serde(default)]
    pub issues: Vec<AddonIssue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonIssue {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub resource_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAddonRequest {
    pub addon_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addon_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_role_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_conflicts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_values: Option<String>,
    #[serde(skip_serializing_if = "TagMap::is_empty", default)]
    pub tags: TagMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_request_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAddonRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addon_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_role_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_conflicts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_values: Option<String>,
}

/// EKS access entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEntry {
    pub principal_arn: String,
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub access_entry_arn: Option<String>,
    #[serde(default)]
    pub kubernetes_groups: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(rename = "type", default)]
    pub type_: Option<String>,
    #[serde(default)]
    pub tags: TagMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccessEntryRequest {
    pub principal_arn: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub kubernetes_groups: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(skip_serializing_if = "TagMap::is_empty", default)]
    pub tags: TagMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccessEntryRequest {
    #[serde(default)]
    pub kubernetes_groups: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Access policy associated with an access entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociatedAccessPolicy {
    pub policy_arn: String,
    pub access_scope: AccessScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessScope {
    /// "cluster" or "namespace"
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub namespaces: Vec<String>,
}

/// EKS managed node group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nodegroup {
    pub nodegroup_name: String,
    #[serde(default)]
    pub nodegroup_arn: Option<String>,
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tags: TagMap,
}

/// IAM role
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    pub role_name: String,
    pub arn: String,
}

/// Load balancer generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadBalancerKind {
    /// Application or network load balancer, addressed by ARN
    V2,
    /// Classic load balancer, addressed by name
    Classic,
}

/// Load balancer from either ELB API generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoadBalancer {
    pub load_balancer_name: String,
    #[serde(default)]
    pub load_balancer_arn: Option<String>,
    #[serde(rename = "DNSName", default)]
    pub dns_name: Option<String>,
    pub kind: LoadBalancerKind,
}

impl LoadBalancer {
    /// Identifier accepted by the delete call for this generation.
    pub fn reference(&self) -> LoadBalancerRef {
        match (self.kind, &self.load_balancer_arn) {
            (LoadBalancerKind::V2, Some(arn)) => LoadBalancerRef::V2 { arn: arn.clone() },
            _ => LoadBalancerRef::Classic {
                name: self.load_balancer_name.clone(),
            },
        }
    }
}

/// Load balancer delete target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LoadBalancerRef {
    /// v2 load balancer ARN
    V2 { arn: String },
    /// Classic load balancer name
    Classic { name: String },
}

impl fmt::Display for LoadBalancerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadBalancerRef::V2 { arn } => f.write_str(arn),
            LoadBalancerRef::Classic { name } => f.write_str(name),
        }
    }
}

/// Tag filter for GetResources
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TagFilter {
    pub key: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Resource returned by GetResources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedResource {
    #[serde(rename = "ResourceARN")]
    pub resource_arn: String,
    #[serde(rename = "Tags", default, with = "tag_list")]
    pub tags: TagMap,
}

/// The tagging API encodes tags as `[{"Key": .., "Value": ..}]`.
mod tag_list {
    use super::TagMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Tag {
        key: String,
        #[serde(default)]
        value: String,
    }

    pub fn serialize<S: Serializer>(tags: &TagMap, s: S) -> Result<S::Ok, S::Error> {
        tags.iter()
            .map(|(k, v)| Tag { key: k.clone(), value: v.clone() })
            .collect::<Vec<_>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TagMap, D::Error> {
        let tags = Vec::<Tag>::deserialize(d)?;
        Ok(tags.into_iter().map(|t| (t.key, t.value)).collect())
    }
}
