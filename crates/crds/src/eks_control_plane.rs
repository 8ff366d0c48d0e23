//! EKSControlPlane CRD
//!
//! Declares a managed EKS control plane. The reconciler converges the remote
//! cluster, its add-ons and access entries onto this spec and reports progress
//! through the status subresource.

use crate::conditions::{Condition, Conditions};
use crate::network::{BastionSpec, NetworkSpec, NetworkStatus};
use crate::references::IdentityRef;
use crate::tags::Tags;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group of the control plane kind.
pub const API_GROUP: &str = "controlplane.cluster.x-k8s.io";

/// Served and storage version.
pub const API_VERSION: &str = "v1beta2";

/// Finalizer blocking deletion until remote resources are gone.
pub const CONTROL_PLANE_FINALIZER: &str = "awsmanagedcontrolplane.controlplane.cluster.x-k8s.io";

/// Annotation that opts a cluster out of external resource garbage collection.
pub const EXTERNAL_RESOURCE_GC_ANNOTATION: &str = "aws.cluster.x-k8s.io/external-resource-gc";

/// Name of the VPC CNI add-on.
pub const VPC_CNI_ADDON: &str = "vpc-cni";

/// Name of the kube-proxy add-on.
pub const KUBE_PROXY_ADDON: &str = "kube-proxy";

/// Condition types written by the reconciler.
pub mod condition_types {
    /// Remote cluster is active and reachable.
    pub const EKS_CONTROL_PLANE_READY: &str = "EKSControlPlaneReady";
    /// Remote cluster is being created.
    pub const EKS_CONTROL_PLANE_CREATING: &str = "EKSControlPlaneCreating";
    /// Remote cluster is applying an update.
    pub const EKS_CONTROL_PLANE_UPDATING: &str = "EKSControlPlaneUpdating";
    /// Declared add-ons are installed.
    pub const EKS_ADDONS_CONFIGURED: &str = "EKSAddonsConfigured";
    /// OIDC identity provider is associated.
    pub const EKS_IDENTITY_PROVIDER_CONFIGURED: &str = "EKSIdentityProviderConfigured";
    /// aws-auth mapping is applied in the workload cluster.
    pub const IAM_AUTHENTICATOR_CONFIGURED: &str = "IAMAuthenticatorConfigured";
    /// Workload-created cloud resources were removed.
    pub const EXTERNAL_RESOURCE_GC_SUCCEEDED: &str = "ExternalResourceGCSucceeded";
}

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "controlplane.cluster.x-k8s.io",
    version = "v1beta2",
    kind = "EKSControlPlane",
    root = "EksControlPlane",
    shortname = "eksctl",
    namespaced,
    status = "EksControlPlaneStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct EksControlPlaneSpec {
    /// Remote cluster name; defaulted from namespace and name when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eks_cluster_name: Option<String>,

    /// AWS region
    pub region: String,

    /// AWS partition (defaults to "aws" when building ARNs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,

    /// Kubernetes version, e.g. "v1.29"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// IAM role assumed by the control plane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,

    /// Network configuration
    #[serde(default)]
    pub network: NetworkSpec,

    /// Secondary CIDR for pod networking (100.64.0.0/10 or 198.19.0.0/16)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_cidr_block: Option<String>,

    /// Envelope encryption of Kubernetes secrets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_config: Option<EncryptionConfig>,

    /// Managed add-ons
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addons: Option<Vec<Addon>>,

    /// Cluster access configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_config: Option<AccessConfig>,

    /// Access entries granting principals cluster access
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_entries: Vec<AccessEntry>,

    /// API server endpoint access
    #[serde(default)]
    pub endpoint_access: EndpointAccess,

    /// Control plane log types shipped to CloudWatch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<ControlPlaneLoggingSpec>,

    /// Built-in kube-proxy settings
    #[serde(default)]
    pub kube_proxy: KubeProxy,

    /// Built-in VPC CNI settings
    #[serde(default)]
    pub vpc_cni: VpcCni,

    /// Install the default self-managed add-ons on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_self_managed_addons: Option<bool>,

    /// Tags added to every resource the operator creates
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub additional_tags: Tags,

    /// Identity used for AWS API calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_ref: Option<IdentityRef>,

    /// How kubeconfig tokens are obtained
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_method: Option<TokenMethod>,

    /// Bastion host
    #[serde(default)]
    pub bastion: BastionSpec,

    /// Associate an IAM OIDC provider with the cluster issuer
    #[serde(default)]
    pub associate_oidc_provider: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfig {
    /// KMS key ARN; immutable once set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Resources to encrypt, e.g. "secrets"
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
}

impl EncryptionConfig {
    /// Provider with empty strings treated as unset.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref().filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Addon {
    /// Add-on name, e.g. "vpc-cni"
    pub name: String,

    /// Add-on version, e.g. "v1.15.1-eksbuild.1"
    pub version: String,

    /// JSON configuration values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<String>,

    /// What to do when fields managed by the add-on were changed in-cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_resolution: Option<AddonResolution>,

    /// IAM role for the add-on service account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_role_arn: Option<String>,
}

/// Conflict resolution strategy for add-on create and update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddonResolution {
    /// Overwrite conflicting in-cluster fields
    #[default]
    Overwrite,
    /// Fail on conflict
    None,
    /// Keep in-cluster values (update only)
    Preserve,
}

impl AddonResolution {
    /// Value sent as `resolveConflicts`.
    pub fn as_api_str(self) -> &'static str {
        match self {
            AddonResolution::Overwrite => "OVERWRITE",
            AddonResolution::None => "NONE",
            AddonResolution::Preserve => "PRESERVE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    /// Authentication mode; only moves forward
    #[serde(default)]
    pub authentication_mode: AuthenticationMode,

    /// Grant the creating principal cluster admin on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_cluster_creator_admin_permissions: Option<bool>,
}

/// Cluster authentication mode.
///
/// Modes are ordered `CONFIG_MAP < API_AND_CONFIG_MAP < API`; EKS only allows
/// moving forward along that order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationMode {
    /// aws-auth ConfigMap only
    #[default]
    ConfigMap,
    /// Access entries and the ConfigMap
    ApiAndConfigMap,
    /// Access entries only
    Api,
}

impl AuthenticationMode {
    fn rank(self) -> u8 {
        match self {
            AuthenticationMode::ConfigMap => 0,
            AuthenticationMode::ApiAndConfigMap => 1,
            AuthenticationMode::Api => 2,
        }
    }

    /// Whether moving from `self` to `next` is permitted.
    pub fn can_transition_to(self, next: AuthenticationMode) -> bool {
        next.rank() >= self.rank()
    }

    /// Value used by the EKS API.
    pub fn as_api_str(self) -> &'static str {
        match self {
            AuthenticationMode::ConfigMap => "CONFIG_MAP",
            AuthenticationMode::ApiAndConfigMap => "API_AND_CONFIG_MAP",
            AuthenticationMode::Api => "API",
        }
    }

    /// Parse the EKS API value.
    pub fn from_api_str(s: &str) -> Option<Self> {
        match s {
            "CONFIG_MAP" => Some(AuthenticationMode::ConfigMap),
            "API_AND_CONFIG_MAP" => Some(AuthenticationMode::ApiAndConfigMap),
            "API" => Some(AuthenticationMode::Api),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessEntry {
    /// IAM principal ARN
    pub principal_arn: String,

    /// Entry type: STANDARD, EC2_LINUX, EC2_WINDOWS, FARGATE_LINUX
    #[serde(rename = "type", default = "default_access_entry_type")]
    pub type_: String,

    /// Kubernetes username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Kubernetes groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kubernetes_groups: Vec<String>,

    /// Access policies associated with the entry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_policies: Vec<AccessPolicyReference>,
}

fn default_access_entry_type() -> String {
    "STANDARD".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicyReference {
    /// Policy ARN, e.g. arn:aws:eks::aws:cluster-access-policy/AmazonEKSViewPolicy
    pub policy_arn: String,

    /// Scope of the association
    pub access_scope: AccessScope,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessScope {
    /// Scope type
    #[serde(rename = "type")]
    pub type_: AccessScopeType,

    /// Namespaces when the scope is `namespace`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessScopeType {
    /// Whole cluster
    Cluster,
    /// Listed namespaces
    Namespace,
}

/// Default public access CIDR.
pub const DEFAULT_PUBLIC_CIDR: &str = "0.0.0.0/0";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EndpointAccess {
    /// Public endpoint enabled (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,

    /// CIDRs allowed to reach the public endpoint
    #[serde(default, rename = "publicCIDRs", skip_serializing_if = "Option::is_none")]
    pub public_cidrs: Option<Vec<String>>,

    /// Private endpoint enabled (default false)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
}

impl EndpointAccess {
    /// Public access with the EKS default applied.
    pub fn public_enabled(&self) -> bool {
        self.public.unwrap_or(true)
    }

    /// Private access with the EKS default applied.
    pub fn private_enabled(&self) -> bool {
        self.private.unwrap_or(false)
    }

    /// Public CIDRs as a sorted set, defaulting to 0.0.0.0/0.
    pub fn public_cidr_set(&self) -> Vec<String> {
        let mut cidrs = match &self.public_cidrs {
            Some(c) if !c.is_empty() => c.clone(),
            _ => vec![DEFAULT_PUBLIC_CIDR.to_string()],
        };
        cidrs.sort();
        cidrs.dedup();
        cidrs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneLoggingSpec {
    /// API server logs
    #[serde(default)]
    pub api_server: bool,
    /// Audit logs
    #[serde(default)]
    pub audit: bool,
    /// Authenticator logs
    #[serde(default)]
    pub authenticator: bool,
    /// Controller manager logs
    #[serde(default)]
    pub controller_manager: bool,
    /// Scheduler logs
    #[serde(default)]
    pub scheduler: bool,
}

/// All EKS control plane log types.
pub const LOG_TYPES: [&str; 5] = ["api", "audit", "authenticator", "controllerManager", "scheduler"];

impl ControlPlaneLoggingSpec {
    /// Enabled EKS log types.
    pub fn enabled_types(&self) -> Vec<&'static str> {
        let flags = [
            self.api_server,
            self.audit,
            self.authenticator,
            self.controller_manager,
            self.scheduler,
        ];
        LOG_TYPES
            .iter()
            .zip(flags)
            .filter_map(|(t, on)| on.then_some(*t))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct KubeProxy {
    /// Remove the built-in kube-proxy daemonset
    #[serde(default)]
    pub disable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VpcCni {
    /// Remove the built-in aws-node daemonset
    #[serde(default)]
    pub disable: bool,

    /// Extra environment for aws-node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVarSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSpec {
    /// Variable name
    pub name: String,
    /// Variable value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// How workload kubeconfig tokens are generated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TokenMethod {
    /// aws-iam-authenticator exec plugin
    #[default]
    IamAuthenticator,
    /// `aws eks get-token`
    AwsCli,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct EksControlPlaneStatus {
    /// Lifecycle phase
    #[serde(default)]
    pub phase: ControlPlanePhase,

    /// Control plane is ready for workloads
    #[serde(default)]
    pub ready: bool,

    /// Workload bootstrap artifacts applied
    #[serde(default)]
    pub initialized: bool,

    /// Version reported by EKS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// API server endpoint, host:443
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Observed network state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_status: Option<NetworkStatus>,

    /// Bastion instance id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bastion: Option<String>,

    /// OIDC provider state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_provider: Option<OidcProviderStatus>,

    /// Identity provider association state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_provider_status: Option<IdentityProviderStatus>,

    /// Add-on states as reported by EKS
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addons: Vec<AddonState>,

    /// Terminal failure, recorded verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,

    /// Conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Generation at which the object entered Failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Garbage collection passes that ended in partial failure
    #[serde(default)]
    pub gc_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
/// Control plane lifecycle phase
///
/// Serializes as PascalCase but also accepts lowercase.
#[serde(rename_all = "PascalCase")]
pub enum ControlPlanePhase {
    /// Not yet created
    #[default]
    #[serde(alias = "pending")]
    Pending,

    /// Create issued, waiting for ACTIVE
    #[serde(alias = "creating")]
    Creating,

    /// In-place configuration update in flight
    #[serde(alias = "updating")]
    Updating,

    /// Version upgrade in flight
    #[serde(alias = "upgrading")]
    Upgrading,

    /// Converged
    #[serde(alias = "ready")]
    Ready,

    /// Teardown in progress
    #[serde(alias = "deleting")]
    Deleting,

    /// Non-retryable failure; suspended until the spec changes
    #[serde(alias = "failed")]
    Failed,
}

impl std::fmt::Display for ControlPlanePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ControlPlanePhase::Pending => "Pending",
            ControlPlanePhase::Creating => "Creating",
            ControlPlanePhase::Updating => "Updating",
            ControlPlanePhase::Upgrading => "Upgrading",
            ControlPlanePhase::Ready => "Ready",
            ControlPlanePhase::Deleting => "Deleting",
            ControlPlanePhase::Failed => "Failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OidcProviderStatus {
    /// IAM OIDC provider ARN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,

    /// Cluster issuer URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IdentityProviderStatus {
    /// Identity provider config ARN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,

    /// Association status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AddonState {
    /// Add-on name
    pub name: String,
    /// Installed version
    pub version: String,
    /// Add-on ARN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arn: Option<String>,
    /// EKS status string, e.g. ACTIVE or DEGRADED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Last modification time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Health issues
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<AddonIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AddonIssue {
    /// Issue code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Issue message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Affected resources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_ids: Vec<String>,
}

impl EksControlPlane {
    /// `namespace/name` key used in logs and backoff tracking.
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_else(|| "default".to_string()),
            self.name_any()
        )
    }

    /// Remote cluster name, if set and non-empty.
    pub fn cluster_name(&self) -> Option<&str> {
        self.spec.eks_cluster_name.as_deref().filter(|n| !n.is_empty())
    }

    /// Whether the control plane finalizer is present.
    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == CONTROL_PLANE_FINALIZER)
    }

    /// Whether a deletion timestamp is set.
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// False only when the GC opt-out annotation is "false".
    pub fn gc_enabled(&self) -> bool {
        self.annotations()
            .get(EXTERNAL_RESOURCE_GC_ANNOTATION)
            .is_none_or(|v| !v.eq_ignore_ascii_case("false"))
    }

    /// Whether the VPC is configured for IPv6.
    pub fn ipv6_enabled(&self) -> bool {
        self.spec.network.vpc.ipv6.is_some()
    }

    /// Current phase, Pending when no status was written yet.
    pub fn phase(&self) -> ControlPlanePhase {
        self.status.as_ref().map(|s| s.phase.clone()).unwrap_or_default()
    }
}

impl EksControlPlaneSpec {
    /// Declared add-ons, empty when unset.
    pub fn addons(&self) -> &[Addon] {
        self.addons.as_deref().unwrap_or(&[])
    }

    /// Declared add-on by name.
    pub fn addon(&self, name: &str) -> Option<&Addon> {
        self.addons().iter().find(|a| a.name == name)
    }

    /// Desired authentication mode; CONFIG_MAP when unset.
    pub fn authentication_mode(&self) -> AuthenticationMode {
        self.access_config
            .as_ref()
            .map(|a| a.authentication_mode)
            .unwrap_or_default()
    }

    /// Desired enabled log types.
    pub fn log_types(&self) -> Vec<&'static str> {
        self.logging
            .as_ref()
            .map(ControlPlaneLoggingSpec::enabled_types)
            .unwrap_or_default()
    }
}

impl Conditions for EksControlPlane {
    fn conditions(&self) -> &[Condition] {
        self.status.as_ref().map_or(&[], |s| s.conditions.as_slice())
    }

    fn set_conditions(&mut self, conditions: Vec<Condition>) {
        self.status.get_or_insert_with(Default::default).conditions = conditions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn control_plane(annotations: Option<BTreeMap<String, String>>) -> EksControlPlane {
        EksControlPlane {
            metadata: ObjectMeta {
                name: Some("cp".to_string()),
                namespace: Some("team-a".to_string()),
                annotations,
                ..Default::default()
            },
            spec: EksControlPlaneSpec {
                region: "eu-west-1".to_string(),
                ..Default::default()
            },
            status: None,
        }
    }

    #[test]
    fn test_phase_accepts_lowercase() {
        let phase: ControlPlanePhase = serde_json::from_str("\"ready\"").unwrap();
        assert_eq!(phase, ControlPlanePhase::Ready);
        assert_eq!(serde_json::to_string(&phase).unwrap(), "\"Ready\"");
    }

    #[test]
    fn test_authentication_mode_lattice() {
        use AuthenticationMode::*;
        assert!(ConfigMap.can_transition_to(ApiAndConfigMap));
        assert!(ConfigMap.can_transition_to(Api));
        assert!(ApiAndConfigMap.can_transition_to(Api));
        assert!(Api.can_transition_to(Api));
        assert!(!Api.can_transition_to(ApiAndConfigMap));
        assert!(!ApiAndConfigMap.can_transition_to(ConfigMap));
        assert_eq!(
            serde_json::to_string(&ApiAndConfigMap).unwrap(),
            "\"API_AND_CONFIG_MAP\""
        );
    }

    #[test]
    fn test_gc_annotation() {
        assert!(control_plane(None).gc_enabled());
        let mut ann = BTreeMap::new();
        ann.insert(EXTERNAL_RESOURCE_GC_ANNOTATION.to_string(), "false".to_string());
        assert!(!control_plane(Some(ann.clone())).gc_enabled());
        ann.insert(EXTERNAL_RESOURCE_GC_ANNOTATION.to_string(), "true".to_string());
        assert!(control_plane(Some(ann)).gc_enabled());
    }

    #[test]
    fn test_logging_enabled_types() {
        let logging = ControlPlaneLoggingSpec {
            api_server: true,
            controller_manager: true,
            ..Default::default()
        };
        assert_eq!(logging.enabled_types(), vec!["api", "controllerManager"]);
    }

    #[test]
    fn test_endpoint_access_defaults() {
        let access = EndpointAccess::default();
        assert!(access.public_enabled());
        assert!(!access.private_enabled());
        assert_eq!(access.public_cidr_set(), vec!["0.0.0.0/0".to_string()]);
    }

    #[test]
    fn test_conditions_create_status() {
        let mut cp = control_plane(None);
        assert!(cp.conditions().is_empty());
        conditions::mark_true(&mut cp, condition_types::EKS_CONTROL_PLANE_READY);
        assert!(conditions::is_true(&cp, condition_types::EKS_CONTROL_PLANE_READY));
        assert_eq!(cp.key(), "team-a/cp");
    }
}
