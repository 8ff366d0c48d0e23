//! EksClient trait for mocking
//!
//! This trait abstracts the AWS gateway so reconcilers and the garbage
//! collector can run against `MockEksClient` in unit tests. The concrete
//! `EksClient` and the `RateLimitedClient` wrapper both implement it.

use crate::error::EksError;
use crate::models::*;

/// Trait for AWS API operations used by the control plane operator
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait EksClientTrait: Send + Sync {
    /// Gateway endpoint
    fn endpoint(&self) -> &str;

    /// Check connectivity and credentials
    async fn validate_connectivity(&self) -> Result<(), EksError>;

    // Cluster operations
    async fn describe_cluster(&self, name: &str) -> Result<Cluster, EksError>;
    async fn create_cluster(&self, request: &CreateClusterRequest) -> Result<Cluster, EksError>;
    async fn update_cluster_version(&self, name: &str, version: &str, client_request_token: Option<&str>) -> Result<Update, EksError>;
    async fn update_cluster_config(&self, name: &str, request: &UpdateClusterConfigRequest) -> Result<Update, EksError>;
    async fn delete_cluster(&self, name: &str) -> Result<Cluster, EksError>;
    async fn tag_resource(&self, resource_arn: &str, tags: &TagMap) -> Result<(), EksError>;

    // Add-on operations
    async fn list_addons(&self, cluster: &str) -> Result<Vec<String>, EksError>;
    async fn describe_addon(&self, cluster: &str, addon: &str) -> Result<Addon, EksError>;
    async fn create_addon(&self, cluster: &str, request: &CreateAddonRequest) -> Result<Addon, EksError>;
    async fn update_addon(&self, cluster: &str, addon: &str, request: &UpdateAddonRequest) -> Result<Update, EksError>;
    async fn delete_addon(&self, cluster: &str, addon: &str) -> Result<Addon, EksError>;

    // Access entry operations
    async fn list_access_entries(&self, cluster: &str) -> Result<Vec<String>, EksError>;
    async fn describe_access_entry(&self, cluster: &str, principal_arn: &str) -> Result<AccessEntry, EksError>;
    async fn create_access_entry(&self, cluster: &str, request: &CreateAccessEntryRequest) -> Result<AccessEntry, EksError>;
    async fn update_access_entry(&self, cluster: &str, principal_arn: &str, request: &UpdateAccessEntryRequest) -> Result<AccessEntry, EksError>;
    async fn delete_access_entry(&self, cluster: &str, principal_arn: &str) -> Result<(), EksError>;
    async fn list_associated_access_policies(&self, cluster: &str, principal_arn: &str) -> Result<Vec<AssociatedAccessPolicy>, EksError>;
    async fn associate_access_policy(&self, cluster: &str, principal_arn: &str, policy: &AssociatedAccessPolicy) -> Result<(), EksError>;
    async fn disassociate_access_policy(&self, cluster: &str, principal_arn: &str, policy_arn: &str) -> Result<(), EksError>;

    // Node group operations
    async fn list_nodegroups(&self, cluster: &str) -> Result<Vec<String>, EksError>;
    async fn describe_nodegroup(&self, cluster: &str, nodegroup: &str) -> Result<Nodegroup, EksError>;
    async fn delete_nodegroup(&self, cluster: &str, nodegroup: &str) -> Result<Nodegroup, EksError>;

    // IAM
    async fn describe_role(&self, role_name: &str) -> Result<Role, EksError>;

    // ELB / EC2
    async fn describe_load_balancers(&self) -> Result<Vec<LoadBalancer>, EksError>;
    async fn delete_load_balancer(&self, target: &LoadBalancerRef) -> Result<(), EksError>;
    async fn delete_target_group(&self, arn: &str) -> Result<(), EksError>;
    async fn delete_security_group(&self, group_id: &str) -> Result<(), EksError>;

    // Resource Groups Tagging
    async fn get_resources_by_tag(&self, filters: &[TagFilter]) -> Result<Vec<TaggedResource>, EksError>;
}
