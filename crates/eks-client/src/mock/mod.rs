//! Mock EksClient for unit testing
//!
//! This module provides an in-memory implementation of `EksClientTrait` so
//! reconcilers and the garbage collector can be tested without AWS.
//!
//! The mock is organized by API family:
//! - `eks.rs` - clusters, add-ons, access entries and node groups
//! - `elb.rs` - load balancers, target groups and security groups
//! - `tagging.rs` - tag-filtered resource enumeration
//!
//! Besides the stored state it supports fault injection: `fail_next` queues an
//! error for the next call of an operation and `set_in_use` makes deletes of a
//! resource fail with `ResourceInUse` a fixed number of times.

mod eks;
mod elb;
mod tagging;

use crate::error::EksError;
use crate::eks_trait::EksClientTrait;
use crate::models::*;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Account id used in synthesized ARNs.
pub const MOCK_ACCOUNT: &str = "123456789012";

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stored load balancer with its tags
#[derive(Debug, Clone)]
pub(crate) struct MockLoadBalancer {
    pub(crate) lb: LoadBalancer,
    pub(crate) arn: String,
    pub(crate) tags: TagMap,
}

/// Mock EksClient for testing
#[derive(Clone, Debug)]
pub struct MockEksClient {
    pub(crate) endpoint: String,
    pub(crate) region: String,
    pub(crate) clusters: Arc<Mutex<HashMap<String, Cluster>>>,
    pub(crate) addons: Arc<Mutex<HashMap<(String, String), Addon>>>,
    pub(crate) access_entries: Arc<Mutex<HashMap<(String, String), AccessEntry>>>,
    pub(crate) access_policies: Arc<Mutex<HashMap<(String, String), Vec<AssociatedAccessPolicy>>>>,
    pub(crate) nodegroups: Arc<Mutex<HashMap<(String, String), Nodegroup>>>,
    pub(crate) roles: Arc<Mutex<HashMap<String, Role>>>,
    pub(crate) load_balancers: Arc<Mutex<HashMap<String, MockLoadBalancer>>>,
    pub(crate) target_groups: Arc<Mutex<HashMap<String, TagMap>>>,
    pub(crate) security_groups: Arc<Mutex<HashMap<String, TagMap>>>,
    pub(crate) in_use: Arc<Mutex<HashMap<String, u32>>>,
    pub(crate) failures: Arc<Mutex<HashMap<String, VecDeque<EksError>>>>,
    pub(crate) calls: Arc<Mutex<Vec<String>>>,
    pub(crate) next_id: Arc<Mutex<u64>>,
}

impl MockEksClient {
    /// Create a new mock client
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: "us-west-2".to_string(),
            clusters: Arc::new(Mutex::new(HashMap::new())),
            addons: Arc::new(Mutex::new(HashMap::new())),
            access_entries: Arc::new(Mutex::new(HashMap::new())),
            access_policies: Arc::new(Mutex::new(HashMap::new())),
            nodegroups: Arc::new(Mutex::new(HashMap::new())),
            roles: Arc::new(Mutex::new(HashMap::new())),
            load_balancers: Arc::new(Mutex::new(HashMap::new())),
            target_groups: Arc::new(Mutex::new(HashMap::new())),
            security_groups: Arc::new(Mutex::new(HashMap::new())),
            in_use: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(1)),
        }
    }

    /// Region used in synthesized ARNs
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Add a cluster to the mock store (for test setup)
    pub fn add_cluster(&self, cluster: Cluster) {
        lock(&self.clusters).insert(cluster.name.clone(), cluster);
    }

    /// Current state of a cluster
    pub fn cluster(&self, name: &str) -> Option<Cluster> {
        lock(&self.clusters).get(name).cloned()
    }

    /// Force a cluster status, e.g. to finish a create or update
    pub fn set_cluster_status(&self, name: &str, status: ClusterStatus) {
        if let Some(c) = lock(&self.clusters).get_mut(name) {
            c.status = status;
        }
    }

    /// Add an IAM role, returning its ARN (for test setup)
    pub fn add_role(&self, role_name: &str) -> String {
        let arn = format!("arn:aws:iam::{MOCK_ACCOUNT}:role/{role_name}");
        lock(&self.roles).insert(
            role_name.to_string(),
            Role {
                role_name: role_name.to_string(),
                arn: arn.clone(),
            },
        );
        arn
    }

    /// Add an add-on to the mock store (for test setup)
    pub fn add_addon(&self, cluster: &str, addon: Addon) {
        lock(&self.addons).insert((cluster.to_string(), addon.addon_name.clone()), addon);
    }

    /// Current state of an add-on
    pub fn addon(&self, cluster: &str, name: &str) -> Option<Addon> {
        lock(&self.addons).get(&(cluster.to_string(), name.to_string())).cloned()
    }

    /// Add an access entry to the mock store (for test setup)
    pub fn add_access_entry(&self, cluster: &str, entry: AccessEntry) {
        lock(&self.access_entries).insert((cluster.to_string(), entry.principal_arn.clone()), entry);
    }

    /// Current state of an access entry
    pub fn access_entry(&self, cluster: &str, principal_arn: &str) -> Option<AccessEntry> {
        lock(&self.access_entries)
            .get(&(cluster.to_string(), principal_arn.to_string()))
            .cloned()
    }

    /// Policies associated with an access entry
    pub fn access_policies(&self, cluster: &str, principal_arn: &str) -> Vec<AssociatedAccessPolicy> {
        lock(&self.access_policies)
            .get(&(cluster.to_string(), principal_arn.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Add a node group (for test setup)
    pub fn add_nodegroup(&self, cluster: &str, name: &str, tags: TagMap) {
        let nodegroup = Nodegroup {
            nodegroup_name: name.to_string(),
            nodegroup_arn: Some(format!(
                "arn:aws:eks:{}:{MOCK_ACCOUNT}:nodegroup/{cluster}/{name}/{}",
                self.region,
                self.next_id()
            )),
            cluster_name: Some(cluster.to_string()),
            status: Some("ACTIVE".to_string()),
            tags,
        };
        lock(&self.nodegroups).insert((cluster.to_string(), name.to_string()), nodegroup);
    }

    /// Node groups remaining for a cluster
    pub fn nodegroup_names(&self, cluster: &str) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.nodegroups)
            .keys()
            .filter(|(c, _)| c == cluster)
            .map(|(_, n)| n.clone())
            .collect();
        names.sort();
        names
    }

    /// Add a load balancer, returning its ARN (for test setup)
    ///
    /// Classic load balancers get a synthesized ARN so they show up in the
    /// tagging API like they do in AWS.
    pub fn add_load_balancer(&self, name: &str, kind: LoadBalancerKind, tags: TagMap) -> String {
        let id = self.next_id();
        let arn = match kind {
            LoadBalancerKind::V2 => format!(
                "arn:aws:elasticloadbalancing:{}:{MOCK_ACCOUNT}:loadbalancer/net/{name}/{id:016x}",
                self.region
            ),
            LoadBalancerKind::Classic => format!(
                "arn:aws:elasticloadbalancing:{}:{MOCK_ACCOUNT}:loadbalancer/{name}",
                self.region
            ),
        };
        let lb = LoadBalancer {
            load_balancer_name: name.to_string(),
            load_balancer_arn: (kind == LoadBalancerKind::V2).then(|| arn.clone()),
            dns_name: Some(format!("{name}-{id}.elb.{}.amazonaws.com", self.region)),
            kind,
        };
        lock(&self.load_balancers).insert(arn.clone(), MockLoadBalancer { lb, arn: arn.clone(), tags });
        arn
    }

    /// Add a target group, returning its ARN (for test setup)
    pub fn add_target_group(&self, name: &str, tags: TagMap) -> String {
        let arn = format!(
            "arn:aws:elasticloadbalancing:{}:{MOCK_ACCOUNT}:targetgroup/{name}/{:016x}",
            self.region,
            self.next_id()
        );
        lock(&self.target_groups).insert(arn.clone(), tags);
        arn
    }

    /// Add a security group, returning its ARN (for test setup)
    pub fn add_security_group(&self, group_id: &str, tags: TagMap) -> String {
        lock(&self.security_groups).insert(group_id.to_string(), tags);
        self.security_group_arn(group_id)
    }

    pub(crate) fn security_group_arn(&self, group_id: &str) -> String {
        format!("arn:aws:ec2:{}:{MOCK_ACCOUNT}:security-group/{group_id}", self.region)
    }

    /// Load balancers still present
    pub fn load_balancer_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.load_balancers)
            .values()
            .map(|l| l.lb.load_balancer_name.clone())
            .collect();
        names.sort();
        names
    }

    /// Whether a target group is still present
    pub fn has_target_group(&self, arn: &str) -> bool {
        lock(&self.target_groups).contains_key(arn)
    }

    /// Whether a security group is still present
    pub fn has_security_group(&self, group_id: &str) -> bool {
        lock(&self.security_groups).contains_key(group_id)
    }

    /// Make the next `times` deletes of `id` (ARN, name or group id) fail with `ResourceInUse`
    pub fn set_in_use(&self, id: &str, times: u32) {
        lock(&self.in_use).insert(id.to_string(), times);
    }

    /// Queue an error for the next call of `operation` (a trait method name)
    pub fn fail_next(&self, operation: &str, error: EksError) {
        lock(&self.failures)
            .entry(operation.to_string())
            .or_default()
            .push_back(error);
    }

    /// Every operation invoked so far, as `operation` or `operation:target`
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Number of calls to `operation`
    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.as_str() == operation || c.starts_with(&format!("{operation}:")))
            .count()
    }

    /// Record a call and pop any injected failure for it
    pub(crate) fn record(&self, operation: &str, target: &str) -> Result<(), EksError> {
        lock(&self.calls).push(if target.is_empty() {
            operation.to_string()
        } else {
            format!("{operation}:{target}")
        });
        match lock(&self.failures).get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Consume one injected in-use failure for `id`
    pub(crate) fn check_in_use(&self, id: &str) -> Result<(), EksError> {
        let mut in_use = lock(&self.in_use);
        match in_use.get_mut(id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(EksError::ResourceInUse(format!("resource {id} has a dependent object")))
            }
            _ => Ok(()),
        }
    }

    /// Generate next ID
    pub(crate) fn next_id(&self) -> u64 {
        let mut id = lock(&self.next_id);
        let current = *id;
        *id += 1;
        current
    }
}

#[async_trait::async_trait]
impl EksClientTrait for MockEksClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn validate_connectivity(&self) -> Result<(), EksError> {
        self.record("validate_connectivity", "")
    }

    // Cluster operations - delegated to eks module
    async fn describe_cluster(&self, name: &str) -> Result<Cluster, EksError> {
        eks::describe_cluster(self, name)
    }

    async fn create_cluster(&self, request: &CreateClusterRequest) -> Result<Cluster, EksError> {
        eks::create_cluster(self, request)
    }

    async fn update_cluster_version(&self, name: &str, version: &str, _client_request_token: Option<&str>) -> Result<Update, EksError> {
        eks::update_cluster_version(self, name, version)
    }

    async fn update_cluster_config(&self, name: &str, request: &UpdateClusterConfigRequest) -> Result<Update, EksError> {
        eks::update_cluster_config(self, name, request)
    }

    async fn delete_cluster(&self, name: &str) -> Result<Cluster, EksError> {
        eks::delete_cluster(self, name)
    }

    async fn tag_resource(&self, resource_arn: &str, tags: &TagMap) -> Result<(), EksError> {
        eks::tag_resource(self, resource_arn, tags)
    }

    async fn list_addons(&self, cluster: &str) -> Result<Vec<String>, EksError> {
        eks::list_addons(self, cluster)
    }

    async fn describe_addon(&self, cluster: &str, addon: &str) -> Result<Addon, EksError> {
        eks::describe_addon(self, cluster, addon)
    }

    async fn create_addon(&self, cluster: &str, request: &CreateAddonRequest) -> Result<Addon, EksError> {
        eks::create_addon(self, cluster, request)
    }

    async fn update_addon(&self, cluster: &str, addon: &str, request: &UpdateAddonRequest) -> Result<Update, EksError> {
        eks::update_addon(self, cluster, addon, request)
    }

    async fn delete_addon(&self, cluster: &str, addon: &str) -> Result<Addon, EksError> {
        eks::delete_addon(self, cluster, addon)
    }

    async fn list_access_entries(&self, cluster: &str) -> Result<Vec<String>, EksError> {
        eks::list_access_entries(self, cluster)
    }

    async fn describe_access_entry(&self, cluster: &str, principal_arn: &str) -> Result<AccessEntry, EksError> {
        eks::describe_access_entry(self, cluster, principal_arn)
    }

    async fn create_access_entry(&self, cluster: &str, request: &CreateAccessEntryRequest) -> Result<AccessEntry, EksError> {
        eks::create_access_entry(self, cluster, request)
    }

    async fn update_access_entry(&self, cluster: &str, principal_arn: &str, request: &UpdateAccessEntryRequest) -> Result<AccessEntry, EksError> {
        eks::update_access_entry(self, cluster, principal_arn, request)
    }

    async fn delete_access_entry(&self, cluster: &str, principal_arn: &str) -> Result<(), EksError> {
        eks::delete_access_entry(self, cluster, principal_arn)
    }

    async fn list_associated_access_policies(&self, cluster: &str, principal_arn: &str) -> Result<Vec<AssociatedAccessPolicy>, EksError> {
        eks::list_associated_access_policies(self, cluster, principal_arn)
    }

    async fn associate_access_policy(&self, cluster: &str, principal_arn: &str, policy: &AssociatedAccessPolicy) -> Result<(), EksError> {
        eks::associate_access_policy(self, cluster, principal_arn, policy)
    }

    async fn disassociate_access_policy(&self, cluster: &str, principal_arn: &str, policy_arn: &str) -> Result<(), EksError> {
        eks::disassociate_access_policy(self, cluster, principal_arn, policy_arn)
    }

    async fn list_nodegroups(&self, cluster: &str) -> Result<Vec<String>, EksError> {
        eks::list_nodegroups(self, cluster)
    }

    async fn describe_nodegroup(&self, cluster: &str, nodegroup: &str) -> Result<Nodegroup, EksError> {
        eks::describe_nodegroup(self, cluster, nodegroup)
    }

    async fn delete_nodegroup(&self, cluster: &str, nodegroup: &str) -> Result<Nodegroup, EksError> {
        eks::delete_nodegroup(self, cluster, nodegroup)
    }

    async fn describe_role(&self, role_name: &str) -> Result<Role, EksError> {
        self.record("describe_role", role_name)?;
        lock(&self.roles)
            .get(role_name)
            .cloned()
            .ok_or_else(|| EksError::NotFound(format!("The role with name {role_name} cannot be found.")))
    }

    // ELB / EC2 - delegated to elb module
    async fn describe_load_balancers(&self) -> Result<Vec<LoadBalancer>, EksError> {
        elb::describe_load_balancers(self)
    }

    async fn delete_load_balancer(&self, target: &LoadBalancerRef) -> Result<(), EksError> {
        elb::delete_load_balancer(self, target)
    }

    async fn delete_target_group(&self, arn: &str) -> Result<(), EksError> {
        elb::delete_target_group(self, arn)
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<(), EksError> {
        elb::delete_security_group(self, group_id)
    }

    async fn get_resources_by_tag(&self, filters: &[TagFilter]) -> Result<Vec<TaggedResource>, EksError> {
        tagging::get_resources_by_tag(self, filters)
    }
}
