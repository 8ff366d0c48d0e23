//! Test utilities for unit testing reconcilers
//!
//! Fixtures for control planes and remote clusters, plus in-memory stand-ins
//! for the object store and the workload cluster.

use crate::config::GcStrategy;
use crate::error::ControllerError;
use crate::health::Metrics;
use crate::reconciler::cluster::DEFAULT_CONTROL_PLANE_ROLE;
use crate::reconciler::store::{ControlPlaneStore, status_conflict};
use crate::reconciler::{Reconciler, ReconcilerSettings};
use crate::workload::{AuthConfig, WorkloadClientFactory, WorkloadClusterClient};
use async_trait::async_trait;
use crds::tags::cluster_tag_key;
use crds::*;
use eks_client::{
    AccessConfigResponse, Cluster, ClusterStatus, Identity, KubernetesNetworkConfig, MockEksClient, Oidc, TagMap,
    VpcConfigResponse,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Helper to create a test EKSControlPlane that passes admission
pub fn create_test_control_plane(name: &str, namespace: &str) -> EksControlPlane {
    EksControlPlane {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{namespace}-{name}")),
            generation: Some(1),
            ..Default::default()
        },
        spec: EksControlPlaneSpec {
            eks_cluster_name: Some(format!("{namespace}_{name}")),
            region: "us-west-2".to_string(),
            version: Some("v1.29".to_string()),
            network: NetworkSpec {
                subnets: vec![
                    SubnetSpec {
                        id: Some("subnet-0a".to_string()),
                        availability_zone: Some("us-west-2a".to_string()),
                        is_public: false,
                    },
                    SubnetSpec {
                        id: Some("subnet-0b".to_string()),
                        availability_zone: Some("us-west-2b".to_string()),
                        is_public: false,
                    },
                ],
                ..Default::default()
            },
            ..Default::default()
        },
        status: None,
    }
}

/// Mark `cp` for deletion, keeping the control plane finalizer.
pub fn deleting(mut cp: EksControlPlane) -> EksControlPlane {
    let meta: ObjectMeta =
        serde_json::from_value(serde_json::json!({ "deletionTimestamp": "2026-01-01T00:00:00Z" })).unwrap();
    cp.metadata.deletion_timestamp = meta.deletion_timestamp;
    if !cp.has_finalizer() {
        cp.finalizers_mut().push(CONTROL_PLANE_FINALIZER.to_string());
    }
    cp
}

/// Helper to create an ACTIVE, owned remote cluster
pub fn create_test_cluster(name: &str) -> Cluster {
    Cluster {
        name: name.to_string(),
        arn: Some(format!("arn:aws:eks:us-west-2:123456789012:cluster/{name}")),
        created_at: None,
        version: Some("1.29".to_string()),
        endpoint: Some("https://ABC123.gr7.us-west-2.eks.amazonaws.com".to_string()),
        role_arn: Some(format!("arn:aws:iam::123456789012:role/{DEFAULT_CONTROL_PLANE_ROLE}")),
        resources_vpc_config: Some(VpcConfigResponse {
            subnet_ids: vec!["subnet-0a".to_string(), "subnet-0b".to_string()],
            security_group_ids: Vec::new(),
            cluster_security_group_id: Some("sg-cluster0abc".to_string()),
            vpc_id: Some("vpc-0abc".to_string()),
            endpoint_public_access: true,
            endpoint_private_access: false,
            public_access_cidrs: vec![DEFAULT_PUBLIC_CIDR.to_string()],
        }),
        kubernetes_network_config: Some(KubernetesNetworkConfig {
            ip_family: Some("ipv4".to_string()),
            service_ipv4_cidr: Some("10.100.0.0/16".to_string()),
        }),
        logging: None,
        identity: Some(Identity {
            oidc: Some(Oidc {
                issuer: Some("https://oidc.eks.us-west-2.amazonaws.com/id/ABC123".to_string()),
            }),
        }),
        status: ClusterStatus::Active,
        encryption_config: Vec::new(),
        access_config: Some(AccessConfigResponse {
            authentication_mode: Some("CONFIG_MAP".to_string()),
            bootstrap_cluster_creator_admin_permissions: Some(true),
        }),
        tags: TagMap::from([(cluster_tag_key(name), "owned".to_string())]),
    }
}

/// Declared add-on with defaults
pub fn test_addon(name: &str, version: &str) -> Addon {
    Addon {
        name: name.to_string(),
        version: version.to_string(),
        configuration: None,
        conflict_resolution: None,
        service_account_role_arn: None,
    }
}

/// STANDARD access entry with cluster-scoped policies
pub fn test_access_entry(principal_arn: &str, policy_arns: &[&str]) -> AccessEntry {
    AccessEntry {
        principal_arn: principal_arn.to_string(),
        type_: "STANDARD".to_string(),
        username: None,
        kubernetes_groups: Vec::new(),
        access_policies: policy_arns
            .iter()
            .map(|arn| AccessPolicyReference {
                policy_arn: arn.to_string(),
                access_scope: AccessScope {
                    type_: AccessScopeType::Cluster,
                    namespaces: Vec::new(),
                },
            })
            .collect(),
    }
}

/// Object store kept in memory. Objects vanish once deleting without finalizers.
#[derive(Default)]
pub struct InMemoryStore {
    objects: Mutex<HashMap<String, EksControlPlane>>,
    status_writes: AtomicUsize,
    status_conflicts: AtomicUsize,
}

impl InMemoryStore {
    /// Store `cp` and return it.
    pub fn insert(&self, cp: EksControlPlane) -> EksControlPlane {
        self.objects.lock().unwrap().insert(cp.key(), cp.clone());
        cp
    }

    pub fn object(&self, namespace: &str, name: &str) -> Option<EksControlPlane> {
        self.objects.lock().unwrap().get(&format!("{namespace}/{name}")).cloned()
    }

    /// Number of status patches so far
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }

    /// Reject the next `count` status patches as if the object had changed underneath
    pub fn conflict_next_status_writes(&self, count: usize) {
        self.status_conflicts.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl ControlPlaneStore for InMemoryStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<EksControlPlane>, ControllerError> {
        Ok(self.object(namespace, name))
    }

    async fn patch_status(&self, cp: &EksControlPlane, status: &EksControlPlaneStatus) -> Result<(), ControllerError> {
        let conflict = self
            .status_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflict {
            return Err(status_conflict(cp));
        }
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get_mut(&cp.key())
            .ok_or_else(|| ControllerError::Store(format!("{} not found", cp.key())))?;
        stored.status = Some(status.clone());
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn add_finalizer(&self, cp: &EksControlPlane) -> Result<EksControlPlane, ControllerError> {
        let mut objects = self.objects.lock().unwrap();
        let stored = objects.entry(cp.key()).or_insert_with(|| cp.clone());
        if !stored.has_finalizer() {
            stored.finalizers_mut().push(CONTROL_PLANE_FINALIZER.to_string());
        }
        Ok(stored.clone())
    }

    async fn remove_finalizer(&self, cp: &EksControlPlane) -> Result<(), ControllerError> {
        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get_mut(&cp.key()) else {
            return Ok(());
        };
        stored.finalizers_mut().retain(|f| f != CONTROL_PLANE_FINALIZER);
        if stored.is_deleting() && stored.finalizers().is_empty() {
            objects.remove(&cp.key());
        }
        Ok(())
    }
}

/// Workload cluster with scripted answers
pub struct FakeWorkloadClient {
    hostnames: Mutex<Vec<String>>,
    ready: AtomicBool,
    applied: Mutex<Vec<AuthConfig>>,
}

impl Default for FakeWorkloadClient {
    fn default() -> Self {
        Self {
            hostnames: Mutex::new(Vec::new()),
            ready: AtomicBool::new(true),
            applied: Mutex::new(Vec::new()),
        }
    }
}

impl FakeWorkloadClient {
    /// Hostnames reported by LoadBalancer Services
    pub fn set_hostnames(&self, hostnames: Vec<String>) {
        *self.hostnames.lock().unwrap() = hostnames;
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Every aws-auth mapping applied so far
    pub fn applied(&self) -> Vec<AuthConfig> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkloadClusterClient for FakeWorkloadClient {
    async fn list_load_balancer_services(&self) -> Result<Vec<String>, ControllerError> {
        Ok(self.hostnames.lock().unwrap().clone())
    }

    async fn apply_auth_config(&self, config: &AuthConfig) -> Result<(), ControllerError> {
        self.applied.lock().unwrap().push(config.clone());
        Ok(())
    }

    async fn api_server_ready(&self) -> Result<bool, ControllerError> {
        Ok(self.ready.load(Ordering::SeqCst))
    }
}

/// Hands out the one fake client while available
pub struct FakeWorkloadFactory {
    client: Arc<FakeWorkloadClient>,
    available: AtomicBool,
}

impl Default for FakeWorkloadFactory {
    fn default() -> Self {
        Self {
            client: Arc::new(FakeWorkloadClient::default()),
            available: AtomicBool::new(true),
        }
    }
}

impl FakeWorkloadFactory {
    pub fn client(&self) -> Arc<FakeWorkloadClient> {
        self.client.clone()
    }

    /// Simulate a missing kubeconfig Secret
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkloadClientFactory for FakeWorkloadFactory {
    async fn connect(&self, _cp: &EksControlPlane) -> Result<Option<Arc<dyn WorkloadClusterClient>>, ControllerError> {
        if !self.available.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(Some(self.client.clone() as Arc<dyn WorkloadClusterClient>))
    }
}

/// Reconciler wired to the mock gateway and in-memory fakes
pub struct TestHarness {
    pub eks: Arc<MockEksClient>,
    pub store: Arc<InMemoryStore>,
    pub workload: Arc<FakeWorkloadFactory>,
    pub reconciler: Reconciler,
}

impl TestHarness {
    /// Empty account holding only the default control plane role
    pub fn new() -> Self {
        Self::with_settings(ReconcilerSettings::default())
    }

    /// Account that already has an owned, active cluster `name`
    pub fn with_cluster(name: &str) -> Self {
        let harness = Self::new();
        harness.eks.add_cluster(create_test_cluster(name));
        harness
    }

    /// Like `with_cluster`, with a different GC strategy
    pub fn with_strategy(name: &str, gc_strategy: GcStrategy) -> Self {
        let harness = Self::with_settings(ReconcilerSettings {
            gc_strategy,
            ..Default::default()
        });
        harness.eks.add_cluster(create_test_cluster(name));
        harness
    }

    fn with_settings(settings: ReconcilerSettings) -> Self {
        let eks = Arc::new(MockEksClient::new("http://localhost:8080"));
        eks.add_role(DEFAULT_CONTROL_PLANE_ROLE);
        let store = Arc::new(InMemoryStore::default());
        let workload = Arc::new(FakeWorkloadFactory::default());
        let metrics = Arc::new(Metrics::new(&prometheus::Registry::new()).unwrap());
        let reconciler = Reconciler::new(eks.clone(), store.clone(), workload.clone(), settings, metrics);
        Self {
            eks,
            store,
            workload,
            reconciler,
        }
    }
}
