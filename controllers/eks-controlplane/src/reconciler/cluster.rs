//! Remote cluster lifecycle: create, adopt, upgrade and in-place updates.
//!
//! Each pass re-reads the cluster and issues at most one cluster-level update,
//! since EKS rejects a second update while one is in flight. Tags, add-ons and
//! access entries are independent of each other and are all attempted.

use super::state_machine::{Event, advance};
use super::status::{clear_updating, mark_in_progress, observe_cluster, status_mut};
use super::{REQUEUE_IN_PROGRESS, Reconciler};
use crate::admission::cidr::is_valid_ipv4_cidr;
use crate::error::ControllerError;
use crate::version::{api_version, next_upgrade_step, parse_lenient};
use crate::workload::AuthConfig;
use crds::conditions::{self, READY_CONDITION};
use crds::eks_control_plane::condition_types::{
    EKS_CONTROL_PLANE_CREATING, EKS_CONTROL_PLANE_READY, EKS_CONTROL_PLANE_UPDATING,
    EKS_IDENTITY_PROVIDER_CONFIGURED, IAM_AUTHENTICATOR_CONFIGURED,
};
use crds::{AuthenticationMode, BuildParams, ConditionSeverity, EksControlPlane, EksControlPlaneSpec, LOG_TYPES, Tags};
use eks_client::{
    Cluster, ClusterStatus, CreateAccessConfigRequest, CreateClusterRequest, EksError, EncryptionConfig,
    EncryptionProvider, KubernetesNetworkConfig, Logging, UpdateClusterConfigRequest, VpcConfigRequest,
};
use kube_runtime::controller::Action;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Role assumed by the control plane when the spec names none.
pub const DEFAULT_CONTROL_PLANE_ROLE: &str = "eks-controlplane.cluster-api-provider-aws.sigs.k8s.io";

/// Role tag value on the cluster itself.
const CLUSTER_ROLE_TAG_VALUE: &str = "common";

/// Tags the remote cluster should carry.
pub(crate) fn cluster_tags(spec: &EksControlPlaneSpec, cluster_name: &str) -> Tags {
    BuildParams::owned(cluster_name)
        .with_role(CLUSTER_ROLE_TAG_VALUE)
        .with_additional(&spec.additional_tags)
        .build()
}

/// Deterministic token for a call tied to this object's generation.
pub(crate) fn request_token(obj: &EksControlPlane, purpose: &str) -> String {
    let seed = format!(
        "{}/{}/{}",
        obj.key(),
        obj.metadata.generation.unwrap_or_default(),
        purpose
    );
    Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()).to_string()
}

/// Subnet ids, provided they span at least two availability zones.
pub(crate) fn validate_network(spec: &EksControlPlaneSpec) -> Result<Vec<String>, ControllerError> {
    let subnets = spec.network.subnet_ids();
    if subnets.len() < 2 || spec.network.availability_zones().len() < 2 {
        return Err(ControllerError::NonRetryable(
            "subnets in at least 2 different az's are required".to_string(),
        ));
    }
    Ok(subnets)
}

fn validate_public_cidrs(spec: &EksControlPlaneSpec) -> Result<(), ControllerError> {
    for cidr in spec.endpoint_access.public_cidrs.iter().flatten() {
        if !is_valid_ipv4_cidr(cidr) {
            return Err(ControllerError::NonRetryable(format!(
                "{cidr} is not a valid CIDR for public endpoint access"
            )));
        }
    }
    Ok(())
}

fn desired_version(spec: &EksControlPlaneSpec) -> Result<Option<semver::Version>, ControllerError> {
    match spec.version.as_deref() {
        None => Ok(None),
        Some(raw) => parse_lenient(raw)
            .map(Some)
            .ok_or_else(|| ControllerError::NonRetryable(format!("invalid Kubernetes version {raw}"))),
    }
}

fn desired_log_types(spec: &EksControlPlaneSpec) -> Vec<String> {
    spec.log_types().into_iter().map(str::to_string).collect()
}

/// Next minor version to request, when the spec is ahead of the remote.
pub(crate) fn upgrade_step(spec: &EksControlPlaneSpec, cluster: &Cluster) -> Result<Option<String>, ControllerError> {
    let Some(desired) = desired_version(spec)? else {
        return Ok(None);
    };
    let Some(observed) = cluster.version.as_deref().and_then(parse_lenient) else {
        return Ok(None);
    };
    Ok(next_upgrade_step(&observed, &desired))
}

/// Endpoint access change, if any.
///
/// Public CIDRs are compared as sets and only matter while the public endpoint
/// is enabled.
pub(crate) fn endpoint_access_update(spec: &EksControlPlaneSpec, cluster: &Cluster) -> Option<VpcConfigRequest> {
    let current = cluster.resources_vpc_config.as_ref()?;
    let access = &spec.endpoint_access;
    let public = access.public_enabled();
    let private = access.private_enabled();
    let desired_cidrs = access.public_cidr_set();

    let mut current_cidrs = current.public_access_cidrs.clone();
    if current_cidrs.is_empty() {
        current_cidrs.push(crds::DEFAULT_PUBLIC_CIDR.to_string());
    }
    current_cidrs.sort();
    current_cidrs.dedup();

    let cidrs_changed = public && current_cidrs != desired_cidrs;
    if current.endpoint_public_access == public && current.endpoint_private_access == private && !cidrs_changed {
        return None;
    }
    Some(VpcConfigRequest {
        endpoint_public_access: Some(public),
        endpoint_private_access: Some(private),
        public_access_cidrs: public.then_some(desired_cidrs),
        ..Default::default()
    })
}

/// Logging change, if the enabled log types differ.
pub(crate) fn logging_update(spec: &EksControlPlaneSpec, cluster: &Cluster) -> Option<Logging> {
    let mut desired = desired_log_types(spec);
    desired.sort();
    if desired == cluster.enabled_log_types() {
        return None;
    }
    Some(Logging::from_enabled(&desired, &LOG_TYPES))
}

/// Authentication mode change, if the spec is ahead of the remote.
pub(crate) fn auth_mode_update(
    spec: &EksControlPlaneSpec,
    cluster: &Cluster,
) -> Result<Option<CreateAccessConfigRequest>, ControllerError> {
    if spec.access_config.is_none() {
        return Ok(None);
    }
    let desired = spec.authentication_mode();
    let current = remote_auth_mode(cluster);
    if desired == current {
        return Ok(None);
    }
    if !current.can_transition_to(desired) {
        return Err(ControllerError::NonRetryable(format!(
            "authentication mode cannot be changed from {} to {}",
            current.as_api_str(),
            desired.as_api_str()
        )));
    }
    Ok(Some(CreateAccessConfigRequest {
        authentication_mode: Some(desired.as_api_str().to_string()),
        bootstrap_cluster_creator_admin_permissions: None,
    }))
}

/// Authentication mode EKS reports; CONFIG_MAP when absent.
pub(crate) fn remote_auth_mode(cluster: &Cluster) -> AuthenticationMode {
    cluster
        .access_config
        .as_ref()
        .and_then(|a| a.authentication_mode.as_deref())
        .and_then(AuthenticationMode::from_api_str)
        .unwrap_or_default()
}

/// The first pending cluster configuration update: endpoint, then logging, then auth.
pub(crate) fn cluster_config_update(
    spec: &EksControlPlaneSpec,
    cluster: &Cluster,
) -> Result<Option<(&'static str, UpdateClusterConfigRequest)>, ControllerError> {
    if let Some(vpc) = endpoint_access_update(spec, cluster) {
        return Ok(Some((
            "endpoint access",
            UpdateClusterConfigRequest { resources_vpc_config: Some(vpc), ..Default::default() },
        )));
    }
    if let Some(logging) = logging_update(spec, cluster) {
        return Ok(Some((
            "logging",
            UpdateClusterConfigRequest { logging: Some(logging), ..Default::default() },
        )));
    }
    if let Some(access) = auth_mode_update(spec, cluster)? {
        return Ok(Some((
            "authentication mode",
            UpdateClusterConfigRequest { access_config: Some(access), ..Default::default() },
        )));
    }
    Ok(None)
}

/// The most severe of several aspect failures.
pub(super) fn most_severe(mut failures: Vec<ControllerError>) -> Option<ControllerError> {
    match failures.iter().position(ControllerError::is_non_retryable) {
        Some(i) => Some(failures.swap_remove(i)),
        None => failures.into_iter().next(),
    }
}

impl Reconciler {
    /// Converge the remote cluster onto the spec.
    pub(crate) async fn reconcile_control_plane(&self, obj: &mut EksControlPlane) -> Result<Action, ControllerError> {
        let name = obj
            .cluster_name()
            .map(str::to_string)
            .ok_or_else(|| ControllerError::NonRetryable("spec.eksClusterName is not set".to_string()))?;

        let cluster = match self.eks.describe_cluster(&name).await {
            Ok(cluster) => cluster,
            Err(e) if e.is_not_found() => {
                advance(&mut status_mut(obj).phase, Event::ClusterNotFound);
                self.create_cluster(obj, &name).await?;
                advance(&mut status_mut(obj).phase, Event::CreateIssued);
                mark_in_progress(obj, EKS_CONTROL_PLANE_CREATING, "Creating", format!("creating EKS cluster {name}"));
                return Ok(Action::requeue(REQUEUE_IN_PROGRESS));
            }
            Err(e) => return Err(e.into()),
        };

        if !Tags::from(cluster.tags.clone()).has_owned(&name) {
            return Err(ControllerError::NotOwned(name));
        }
        observe_cluster(obj, &cluster);

        match cluster.status {
            ClusterStatus::Active => self.reconcile_active(obj, &name, &cluster).await,
            ClusterStatus::Creating | ClusterStatus::Pending => {
                debug!("EKS cluster {} is {}", name, cluster.status);
                advance(&mut status_mut(obj).phase, Event::CreateIssued);
                mark_in_progress(obj, EKS_CONTROL_PLANE_CREATING, "Creating", format!("EKS cluster {name} is {}", cluster.status));
                Ok(Action::requeue(REQUEUE_IN_PROGRESS))
            }
            ClusterStatus::Updating => {
                debug!("EKS cluster {} is updating", name);
                advance(&mut status_mut(obj).phase, Event::RemoteUpdating);
                mark_in_progress(obj, EKS_CONTROL_PLANE_UPDATING, "Updating", format!("EKS cluster {name} is updating"));
                Ok(Action::requeue(REQUEUE_IN_PROGRESS))
            }
            ClusterStatus::Failed => Err(ControllerError::NonRetryable(
                "EKS cluster in unexpected FAILED state".to_string(),
            )),
            ClusterStatus::Deleting | ClusterStatus::Unknown => {
                warn!("EKS cluster {} is {}, waiting", name, cluster.status);
                Ok(Action::requeue(REQUEUE_IN_PROGRESS))
            }
        }
    }

    async fn build_create_request(&self, obj: &EksControlPlane, name: &str) -> Result<CreateClusterRequest, ControllerError> {
        let spec = &obj.spec;
        let subnet_ids = validate_network(spec)?;
        validate_public_cidrs(spec)?;

        let role_name = spec.role_name.as_deref().unwrap_or(DEFAULT_CONTROL_PLANE_ROLE);
        let role = self.eks.describe_role(role_name).await?;

        let public = spec.endpoint_access.public_enabled();
        let encryption_config = spec
            .encryption_config
            .as_ref()
            .and_then(|e| {
                e.provider().map(|key_arn| EncryptionConfig {
                    resources: e.resources.clone(),
                    provider: Some(EncryptionProvider { key_arn: key_arn.to_string() }),
                })
            })
            .into_iter()
            .collect();

        Ok(CreateClusterRequest {
            name: name.to_string(),
            version: desired_version(spec)?.as_ref().map(api_version),
            role_arn: role.arn,
            resources_vpc_config: VpcConfigRequest {
                subnet_ids,
                security_group_ids: spec.network.security_group_ids.clone(),
                endpoint_public_access: Some(public),
                endpoint_private_access: Some(spec.endpoint_access.private_enabled()),
                public_access_cidrs: public.then(|| spec.endpoint_access.public_cidr_set()),
            },
            kubernetes_network_config: obj.ipv6_enabled().then(|| KubernetesNetworkConfig {
                ip_family: Some("ipv6".to_string()),
                service_ipv4_cidr: None,
            }),
            logging: Some(Logging::from_enabled(&desired_log_types(spec), &LOG_TYPES)),
            encryption_config,
            access_config: spec.access_config.as_ref().map(|a| CreateAccessConfigRequest {
                authentication_mode: Some(a.authentication_mode.as_api_str().to_string()),
                bootstrap_cluster_creator_admin_permissions: a.bootstrap_cluster_creator_admin_permissions,
            }),
            bootstrap_self_managed_addons: spec.bootstrap_self_managed_addons,
            tags: cluster_tags(spec, name).0,
            client_request_token: Some(request_token(obj, "create")),
        })
    }

    async fn create_cluster(&self, obj: &EksControlPlane, name: &str) -> Result<(), ControllerError> {
        let request = self.build_create_request(obj, name).await?;
        match self.eks.create_cluster(&request).await.map_err(EksError::on_create) {
            Ok(cluster) => {
                info!("Created EKS cluster {} for {} (status {})", name, obj.key(), cluster.status);
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                info!("EKS cluster {} already exists, re-reading", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn reconcile_active(&self, obj: &mut EksControlPlane, name: &str, cluster: &Cluster) -> Result<Action, ControllerError> {
        if conditions::is_true(obj, EKS_CONTROL_PLANE_CREATING) {
            info!("EKS cluster {} is active", name);
            conditions::mark_false(obj, EKS_CONTROL_PLANE_CREATING, "Created", ConditionSeverity::Info, "cluster is active");
        }

        if let Some(step) = upgrade_step(&obj.spec, cluster)? {
            let token = request_token(obj, &format!("version-{step}"));
            return match self.eks.update_cluster_version(name, &step, Some(&token)).await {
                Ok(update) => {
                    info!("Upgrading EKS cluster {} to {} (update {})", name, step, update.id);
                    advance(&mut status_mut(obj).phase, Event::VersionBehind);
                    mark_in_progress(obj, EKS_CONTROL_PLANE_UPDATING, "Upgrading", format!("upgrading to {step}"));
                    Ok(Action::requeue(REQUEUE_IN_PROGRESS))
                }
                Err(e) if e.is_resource_in_use() => {
                    debug!("Update already in flight for {}: {}", name, e);
                    Ok(Action::requeue(REQUEUE_IN_PROGRESS))
                }
                Err(e) => Err(e.into()),
            };
        }

        if let Some((aspect, mut request)) = cluster_config_update(&obj.spec, cluster)? {
            request.client_request_token = Some(request_token(obj, aspect));
            return match self.eks.update_cluster_config(name, &request).await {
                Ok(update) => {
                    info!("Updating {} of EKS cluster {} (update {})", aspect, name, update.id);
                    advance(&mut status_mut(obj).phase, Event::ConfigDrift);
                    mark_in_progress(obj, EKS_CONTROL_PLANE_UPDATING, "Updating", format!("{aspect} update in progress"));
                    Ok(Action::requeue(REQUEUE_IN_PROGRESS))
                }
                Err(e) if e.is_resource_in_use() => {
                    debug!("Update already in flight for {}: {}", name, e);
                    Ok(Action::requeue(REQUEUE_IN_PROGRESS))
                }
                Err(e) => Err(e.into()),
            };
        }
        clear_updating(obj);

        let mut failures = Vec::new();
        if let Err(e) = self.reconcile_tags(obj, name, cluster).await {
            warn!("Failed to reconcile tags of {}: {}", name, e);
            failures.push(e);
        }
        if let Err(e) = self.reconcile_addons(obj, name).await {
            warn!("Failed to reconcile add-ons of {}: {}", name, e);
            failures.push(e);
        }
        if let Err(e) = self.reconcile_access_entries(obj, name, cluster).await {
            warn!("Failed to reconcile access entries of {}: {}", name, e);
            failures.push(e);
        }
        reconcile_identity_provider(obj);
        let api_ready = match self.reconcile_workload(obj).await {
            Ok(ready) => ready,
            Err(e) => {
                warn!("Failed to reach workload cluster {}: {}", name, e);
                failures.push(e);
                false
            }
        };
        if let Some(e) = most_severe(failures) {
            return Err(e);
        }

        advance(&mut status_mut(obj).phase, Event::RemoteActive);
        if api_ready {
            conditions::mark_true(obj, EKS_CONTROL_PLANE_READY);
            conditions::mark_true(obj, READY_CONDITION);
            status_mut(obj).ready = true;
            Ok(Action::requeue(self.settings.resync))
        } else {
            let message = "waiting for the API server to report ready";
            conditions::mark_false(obj, EKS_CONTROL_PLANE_READY, "WaitingForAPIServer", ConditionSeverity::Info, message);
            conditions::mark_false(obj, READY_CONDITION, "WaitingForAPIServer", ConditionSeverity::Info, message);
            status_mut(obj).ready = false;
            Ok(Action::requeue(REQUEUE_IN_PROGRESS))
        }
    }

    async fn reconcile_tags(&self, obj: &EksControlPlane, name: &str, cluster: &Cluster) -> Result<(), ControllerError> {
        let missing = cluster_tags(&obj.spec, name).difference(&Tags::from(cluster.tags.clone()));
        if missing.is_empty() {
            return Ok(());
        }
        let Some(arn) = cluster.arn.as_deref() else {
            debug!("EKS cluster {} has no ARN yet, skipping tags", name);
            return Ok(());
        };
        self.eks.tag_resource(arn, &missing.0).await?;
        info!("Tagged EKS cluster {} with {} tag(s)", name, missing.len());
        Ok(())
    }

    /// Apply the aws-auth mapping and probe the API server.
    ///
    /// Returns whether the API server answered `/readyz`. Until the kubeconfig
    /// Secret exists neither step can run and the cluster is not ready.
    async fn reconcile_workload(&self, obj: &mut EksControlPlane) -> Result<bool, ControllerError> {
        let Some(client) = self.workload.connect(obj).await? else {
            conditions::mark_false(
                obj,
                IAM_AUTHENTICATOR_CONFIGURED,
                "WaitingForKubeconfig",
                ConditionSeverity::Info,
                "kubeconfig secret is not available yet",
            );
            status_mut(obj).initialized = false;
            return Ok(false);
        };

        if obj.spec.authentication_mode() != AuthenticationMode::Api {
            let auth = AuthConfig::from_access_entries(&obj.spec.access_entries);
            if let Err(e) = client.apply_auth_config(&auth).await {
                conditions::mark_false(
                    obj,
                    IAM_AUTHENTICATOR_CONFIGURED,
                    "IAMAuthenticatorConfigurationFailed",
                    ConditionSeverity::Warning,
                    e.to_string(),
                );
                return Err(e);
            }
        }
        conditions::mark_true(obj, IAM_AUTHENTICATOR_CONFIGURED);
        status_mut(obj).initialized = true;

        client.api_server_ready().await
    }
}

fn reconcile_identity_provider(obj: &mut EksControlPlane) {
    if !obj.spec.associate_oidc_provider {
        return;
    }
    let issuer_known = obj
        .status
        .as_ref()
        .and_then(|s| s.oidc_provider.as_ref())
        .is_some_and(|o| o.issuer_url.is_some());
    if issuer_known {
        conditions::mark_true(obj, EKS_IDENTITY_PROVIDER_CONFIGURED);
    } else {
        conditions::mark_false(
            obj,
            EKS_IDENTITY_PROVIDER_CONFIGURED,
            "WaitingForIssuer",
            ConditionSeverity::Info,
            "cluster has no OIDC issuer yet",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_cluster, create_test_control_plane};
    use crds::{AccessConfig, ControlPlaneLoggingSpec, EndpointAccess};

    #[test]
    fn test_endpoint_access_in_sync_with_defaults() {
        let cp = create_test_control_plane("prod", "team-a");
        let cluster = create_test_cluster("team-a_prod");
        assert!(endpoint_access_update(&cp.spec, &cluster).is_none());
    }

    #[test]
    fn test_public_cidrs_compared_as_sets() {
        let mut cp = create_test_control_plane("prod", "team-a");
        let mut cluster = create_test_cluster("team-a_prod");
        if let Some(vpc) = cluster.resources_vpc_config.as_mut() {
            vpc.public_access_cidrs = vec!["10.1.0.0/16".to_string(), "10.0.0.0/16".to_string()];
        }
        cp.spec.endpoint_access.public_cidrs = Some(vec![
            "10.0.0.0/16".to_string(),
            "10.1.0.0/16".to_string(),
            "10.0.0.0/16".to_string(),
        ]);
        assert!(endpoint_access_update(&cp.spec, &cluster).is_none());

        cp.spec.endpoint_access.public_cidrs = Some(vec!["10.0.0.0/16".to_string()]);
        let update = endpoint_access_update(&cp.spec, &cluster).unwrap();
        assert_eq!(update.public_access_cidrs, Some(vec!["10.0.0.0/16".to_string()]));
    }

    #[test]
    fn test_private_only_endpoint() {
        let mut cp = create_test_control_plane("prod", "team-a");
        let cluster = create_test_cluster("team-a_prod");
        cp.spec.endpoint_access = EndpointAccess {
            public: Some(false),
            private: Some(true),
            public_cidrs: None,
        };
        let update = endpoint_access_update(&cp.spec, &cluster).unwrap();
        assert_eq!(update.endpoint_public_access, Some(false));
        assert_eq!(update.endpoint_private_access, Some(true));
        assert_eq!(update.public_access_cidrs, None);
    }

    #[test]
    fn test_logging_diff() {
        let mut cp = create_test_control_plane("prod", "team-a");
        let cluster = create_test_cluster("team-a_prod");
        assert!(logging_update(&cp.spec, &cluster).is_none());

        cp.spec.logging = Some(ControlPlaneLoggingSpec {
            audit: true,
            api_server: true,
            ..Default::default()
        });
        let logging = logging_update(&cp.spec, &cluster).unwrap();
        assert!(logging.cluster_logging[0].enabled);
        assert_eq!(logging.cluster_logging[0].types, vec!["api", "audit"]);
    }

    #[test]
    fn test_config_updates_are_ordered() {
        let mut cp = create_test_control_plane("prod", "team-a");
        let cluster = create_test_cluster("team-a_prod");
        cp.spec.endpoint_access.private = Some(true);
        cp.spec.logging = Some(ControlPlaneLoggingSpec { audit: true, ..Default::default() });
        let (aspect, _) = cluster_config_update(&cp.spec, &cluster).unwrap().unwrap();
        assert_eq!(aspect, "endpoint access");

        cp.spec.endpoint_access.private = None;
        let (aspect, _) = cluster_config_update(&cp.spec, &cluster).unwrap().unwrap();
        assert_eq!(aspect, "logging");
    }

    #[test]
    fn test_auth_mode_only_moves_forward() {
        let mut cp = create_test_control_plane("prod", "team-a");
        let mut cluster = create_test_cluster("team-a_prod");
        assert!(auth_mode_update(&cp.spec, &cluster).unwrap().is_none());

        cp.spec.access_config = Some(AccessConfig {
            authentication_mode: AuthenticationMode::ApiAndConfigMap,
            bootstrap_cluster_creator_admin_permissions: None,
        });
        let request = auth_mode_update(&cp.spec, &cluster).unwrap().unwrap();
        assert_eq!(request.authentication_mode.as_deref(), Some("API_AND_CONFIG_MAP"));

        if let Some(access) = cluster.access_config.as_mut() {
            access.authentication_mode = Some("API".to_string());
        }
        assert!(auth_mode_update(&cp.spec, &cluster).unwrap_err().is_non_retryable());
    }

    #[test]
    fn test_upgrade_is_one_minor_step() {
        let mut cp = create_test_control_plane("prod", "team-a");
        let mut cluster = create_test_cluster("team-a_prod");
        assert_eq!(upgrade_step(&cp.spec, &cluster).unwrap(), None);

        cp.spec.version = Some("v1.31".to_string());
        assert_eq!(upgrade_step(&cp.spec, &cluster).unwrap().as_deref(), Some("1.30"));

        cluster.version = Some("1.31".to_string());
        assert_eq!(upgrade_step(&cp.spec, &cluster).unwrap(), None);
    }

    #[test]
    fn test_network_needs_two_zones() {
        let mut cp = create_test_control_plane("prod", "team-a");
        assert_eq!(validate_network(&cp.spec).unwrap().len(), 2);

        for subnet in &mut cp.spec.network.subnets {
            subnet.availability_zone = Some("us-west-2a".to_string());
        }
        let err = validate_network(&cp.spec).unwrap_err();
        assert_eq!(err.to_string(), "subnets in at least 2 different az's are required");
    }

    #[test]
    fn test_request_token_is_deterministic() {
        let mut cp = create_test_control_plane("prod", "team-a");
        let first = request_token(&cp, "create");
        assert_eq!(first, request_token(&cp, "create"));
        assert_ne!(first, request_token(&cp, "logging"));
        cp.metadata.generation = Some(2);
        assert_ne!(first, request_token(&cp, "create"));
    }

    #[test]
    fn test_cluster_tags_keep_ownership() {
        let mut cp = create_test_control_plane("prod", "team-a");
        cp.spec.additional_tags.insert("sigs.k8s.io/cluster-api-provider-aws/cluster/team-a_prod", "shared");
        cp.spec.additional_tags.insert("team", "a");
        let tags = cluster_tags(&cp.spec, "team-a_prod");
        assert!(tags.has_owned("team-a_prod"));
        assert_eq!(tags.get("team"), Some("a"));
    }

    #[test]
    fn test_most_severe_prefers_non_retryable() {
        let picked = most_severe(vec![
            ControllerError::Store("conflict".to_string()),
            ControllerError::NonRetryable("bad addon version".to_string()),
        ])
        .unwrap();
        assert!(picked.is_non_retryable());
        assert!(most_severe(Vec::new()).is_none());
    }
}
