//! Status bookkeeping shared by the reconcile steps.

use crds::conditions::{self, READY_CONDITION};
use crds::eks_control_plane::condition_types::{EKS_CONTROL_PLANE_READY, EKS_CONTROL_PLANE_UPDATING};
use crds::{AddonIssue, AddonState, ConditionSeverity, EksControlPlane, EksControlPlaneStatus, NetworkStatus};
use eks_client::Cluster;

/// Status of `obj`, created on first use.
pub(crate) fn status_mut(obj: &mut EksControlPlane) -> &mut EksControlPlaneStatus {
    obj.status.get_or_insert_with(Default::default)
}

/// `host:443` from the endpoint URL EKS reports.
pub(crate) fn endpoint_host(endpoint: &str) -> String {
    let host = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .unwrap_or(endpoint)
        .trim_end_matches('/');
    if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:443")
    }
}

/// Copy what EKS reports about the cluster into status.
pub(crate) fn observe_cluster(obj: &mut EksControlPlane, cluster: &Cluster) {
    let status = status_mut(obj);
    if let Some(version) = &cluster.version {
        status.version = Some(version.clone());
    }
    if let Some(endpoint) = cluster.endpoint.as_deref().filter(|e| !e.is_empty()) {
        status.endpoint = Some(endpoint_host(endpoint));
    }

    let vpc = cluster.resources_vpc_config.as_ref();
    let ip_family = cluster
        .kubernetes_network_config
        .as_ref()
        .and_then(|n| n.ip_family.clone());
    if vpc.is_some() || ip_family.is_some() {
        status.network_status = Some(NetworkStatus {
            cluster_security_group_id: vpc.and_then(|v| v.cluster_security_group_id.clone()),
            vpc_id: vpc.and_then(|v| v.vpc_id.clone()),
            ip_family,
        });
    }

    if let Some(issuer) = cluster.oidc_issuer() {
        status.oidc_provider.get_or_insert_with(Default::default).issuer_url = Some(issuer.to_string());
    }
}

/// Status entry for an installed add-on.
pub(crate) fn addon_state(addon: &eks_client::Addon) -> AddonState {
    AddonState {
        name: addon.addon_name.clone(),
        version: addon.addon_version.clone().unwrap_or_default(),
        arn: addon.addon_arn.clone(),
        status: addon.status.clone(),
        created_at: addon.created_at,
        modified_at: addon.modified_at,
        issues: addon
            .health
            .iter()
            .flat_map(|h| h.issues.iter())
            .map(|i| AddonIssue {
                code: i.code.clone(),
                message: i.message.clone(),
                resource_ids: i.resource_ids.clone(),
            })
            .collect(),
    }
}

/// Mark the control plane as not ready while work is in flight.
pub(crate) fn mark_in_progress(obj: &mut EksControlPlane, condition: &str, reason: &str, message: impl Into<String>) {
    let message = message.into();
    conditions::mark_true(obj, condition);
    conditions::mark_false(obj, EKS_CONTROL_PLANE_READY, reason, ConditionSeverity::Info, message.clone());
    conditions::mark_false(obj, READY_CONDITION, reason, ConditionSeverity::Info, message);
    status_mut(obj).ready = false;
}

/// Mark a pending update as finished, if one was recorded.
pub(crate) fn clear_updating(obj: &mut EksControlPlane) {
    if conditions::is_true(obj, EKS_CONTROL_PLANE_UPDATING) {
        conditions::mark_false(obj, EKS_CONTROL_PLANE_UPDATING, "Updated", ConditionSeverity::Info, "update completed");
    }
}
