//! Teardown of a control plane marked for deletion.
//!
//! Owned node groups go first, then load balancers found through the workload
//! cluster (direct strategy), then the cluster itself, then anything still
//! tagged as owned by it (tag-sweep strategy). The finalizer is removed last.
//! Every step is re-derived from remote state on each pass.

use super::state_machine::{Event, advance};
use super::status::status_mut;
use super::{REQUEUE_IN_PROGRESS, Reconciler};
use crate::config::GcStrategy;
use crate::error::ControllerError;
use crate::gc::{self, GcError, GcReport};
use crds::conditions;
use crds::eks_control_plane::condition_types::EXTERNAL_RESOURCE_GC_SUCCEEDED;
use crds::{ConditionSeverity, EksControlPlane, Tags};
use eks_client::ClusterStatus;
use kube_runtime::controller::Action;
use tracing::{debug, info, warn};

/// Outcome of one deletion pass.
#[derive(Debug)]
pub(crate) enum Teardown {
    /// Something is still going away; look again later.
    Wait(Action),
    /// Everything owned is gone; the finalizer can be removed.
    Done,
}

impl Reconciler {
    /// Run one deletion pass over `obj`.
    pub(crate) async fn reconcile_delete(&self, obj: &mut EksControlPlane) -> Result<Teardown, ControllerError> {
        advance(&mut status_mut(obj).phase, Event::DeletionRequested);

        let Some(name) = obj.cluster_name().map(str::to_string) else {
            info!("{} never had a cluster name, nothing to delete", obj.key());
            return Ok(Teardown::Done);
        };

        if self.delete_nodegroups(&name).await? {
            return Ok(Teardown::Wait(Action::requeue(REQUEUE_IN_PROGRESS)));
        }

        let cluster = match self.eks.describe_cluster(&name).await {
            Ok(cluster) => Some(cluster),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        if let Some(cluster) = cluster {
            if cluster.status == ClusterStatus::Deleting {
                debug!("EKS cluster {} is deleting", name);
                return Ok(Teardown::Wait(Action::requeue(REQUEUE_IN_PROGRESS)));
            }

            if self.settings.gc_strategy == GcStrategy::Direct && obj.gc_enabled() {
                let outcome = self.collect_direct(obj).await;
                if let Some(wait) = self.record_gc(obj, outcome) {
                    return Ok(wait);
                }
            }

            match self.eks.delete_cluster(&name).await {
                Ok(_) => info!("Deleting EKS cluster {} for {}", name, obj.key()),
                Err(e) if e.is_not_found() => debug!("EKS cluster {} already gone", name),
                Err(e) if e.is_resource_in_use() => debug!("EKS cluster {} still has dependents: {}", name, e),
                Err(e) => return Err(e.into()),
            }
            return Ok(Teardown::Wait(Action::requeue(REQUEUE_IN_PROGRESS)));
        }

        if self.settings.gc_strategy == GcStrategy::TagSweep && obj.gc_enabled() {
            let outcome = gc::tag_sweep::collect(self.eks.as_ref(), &name, &self.settings.gc).await;
            if let Some(wait) = self.record_gc(obj, outcome) {
                return Ok(wait);
            }
        } else if !obj.gc_enabled() {
            info!("External resource GC disabled for {}", obj.key());
        }

        Ok(Teardown::Done)
    }

    /// Delete owned node groups. Returns whether any remain.
    async fn delete_nodegroups(&self, cluster_name: &str) -> Result<bool, ControllerError> {
        let names = match self.eks.list_nodegroups(cluster_name).await {
            Ok(names) => names,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let mut remaining = false;
        for ng in names {
            let nodegroup = match self.eks.describe_nodegroup(cluster_name, &ng).await {
                Ok(nodegroup) => nodegroup,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            if !Tags::from(nodegroup.tags).has_owned(cluster_name) {
                debug!("Node group {} of {} is not owned, leaving it", ng, cluster_name);
                continue;
            }
            remaining = true;
            if nodegroup.status.as_deref() == Some("DELETING") {
                continue;
            }
            match self.eks.delete_nodegroup(cluster_name, &ng).await {
                Ok(_) => info!("Deleting node group {} of {}", ng, cluster_name),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(remaining)
    }

    async fn collect_direct(&self, obj: &EksControlPlane) -> Result<GcReport, GcError> {
        let client = match self.workload.connect(obj).await {
            Ok(Some(client)) => client,
            Ok(None) => {
                warn!("No kubeconfig for {}, skipping direct GC", obj.key());
                return Ok(GcReport::default());
            }
            Err(e) => {
                warn!("Cannot reach workload cluster of {}, skipping direct GC: {}", obj.key(), e);
                return Ok(GcReport::default());
            }
        };
        let hostnames = match client.list_load_balancer_services().await {
            Ok(hostnames) => hostnames,
            Err(e) => {
                warn!("Listing LoadBalancer Services of {} failed, skipping direct GC: {}", obj.key(), e);
                return Ok(GcReport::default());
            }
        };
        gc::direct::collect(self.eks.as_ref(), &hostnames, &self.settings.gc).await
    }

    /// Record a GC pass in status. Returns a wait while passes remain after a failure.
    fn record_gc(&self, obj: &mut EksControlPlane, outcome: Result<GcReport, GcError>) -> Option<Teardown> {
        match outcome {
            Ok(report) => {
                if !report.deleted.is_empty() {
                    info!("Deleted {} external resource(s) of {}", report.deleted.len(), obj.key());
                }
                self.metrics.record_gc_deleted(report.deleted.len());
                conditions::mark_true(obj, EXTERNAL_RESOURCE_GC_SUCCEEDED);
                None
            }
            Err(e) => {
                conditions::mark_false(
                    obj,
                    EXTERNAL_RESOURCE_GC_SUCCEEDED,
                    "ExternalResourceGCFailed",
                    ConditionSeverity::Warning,
                    e.to_string(),
                );
                let status = status_mut(obj);
                status.gc_attempts += 1;
                let attempts = status.gc_attempts;
                if attempts < self.settings.gc_max_passes {
                    warn!(
                        "External resource GC of {} failed (pass {}/{}): {}",
                        obj.key(),
                        attempts,
                        self.settings.gc_max_passes,
                        e
                    );
                    Some(Teardown::Wait(Action::requeue(REQUEUE_IN_PROGRESS)))
                } else {
                    warn!(
                        "Giving up external resource GC of {} after {} passes, leaving: {:?}",
                        obj.key(),
                        attempts,
                        e.surviving()
                    );
                    None
                }
            }
        }
    }
}
