//! EKSControlPlane watcher.
//!
//! Drives the reconciler from a `kube_runtime::Controller`, which handles
//! reconnection, per-object serialization and requeues.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::EksControlPlane;
use futures::StreamExt;
use kube::Api;
use kube_runtime::{
    Controller, watcher,
    controller::{Action, Config as ControllerConfig},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Requeue policy after a failed pass.
///
/// Non-retryable failures wait for the object to change; everything else
/// backs off per object. Objects being deleted always back off so the
/// finalizer is never stranded.
pub(crate) fn error_policy(obj: Arc<EksControlPlane>, error: &ControllerError, reconciler: Arc<Reconciler>) -> Action {
    let key = obj.key();
    if error.is_non_retryable() && !obj.is_deleting() {
        error!("Reconciliation of {} failed permanently: {}", key, error);
        return Action::await_change();
    }
    let delay = reconciler.backoff_on_error(&key);
    error!("Reconciliation of {} failed, retrying in {:?}: {}", key, delay, error);
    Action::requeue(delay)
}

async fn reconcile(obj: Arc<EksControlPlane>, reconciler: Arc<Reconciler>) -> Result<Action, ControllerError> {
    reconciler.reconcile(&obj).await
}

/// Watch EKSControlPlane objects until the stream ends.
pub async fn watch_control_planes(api: Api<EksControlPlane>, reconciler: Arc<Reconciler>) -> Result<(), ControllerError> {
    info!("Starting EKSControlPlane watcher");

    // Debounce batches our own status writes; concurrency bounds AWS load
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(5))
        .concurrency(3);

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((obj, action)) => debug!("Reconciled {:?}: {:?}", obj, action),
                Err(e) => error!("Controller error for EKSControlPlane: {}", e),
            }
        })
        .await;

    Err(ControllerError::Watch("EKSControlPlane watch stream ended".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestHarness, create_test_control_plane, deleting};
    use eks_client::EksError;

    #[test]
    fn test_non_retryable_waits_for_change() {
        let harness = TestHarness::new();
        let reconciler = Arc::new(harness.reconciler);
        let obj = Arc::new(create_test_control_plane("prod", "team-a"));

        let err = ControllerError::NotOwned("team-a_prod".to_string());
        assert_eq!(error_policy(obj.clone(), &err, reconciler.clone()), Action::await_change());

        let err = ControllerError::Store("conflict".to_string());
        assert_eq!(
            error_policy(obj.clone(), &err, reconciler.clone()),
            Action::requeue(Duration::from_secs(60))
        );
        assert_ne!(error_policy(obj, &err, reconciler), Action::await_change());
    }

    #[test]
    fn test_deleting_object_always_requeues() {
        let harness = TestHarness::new();
        let reconciler = Arc::new(harness.reconciler);
        let obj = Arc::new(deleting(create_test_control_plane("prod", "team-a")));

        let err = ControllerError::Eks(EksError::NonRetryable {
            code: "InvalidRequestException".to_string(),
            message: "Cluster has nodegroups attached".to_string(),
        });
        assert_eq!(
            error_policy(obj.clone(), &err, reconciler.clone()),
            Action::requeue(Duration::from_secs(60))
        );
        assert_ne!(error_policy(obj.clone(), &err, reconciler.clone()), Action::await_change());

        let err = ControllerError::NotOwned("team-a_prod".to_string());
        assert_ne!(error_policy(obj, &err, reconciler), Action::await_change());
    }
}
