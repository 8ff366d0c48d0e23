//! Reconciliation logic for EKSControlPlane.
//!
//! - `cluster`: create, adopt, upgrade and in-place updates of the EKS cluster
//! - `addons`: managed add-ons
//! - `access`: access entries and policy associations
//! - `delete`: teardown, including external resource garbage collection
//! - `state_machine`: the phase transition table
//! - `status`: status bookkeeping shared by the steps above
//! - `store`: reads and writes of the control plane object

pub mod access;
pub mod addons;
pub mod cluster;
pub mod delete;
pub mod state_machine;
pub mod status;
pub mod store;

use crate::backoff::FibonacciBackoff;
use crate::config::{GcStrategy, OperatorConfig};
use crate::error::ControllerError;
use crate::gc::GcSettings;
use crate::health::{Metrics, RESULT_ERROR, RESULT_FAILED, RESULT_SUCCESS};
use crate::workload::WorkloadClientFactory;
use crds::conditions::{self, READY_CONDITION};
use crds::eks_control_plane::condition_types::EKS_CONTROL_PLANE_READY;
use crds::{ConditionSeverity, ControlPlanePhase, EksControlPlane, EksControlPlaneStatus};
use delete::Teardown;
use eks_client::{EksClientTrait, EksError};
use kube_runtime::controller::Action;
use state_machine::{Event, advance};
use status::status_mut;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use store::ControlPlaneStore;
use tracing::{debug, error, info, warn};

/// Requeue interval while the remote side is busy.
pub(crate) const REQUEUE_IN_PROGRESS: Duration = Duration::from_secs(30);

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::reconcile(),
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }
}

/// Knobs the reconciler takes from the operator configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// How workload-created resources are found at teardown
    pub gc_strategy: GcStrategy,
    /// Per-resource delete retries
    pub gc: GcSettings,
    /// Partial GC passes before the finalizer is removed anyway
    pub gc_max_passes: u32,
    /// Requeue interval of a converged object
    pub resync: Duration,
}

impl ReconcilerSettings {
    pub fn from_config(config: &OperatorConfig) -> Self {
        Self {
            gc_strategy: config.gc_strategy,
            gc: GcSettings::new(config.gc_max_attempts),
            gc_max_passes: config.gc_max_passes,
            resync: config.resync,
        }
    }
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            gc_strategy: GcStrategy::default(),
            gc: GcSettings::default(),
            gc_max_passes: 3,
            resync: Duration::from_secs(600),
        }
    }
}

/// Reconciles EKSControlPlane objects.
pub struct Reconciler {
    pub(crate) eks: Arc<dyn EksClientTrait>,
    pub(crate) store: Arc<dyn ControlPlaneStore>,
    pub(crate) workload: Arc<dyn WorkloadClientFactory>,
    pub(crate) settings: ReconcilerSettings,
    pub(crate) metrics: Arc<Metrics>,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    pub fn new(
        eks: Arc<dyn EksClientTrait>,
        store: Arc<dyn ControlPlaneStore>,
        workload: Arc<dyn WorkloadClientFactory>,
        settings: ReconcilerSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            eks,
            store,
            workload,
            settings,
            metrics,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run one reconciliation pass for `cp`.
    ///
    /// A non-retryable failure is returned after the object has been moved to
    /// `Failed`; later passes leave it alone until its generation changes.
    /// Deletion never suspends: teardown failures are recorded and retried.
    pub async fn reconcile(&self, cp: &EksControlPlane) -> Result<Action, ControllerError> {
        let started = Instant::now();
        let key = cp.key();
        debug!("Reconciling EKSControlPlane {}", key);

        let result = if cp.is_deleting() {
            self.reconcile_deletion(cp).await
        } else {
            self.reconcile_normal(cp).await
        };

        let label = match &result {
            Ok(_) => {
                self.reset_backoff(&key);
                RESULT_SUCCESS
            }
            Err(e) if e.is_non_retryable() => RESULT_FAILED,
            Err(_) => RESULT_ERROR,
        };
        self.metrics.record_reconcile(label, started.elapsed());
        result
    }

    async fn reconcile_normal(&self, cp: &EksControlPlane) -> Result<Action, ControllerError> {
        let mut obj = if cp.has_finalizer() {
            cp.clone()
        } else {
            self.store.add_finalizer(cp).await?
        };
        let before = obj.status.clone();

        if obj.phase() == ControlPlanePhase::Failed {
            let observed = obj.status.as_ref().and_then(|s| s.observed_generation);
            if observed == obj.metadata.generation {
                debug!("{} is Failed at generation {:?}, waiting for a spec change", obj.key(), observed);
                return Ok(Action::await_change());
            }
            info!("Spec of {} changed since it failed, retrying", obj.key());
            let status = status_mut(&mut obj);
            advance(&mut status.phase, Event::SpecChanged);
            status.failure_message = None;
            status.observed_generation = None;
        }

        let result = match self.reconcile_control_plane(&mut obj).await {
            Err(e) if e.is_non_retryable() => {
                mark_failed(&mut obj, &e);
                Err(e)
            }
            other => other,
        };

        if let Err(e) = self.write_status(&obj, before.as_ref()).await {
            if result.is_ok() {
                return Err(e);
            }
            warn!("Failed to write status of {}: {}", obj.key(), e);
        }
        result
    }

    async fn reconcile_deletion(&self, cp: &EksControlPlane) -> Result<Action, ControllerError> {
        if !cp.has_finalizer() {
            debug!("{} is deleting without our finalizer", cp.key());
            return Ok(Action::await_change());
        }
        let mut obj = cp.clone();
        let before = obj.status.clone();

        match self.reconcile_delete(&mut obj).await {
            Ok(Teardown::Done) => {
                self.store.remove_finalizer(&obj).await?;
                info!("Deletion of {} complete", obj.key());
                Ok(Action::await_change())
            }
            Ok(Teardown::Wait(action)) => {
                if let Some(status) = obj.status.as_mut() {
                    status.failure_message = None;
                }
                self.write_status(&obj, before.as_ref()).await?;
                Ok(action)
            }
            Err(e) => {
                mark_deletion_failed(&mut obj, &e);
                if let Err(write_err) = self.write_status(&obj, before.as_ref()).await {
                    warn!("Failed to write status of {}: {}", obj.key(), write_err);
                }
                Err(e)
            }
        }
    }

    /// Patch status only when the pass changed it.
    async fn write_status(&self, obj: &EksControlPlane, before: Option<&EksControlPlaneStatus>) -> Result<(), ControllerError> {
        let Some(status) = obj.status.as_ref() else {
            return Ok(());
        };
        if before == Some(status) {
            return Ok(());
        }
        self.store.patch_status(obj, status).await
    }

    /// Next requeue delay for a failing object, growing with each failure.
    pub fn backoff_on_error(&self, key: &str) -> Duration {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(key.to_string()).or_insert_with(BackoffState::new);
        state.increment_error();
        let delay = state.backoff.next_backoff();
        debug!("{} failed {} time(s), retrying in {:?}", key, state.error_count, delay);
        delay
    }

    /// Forget the failure history of `key`.
    pub fn reset_backoff(&self, key: &str) {
        let mut states = self.backoff_states.lock().unwrap_or_else(PoisonError::into_inner);
        states.remove(key);
    }
}

/// Remote message for gateway rejections, the error text otherwise.
fn failure_message(e: &ControllerError) -> String {
    match e {
        ControllerError::Eks(EksError::NonRetryable { message, .. }) => message.clone(),
        other => other.to_string(),
    }
}

/// Move `obj` to `Failed`, recording the generation it failed at.
fn mark_failed(obj: &mut EksControlPlane, e: &ControllerError) {
    let message = failure_message(e);
    error!("{} failed: {}", obj.key(), message);
    let generation = obj.metadata.generation;
    let status = status_mut(obj);
    advance(&mut status.phase, Event::NonRetryableError);
    status.failure_message = Some(message.clone());
    status.observed_generation = generation;
    status.ready = false;
    conditions::mark_false(obj, EKS_CONTROL_PLANE_READY, "Failed", ConditionSeverity::Error, message.clone());
    conditions::mark_false(obj, READY_CONDITION, "Failed", ConditionSeverity::Error, message);
}

/// Surface a teardown failure without leaving `Deleting`.
fn mark_deletion_failed(obj: &mut EksControlPlane, e: &ControllerError) {
    let message = failure_message(e);
    warn!("Deletion of {} failed: {}", obj.key(), message);
    let status = status_mut(obj);
    status.failure_message = Some(message.clone());
    status.ready = false;
    conditions::mark_false(obj, EKS_CONTROL_PLANE_READY, "DeletionFailed", ConditionSeverity::Warning, message);
}
