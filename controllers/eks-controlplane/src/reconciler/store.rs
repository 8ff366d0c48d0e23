//! Reads and writes of `EKSControlPlane` objects.
//!
//! The reconciler only talks to the API server through [`ControlPlaneStore`] so
//! scenario tests can run against an in-memory store.

use crate::error::ControllerError;
use async_trait::async_trait;
use crds::{CONTROL_PLANE_FINALIZER, EksControlPlane, EksControlPlaneStatus};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

/// Attempts for a finalizer patch that keeps hitting 409.
const MAX_CONFLICT_RETRIES: u32 = 5;

/// Status fields that must be nulled out explicitly when cleared, since a merge
/// patch leaves absent keys untouched.
const CLEARABLE_FIELDS: [&str; 8] = [
    "version",
    "endpoint",
    "networkStatus",
    "bastion",
    "oidcProvider",
    "identityProviderStatus",
    "failureMessage",
    "observedGeneration",
];

const CLEARABLE_LISTS: [&str; 2] = ["addons", "conditions"];

#[async_trait]
pub trait ControlPlaneStore: Send + Sync {
    /// Current object, `None` once it is gone.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<EksControlPlane>, ControllerError>;

    /// Replace the status subresource.
    async fn patch_status(&self, cp: &EksControlPlane, status: &EksControlPlaneStatus) -> Result<(), ControllerError>;

    /// Add the control plane finalizer and return the updated object.
    async fn add_finalizer(&self, cp: &EksControlPlane) -> Result<EksControlPlane, ControllerError>;

    /// Remove the control plane finalizer. A missing object counts as success.
    async fn remove_finalizer(&self, cp: &EksControlPlane) -> Result<(), ControllerError>;
}

/// Merge patch body for `status` that also clears unset fields.
///
/// With a `resource_version` the API server rejects the patch with 409 when the
/// object changed since it was read.
pub fn status_patch(status: &EksControlPlaneStatus, resource_version: Option<&str>) -> Result<Value, ControllerError> {
    let mut body = serde_json::to_value(status)
        .map_err(|e| ControllerError::Store(format!("Failed to serialize status: {}", e)))?;
    if let Value::Object(fields) = &mut body {
        for key in CLEARABLE_FIELDS {
            fields.entry(key).or_insert(Value::Null);
        }
        for key in CLEARABLE_LISTS {
            fields.entry(key).or_insert_with(|| Value::Array(Vec::new()));
        }
    }
    Ok(match resource_version {
        Some(rv) => json!({ "metadata": { "resourceVersion": rv }, "status": body }),
        None => json!({ "status": body }),
    })
}

/// Retryable error for a status write that lost an optimistic-concurrency race.
pub(crate) fn status_conflict(cp: &EksControlPlane) -> ControllerError {
    ControllerError::Store(format!(
        "status of {} changed since it was read (resourceVersion {})",
        cp.key(),
        cp.resource_version().as_deref().unwrap_or("unset")
    ))
}

fn namespace_of(cp: &EksControlPlane) -> String {
    cp.namespace().unwrap_or_else(|| "default".to_string())
}

/// `ControlPlaneStore` backed by the Kubernetes API.
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<EksControlPlane> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Patch the finalizer list with the observed resourceVersion, re-reading on 409.
    async fn patch_finalizers<F>(&self, cp: &EksControlPlane, edit: F) -> Result<Option<EksControlPlane>, ControllerError>
    where
        F: Fn(&EksControlPlane) -> Option<Vec<String>> + Send + Sync,
    {
        let namespace = namespace_of(cp);
        let name = cp.name_any();
        let api = self.api(&namespace);
        let mut current = cp.clone();

        for attempt in 1..=MAX_CONFLICT_RETRIES {
            let Some(finalizers) = edit(&current) else {
                return Ok(Some(current));
            };
            let patch = json!({
                "metadata": {
                    "finalizers": finalizers,
                    "resourceVersion": current.resource_version(),
                }
            });
            match api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch)).await {
                Ok(updated) => return Ok(Some(updated)),
                Err(kube::Error::Api(e)) if e.code == 404 => return Ok(None),
                Err(kube::Error::Api(e)) if e.code == 409 => {
                    debug!(
                        "Conflict patching finalizers of {}/{} (attempt {}/{}), re-reading",
                        namespace, name, attempt, MAX_CONFLICT_RETRIES
                    );
                    match api.get_opt(&name).await? {
                        Some(fresh) => current = fresh,
                        None => return Ok(None),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ControllerError::Store(format!(
            "Gave up patching finalizers of {}/{} after {} conflicts",
            namespace, name, MAX_CONFLICT_RETRIES
        )))
    }
}

#[async_trait]
impl ControlPlaneStore for KubeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<EksControlPlane>, ControllerError> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn patch_status(&self, cp: &EksControlPlane, status: &EksControlPlaneStatus) -> Result<(), ControllerError> {
        let patch = status_patch(status, cp.resource_version().as_deref())?;
        match self
            .api(&namespace_of(cp))
            .patch_status(&cp.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            // Recomputed from a fresh read on the next pass
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!("Conflict writing status of {}", cp.key());
                Err(status_conflict(cp))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn add_finalizer(&self, cp: &EksControlPlane) -> Result<EksControlPlane, ControllerError> {
        let updated = self
            .patch_finalizers(cp, |current| {
                if current.has_finalizer() {
                    return None;
                }
                let mut finalizers = current.finalizers().to_vec();
                finalizers.push(CONTROL_PLANE_FINALIZER.to_string());
                Some(finalizers)
            })
            .await?;
        match updated {
            Some(obj) => {
                info!("Added finalizer to {}", obj.key());
                Ok(obj)
            }
            None => Err(ControllerError::Store(format!("{} disappeared while adding finalizer", cp.key()))),
        }
    }

    async fn remove_finalizer(&self, cp: &EksControlPlane) -> Result<(), ControllerError> {
        let updated = self
            .patch_finalizers(cp, |current| {
                if !current.has_finalizer() {
                    return None;
                }
                Some(
                    current
                        .finalizers()
                        .iter()
                        .filter(|f| f.as_str() != CONTROL_PLANE_FINALIZER)
                        .cloned()
                        .collect(),
                )
            })
            .await?;
        if updated.is_none() {
            warn!("{} was already gone when removing finalizer", cp.key());
        } else {
            info!("Removed finalizer from {}", cp.key());
        }
        Ok(())
    }
}
