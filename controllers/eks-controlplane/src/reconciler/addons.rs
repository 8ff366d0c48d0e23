//! EKS managed add-ons.
//!
//! Declared add-ons are created when missing and updated when their version,
//! configuration or service account role drifts. Add-ons we created that are no
//! longer declared are removed. Add-ons installed by anyone else are left alone.

use super::Reconciler;
use super::cluster::most_severe;
use super::status::{addon_state, status_mut};
use crate::error::ControllerError;
use crds::conditions;
use crds::eks_control_plane::condition_types::EKS_ADDONS_CONFIGURED;
use crds::{Addon, AddonState, BuildParams, ConditionSeverity, EksControlPlane, Tags};
use eks_client::{CreateAddonRequest, UpdateAddonRequest};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Add-on states in which EKS accepts an update.
const UPDATABLE_STATES: [&str; 2] = ["ACTIVE", "DEGRADED"];

/// Update needed to bring `current` in line with `desired`, if any.
pub(crate) fn addon_update(desired: &Addon, current: &eks_client::Addon) -> Option<UpdateAddonRequest> {
    let version_changed = current.addon_version.as_deref() != Some(desired.version.as_str());
    let config_changed = desired.configuration.is_some() && desired.configuration != current.configuration_values;
    let role_changed =
        desired.service_account_role_arn.is_some() && desired.service_account_role_arn != current.service_account_role_arn;
    if !version_changed && !config_changed && !role_changed {
        return None;
    }
    Some(UpdateAddonRequest {
        addon_version: Some(desired.version.clone()),
        service_account_role_arn: desired.service_account_role_arn.clone(),
        resolve_conflicts: Some(desired.conflict_resolution.unwrap_or_default().as_api_str().to_string()),
        configuration_values: desired.configuration.clone(),
    })
}

fn create_request(desired: &Addon, tags: &Tags) -> CreateAddonRequest {
    CreateAddonRequest {
        addon_name: desired.name.clone(),
        addon_version: Some(desired.version.clone()),
        service_account_role_arn: desired.service_account_role_arn.clone(),
        resolve_conflicts: Some(desired.conflict_resolution.unwrap_or_default().as_api_str().to_string()),
        configuration_values: desired.configuration.clone(),
        tags: tags.0.clone(),
        client_request_token: None,
    }
}

/// Entry for an add-on that could not be read this pass: the last one reported,
/// or the declared name and version with no status yet.
fn last_known_state(previous: &[AddonState], desired: &Addon) -> AddonState {
    previous
        .iter()
        .find(|a| a.name == desired.name)
        .cloned()
        .unwrap_or_else(|| AddonState {
            name: desired.name.clone(),
            version: desired.version.clone(),
            ..Default::default()
        })
}

fn mark_addons_failed(obj: &mut EksControlPlane, message: &str) {
    conditions::mark_false(
        obj,
        EKS_ADDONS_CONFIGURED,
        "EKSAddonsConfigurationFailed",
        ConditionSeverity::Warning,
        message,
    );
}

impl Reconciler {
    /// Converge add-ons and record their states in status.
    pub(crate) async fn reconcile_addons(&self, obj: &mut EksControlPlane, cluster_name: &str) -> Result<(), ControllerError> {
        let declared: Vec<Addon> = obj.spec.addons().to_vec();
        let tags = BuildParams::owned(cluster_name)
            .with_additional(&obj.spec.additional_tags)
            .build();
        let installed = match self.eks.list_addons(cluster_name).await {
            Ok(names) => names,
            Err(e) => {
                mark_addons_failed(obj, &e.to_string());
                return Err(e.into());
            }
        };

        let previous = obj.status.as_ref().map(|s| s.addons.clone()).unwrap_or_default();
        let mut states = Vec::new();
        let mut failures = Vec::new();

        for desired in &declared {
            match self.reconcile_addon(cluster_name, desired, &tags).await {
                Ok(Some(current)) => states.push(addon_state(&current)),
                Ok(None) => states.push(last_known_state(&previous, desired)),
                Err(e) => {
                    warn!("Failed to reconcile add-on {} of {}: {}", desired.name, cluster_name, e);
                    states.push(last_known_state(&previous, desired));
                    failures.push(e);
                }
            }
        }

        let declared_names: BTreeSet<&str> = declared.iter().map(|a| a.name.as_str()).collect();
        for name in installed.iter().filter(|n| !declared_names.contains(n.as_str())) {
            if let Err(e) = self.remove_undeclared_addon(cluster_name, name).await {
                warn!("Failed to remove add-on {} of {}: {}", name, cluster_name, e);
                failures.push(e);
            }
        }

        states.sort_by(|a, b| a.name.cmp(&b.name));
        status_mut(obj).addons = states;

        match most_severe(failures) {
            None => {
                conditions::mark_true(obj, EKS_ADDONS_CONFIGURED);
                Ok(())
            }
            Some(e) => {
                mark_addons_failed(obj, &e.to_string());
                Err(e)
            }
        }
    }

    /// Create or update one declared add-on; returns the state to report.
    async fn reconcile_addon(
        &self,
        cluster_name: &str,
        desired: &Addon,
        tags: &Tags,
    ) -> Result<Option<eks_client::Addon>, ControllerError> {
        let current = match self.eks.describe_addon(cluster_name, &desired.name).await {
            Ok(current) => current,
            Err(e) if e.is_not_found() => {
                return match self.eks.create_addon(cluster_name, &create_request(desired, tags)).await {
                    Ok(created) => {
                        info!("Created add-on {} {} in {}", desired.name, desired.version, cluster_name);
                        Ok(Some(created))
                    }
                    Err(e) if e.is_conflict() => {
                        debug!("Add-on {} already exists in {}", desired.name, cluster_name);
                        Ok(None)
                    }
                    Err(e) => Err(e.into()),
                };
            }
            Err(e) => return Err(e.into()),
        };

        let Some(request) = addon_update(desired, &current) else {
            return Ok(Some(current));
        };
        let status = current.status.as_deref().unwrap_or_default();
        if !UPDATABLE_STATES.contains(&status) {
            debug!("Add-on {} of {} is {}, not updating yet", desired.name, cluster_name, status);
            return Ok(Some(current));
        }
        let update = self.eks.update_addon(cluster_name, &desired.name, &request).await?;
        info!(
            "Updating add-on {} of {} to {} (update {})",
            desired.name, cluster_name, desired.version, update.id
        );
        Ok(Some(current))
    }

    async fn remove_undeclared_addon(&self, cluster_name: &str, name: &str) -> Result<(), ControllerError> {
        let addon = match self.eks.describe_addon(cluster_name, name).await {
            Ok(addon) => addon,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if !Tags::from(addon.tags.clone()).has_owned(cluster_name) {
            debug!("Add-on {} of {} is not ours, keeping it", name, cluster_name);
            return Ok(());
        }
        match self.eks.delete_addon(cluster_name, name).await {
            Ok(_) => {
                info!("Deleted undeclared add-on {} of {}", name, cluster_name);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
