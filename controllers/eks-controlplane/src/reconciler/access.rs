//! EKS access entries and their access policy associations.
//!
//! Entries only exist once the cluster accepts API authentication, so nothing
//! happens while EKS still reports `CONFIG_MAP`. Entries that are no longer
//! declared are deleted only when they carry our ownership tag; EKS creates
//! entries of its own for node roles and the cluster creator.

use super::Reconciler;
use super::cluster::{most_severe, remote_auth_mode};
use crate::error::ControllerError;
use crds::{AccessEntry, AccessPolicyReference, AccessScopeType, AuthenticationMode, BuildParams, EksControlPlane, Tags};
use eks_client::{AccessScope, AssociatedAccessPolicy, Cluster, CreateAccessEntryRequest, UpdateAccessEntryRequest};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Gateway form of a declared policy association.
pub(crate) fn associated_policy(policy: &AccessPolicyReference) -> AssociatedAccessPolicy {
    let type_ = match policy.access_scope.type_ {
        AccessScopeType::Cluster => "cluster",
        AccessScopeType::Namespace => "namespace",
    };
    let mut namespaces = policy.access_scope.namespaces.clone();
    namespaces.sort();
    AssociatedAccessPolicy {
        policy_arn: policy.policy_arn.clone(),
        access_scope: AccessScope { type_: type_.to_string(), namespaces },
    }
}

fn same_policy(a: &AssociatedAccessPolicy, b: &AssociatedAccessPolicy) -> bool {
    let mut a_ns = a.access_scope.namespaces.clone();
    let mut b_ns = b.access_scope.namespaces.clone();
    a_ns.sort();
    b_ns.sort();
    a.policy_arn == b.policy_arn && a.access_scope.type_ == b.access_scope.type_ && a_ns == b_ns
}

/// Update needed for an existing entry's groups or username, if any.
pub(crate) fn entry_update(desired: &AccessEntry, current: &eks_client::AccessEntry) -> Option<UpdateAccessEntryRequest> {
    let mut want: Vec<String> = desired.kubernetes_groups.clone();
    let mut have: Vec<String> = current.kubernetes_groups.clone();
    want.sort();
    have.sort();
    let username_changed = desired.username.is_some() && desired.username != current.username;
    if want == have && !username_changed {
        return None;
    }
    Some(UpdateAccessEntryRequest {
        kubernetes_groups: desired.kubernetes_groups.clone(),
        username: desired.username.clone(),
    })
}

impl Reconciler {
    /// Converge access entries and their policies.
    pub(crate) async fn reconcile_access_entries(
        &self,
        obj: &EksControlPlane,
        cluster_name: &str,
        cluster: &Cluster,
    ) -> Result<(), ControllerError> {
        if remote_auth_mode(cluster) == AuthenticationMode::ConfigMap {
            debug!("{} uses CONFIG_MAP authentication, skipping access entries", cluster_name);
            return Ok(());
        }

        let existing: BTreeSet<String> = self.eks.list_access_entries(cluster_name).await?.into_iter().collect();
        let tags = BuildParams::owned(cluster_name)
            .with_additional(&obj.spec.additional_tags)
            .build();
        let mut failures = Vec::new();

        for entry in &obj.spec.access_entries {
            let result = if existing.contains(&entry.principal_arn) {
                self.update_entry(cluster_name, entry, &tags).await
            } else {
                self.create_entry(cluster_name, entry, &tags).await
            };
            let result = match result {
                Ok(()) => self.reconcile_policies(cluster_name, entry).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!("Failed to reconcile access entry {} of {}: {}", entry.principal_arn, cluster_name, e);
                failures.push(e);
            }
        }

        let declared: BTreeSet<&str> = obj.spec.access_entries.iter().map(|e| e.principal_arn.as_str()).collect();
        for principal in existing.iter().filter(|p| !declared.contains(p.as_str())) {
            if let Err(e) = self.remove_undeclared_entry(cluster_name, principal).await {
                warn!("Failed to delete access entry {} of {}: {}", principal, cluster_name, e);
                failures.push(e);
            }
        }

        match most_severe(failures) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn create_entry(&self, cluster_name: &str, entry: &AccessEntry, tags: &Tags) -> Result<(), ControllerError> {
        let request = CreateAccessEntryRequest {
            principal_arn: entry.principal_arn.clone(),
            kubernetes_groups: entry.kubernetes_groups.clone(),
            username: entry.username.clone(),
            type_: Some(entry.type_.clone()),
            tags: tags.0.clone(),
        };
        match self.eks.create_access_entry(cluster_name, &request).await {
            Ok(_) => {
                info!("Created access entry {} in {}", entry.principal_arn, cluster_name);
                Ok(())
            }
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Update groups and username; a changed entry type needs a delete and re-create.
    async fn update_entry(&self, cluster_name: &str, entry: &AccessEntry, tags: &Tags) -> Result<(), ControllerError> {
        let current = self.eks.describe_access_entry(cluster_name, &entry.principal_arn).await?;
        if current.type_.as_deref().is_some_and(|t| t != entry.type_) {
            info!(
                "Access entry {} of {} changed type, re-creating",
                entry.principal_arn, cluster_name
            );
            self.eks.delete_access_entry(cluster_name, &entry.principal_arn).await?;
            return self.create_entry(cluster_name, entry, tags).await;
        }
        if let Some(request) = entry_update(entry, &current) {
            self.eks
                .update_access_entry(cluster_name, &entry.principal_arn, &request)
                .await?;
            info!("Updated access entry {} in {}", entry.principal_arn, cluster_name);
        }
        Ok(())
    }

    async fn reconcile_policies(&self, cluster_name: &str, entry: &AccessEntry) -> Result<(), ControllerError> {
        let current = self
            .eks
            .list_associated_access_policies(cluster_name, &entry.principal_arn)
            .await?;
        let desired: Vec<AssociatedAccessPolicy> = entry.access_policies.iter().map(associated_policy).collect();

        for policy in &desired {
            if !current.iter().any(|c| same_policy(c, policy)) {
                self.eks
                    .associate_access_policy(cluster_name, &entry.principal_arn, policy)
                    .await?;
                info!("Associated {} with {}", policy.policy_arn, entry.principal_arn);
            }
        }
        for policy in &current {
            if !desired.iter().any(|d| d.policy_arn == policy.policy_arn) {
                self.eks
                    .disassociate_access_policy(cluster_name, &entry.principal_arn, &policy.policy_arn)
                    .await?;
                info!("Disassociated {} from {}", policy.policy_arn, entry.principal_arn);
            }
        }
        Ok(())
    }

    async fn remove_undeclared_entry(&self, cluster_name: &str, principal: &str) -> Result<(), ControllerError> {
        let entry = match self.eks.describe_access_entry(cluster_name, principal).await {
            Ok(entry) => entry,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if !Tags::from(entry.tags).has_owned(cluster_name) {
            return Ok(());
        }
        match self.eks.delete_access_entry(cluster_name, principal).await {
            Ok(()) => {
                info!("Deleted undeclared access entry {} of {}", principal, cluster_name);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
