//! EKS operations for MockEksClient
//!
//! Clusters, add-ons, access entries and node groups. Clusters reject a second
//! update while one is in flight, like EKS does.

use super::{MOCK_ACCOUNT, MockEksClient, lock};
use crate::error::EksError;
use crate::models::*;
use chrono::Utc;

fn cluster_not_found(name: &str) -> EksError {
    EksError::NotFound(format!("No cluster found for name: {name}."))
}

fn require_cluster(client: &MockEksClient, name: &str) -> Result<(), EksError> {
    if lock(&client.clusters).contains_key(name) {
        Ok(())
    } else {
        Err(cluster_not_found(name))
    }
}

fn update(client: &MockEksClient, type_: &str) -> Update {
    Update {
        id: format!("update-{}", client.next_id()),
        status: Some("InProgress".to_string()),
        type_: Some(type_.to_string()),
        errors: vec![],
    }
}

pub fn describe_cluster(client: &MockEksClient, name: &str) -> Result<Cluster, EksError> {
    client.record("describe_cluster", name)?;
    lock(&client.clusters)
        .get(name)
        .cloned()
        .ok_or_else(|| cluster_not_found(name))
}

pub fn create_cluster(client: &MockEksClient, request: &CreateClusterRequest) -> Result<Cluster, EksError> {
    client.record("create_cluster", &request.name)?;
    let mut clusters = lock(&client.clusters);
    if clusters.contains_key(&request.name) {
        return Err(EksError::AlreadyExists(format!(
            "Cluster already exists with name: {}",
            request.name
        )));
    }

    let id = client.next_id();
    let vpc = &request.resources_vpc_config;
    let cluster = Cluster {
        name: request.name.clone(),
        arn: Some(format!(
            "arn:aws:eks:{}:{MOCK_ACCOUNT}:cluster/{}",
            client.region, request.name
        )),
        created_at: Some(Utc::now()),
        version: Some(request.version.clone().unwrap_or_else(|| "1.30".to_string())),
        endpoint: Some(format!("https://{id:032X}.gr7.{}.eks.amazonaws.com", client.region)),
        role_arn: Some(request.role_arn.clone()),
        resources_vpc_config: Some(VpcConfigResponse {
            subnet_ids: vpc.subnet_ids.clone(),
            security_group_ids: vpc.security_group_ids.clone(),
            cluster_security_group_id: Some(format!("sg-cluster{id:08x}")),
            vpc_id: Some(format!("vpc-{id:08x}")),
            endpoint_public_access: vpc.endpoint_public_access.unwrap_or(true),
            endpoint_private_access: vpc.endpoint_private_access.unwrap_or(false),
            public_access_cidrs: vpc
                .public_access_cidrs
                .clone()
                .unwrap_or_else(|| vec!["0.0.0.0/0".to_string()]),
        }),
        kubernetes_network_config: Some(request.kubernetes_network_config.clone().unwrap_or(
            KubernetesNetworkConfig {
                ip_family: Some("ipv4".to_string()),
                service_ipv4_cidr: Some("10.100.0.0/16".to_string()),
            },
        )),
        logging: request.logging.clone(),
        identity: Some(Identity {
            oidc: Some(Oidc {
                issuer: Some(format!("https://oidc.eks.{}.amazonaws.com/id/{id:032X}", client.region)),
            }),
        }),
        status: ClusterStatus::Creating,
        encryption_config: request.encryption_config.clone(),
        access_config: Some(AccessConfigResponse {
            authentication_mode: Some(
                request
                    .access_config
                    .as_ref()
                    .and_then(|a| a.authentication_mode.clone())
                    .unwrap_or_else(|| "CONFIG_MAP".to_string()),
            ),
            bootstrap_cluster_creator_admin_permissions: request
                .access_config
                .as_ref()
                .and_then(|a| a.bootstrap_cluster_creator_admin_permissions),
        }),
        tags: request.tags.clone(),
    };
    clusters.insert(request.name.clone(), cluster.clone());
    Ok(cluster)
}

fn begin_update<'a>(
    clusters: &'a mut std::collections::HashMap<String, Cluster>,
    name: &str,
) -> Result<&'a mut Cluster, EksError> {
    let cluster = clusters.get_mut(name).ok_or_else(|| cluster_not_found(name))?;
    if cluster.status != ClusterStatus::Active {
        return Err(EksError::ResourceInUse(format!(
            "Cluster {name} is in {} state; an update is already in progress",
            cluster.status
        )));
    }
    Ok(cluster)
}

pub fn update_cluster_version(client: &MockEksClient, name: &str, version: &str) -> Result<Update, EksError> {
    client.record("update_cluster_version", name)?;
    let mut clusters = lock(&client.clusters);
    let cluster = begin_update(&mut clusters, name)?;
    cluster.version = Some(version.to_string());
    cluster.status = ClusterStatus::Updating;
    Ok(update(client, "VersionUpdate"))
}

pub fn update_cluster_config(
    client: &MockEksClient,
    name: &str,
    request: &UpdateClusterConfigRequest,
) -> Result<Update, EksError> {
    client.record("update_cluster_config", name)?;
    let mut clusters = lock(&client.clusters);
    let cluster = begin_update(&mut clusters, name)?;

    let type_ = if let Some(vpc) = &request.resources_vpc_config {
        let current = cluster.resources_vpc_config.get_or_insert_with(Default::default);
        if let Some(public) = vpc.endpoint_public_access {
            current.endpoint_public_access = public;
        }
        if let Some(private) = vpc.endpoint_private_access {
            current.endpoint_private_access = private;
        }
        if let Some(cidrs) = &vpc.public_access_cidrs {
            current.public_access_cidrs = cidrs.clone();
        }
        "EndpointAccessUpdate"
    } else if let Some(logging) = &request.logging {
        cluster.logging = Some(logging.clone());
        "LoggingUpdate"
    } else if let Some(access) = &request.access_config {
        let current = cluster.access_config.get_or_insert_with(Default::default);
        current.authentication_mode = access.authentication_mode.clone();
        "AccessConfigUpdate"
    } else {
        return Err(EksError::NonRetryable {
            code: "InvalidParameterException".to_string(),
            message: "No changes needed".to_string(),
        });
    };

    cluster.status = ClusterStatus::Updating;
    Ok(update(client, type_))
}

pub fn delete_cluster(client: &MockEksClient, name: &str) -> Result<Cluster, EksError> {
    client.record("delete_cluster", name)?;
    let mut clusters = lock(&client.clusters);
    let mut cluster = clusters.remove(name).ok_or_else(|| cluster_not_found(name))?;
    cluster.status = ClusterStatus::Deleting;
    Ok(cluster)
}

pub fn tag_resource(client: &MockEksClient, resource_arn: &str, tags: &TagMap) -> Result<(), EksError> {
    client.record("tag_resource", resource_arn)?;
    let mut clusters = lock(&client.clusters);
    let cluster = clusters
        .values_mut()
        .find(|c| c.arn.as_deref() == Some(resource_arn))
        .ok_or_else(|| EksError::NotFound(format!("Resource {resource_arn} not found")))?;
    cluster.tags.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(())
}

pub fn list_addons(client: &MockEksClient, cluster: &str) -> Result<Vec<String>, EksError> {
    client.record("list_addons", cluster)?;
    require_cluster(client, cluster)?;
    let mut names: Vec<String> = lock(&client.addons)
        .keys()
        .filter(|(c, _)| c == cluster)
        .map(|(_, n)| n.clone())
        .collect();
    names.sort();
    Ok(names)
}

pub fn describe_addon(client: &MockEksClient, cluster: &str, addon: &str) -> Result<Addon, EksError> {
    client.record("describe_addon", addon)?;
    lock(&client.addons)
        .get(&(cluster.to_string(), addon.to_string()))
        .cloned()
        .ok_or_else(|| EksError::NotFound(format!("No addon: {addon} found in cluster: {cluster}")))
}

pub fn create_addon(client: &MockEksClient, cluster: &str, request: &CreateAddonRequest) -> Result<Addon, EksError> {
    client.record("create_addon", &request.addon_name)?;
    require_cluster(client, cluster)?;
    let key = (cluster.to_string(), request.addon_name.clone());
    let mut addons = lock(&client.addons);
    if addons.contains_key(&key) {
        return Err(EksError::AlreadyExists(format!("Addon already exists with name: {}", request.addon_name)));
    }
    let now = Utc::now();
    let addon = Addon {
        addon_name: request.addon_name.clone(),
        cluster_name: Some(cluster.to_string()),
        status: Some("ACTIVE".to_string()),
        addon_version: request.addon_version.clone(),
        addon_arn: Some(format!(
            "arn:aws:eks:{}:{MOCK_ACCOUNT}:addon/{cluster}/{}/{}",
            client.region,
            request.addon_name,
            client.next_id()
        )),
        created_at: Some(now),
        modified_at: Some(now),
        health: Some(AddonHealth::default()),
        service_account_role_arn: request.service_account_role_arn.clone(),
        configuration_values: request.configuration_values.clone(),
        tags: request.tags.clone(),
    };
    addons.insert(key, addon.clone());
    Ok(addon)
}

pub fn update_addon(
    client: &MockEksClient,
    cluster: &str,
    addon: &str,
    request: &UpdateAddonRequest,
) -> Result<Update, EksError> {
    client.record("update_addon", addon)?;
    let mut addons = lock(&client.addons);
    let current = addons
        .get_mut(&(cluster.to_string(), addon.to_string()))
        .ok_or_else(|| EksError::NotFound(format!("No addon: {addon} found in cluster: {cluster}")))?;
    if request.addon_version.is_some() {
        current.addon_version = request.addon_version.clone();
    }
    if request.configuration_values.is_some() {
        current.configuration_values = request.configuration_values.clone();
    }
    current.modified_at = Some(Utc::now());
    drop(addons);
    Ok(update(client, "AddonUpdate"))
}

pub fn delete_addon(client: &MockEksClient, cluster: &str, addon: &str) -> Result<Addon, EksError> {
    client.record("delete_addon", addon)?;
    let mut removed = lock(&client.addons)
        .remove(&(cluster.to_string(), addon.to_string()))
        .ok_or_else(|| EksError::NotFound(format!("No addon: {addon} found in cluster: {cluster}")))?;
    removed.status = Some("DELETING".to_string());
    Ok(removed)
}

fn entry_not_found(principal_arn: &str) -> EksError {
    EksError::NotFound(format!("The specified principalArn could not be found: {principal_arn}"))
}

pub fn list_access_entries(client: &MockEksClient, cluster: &str) -> Result<Vec<String>, EksError> {
    client.record("list_access_entries", cluster)?;
    require_cluster(client, cluster)?;
    let mut arns: Vec<String> = lock(&client.access_entries)
        .keys()
        .filter(|(c, _)| c == cluster)
        .map(|(_, p)| p.clone())
        .collect();
    arns.sort();
    Ok(arns)
}

pub fn describe_access_entry(client: &MockEksClient, cluster: &str, principal_arn: &str) -> Result<AccessEntry, EksError> {
    client.record("describe_access_entry", principal_arn)?;
    lock(&client.access_entries)
        .get(&(cluster.to_string(), principal_arn.to_string()))
        .cloned()
        .ok_or_else(|| entry_not_found(principal_arn))
}

pub fn create_access_entry(
    client: &MockEksClient,
    cluster: &str,
    request: &CreateAccessEntryRequest,
) -> Result<AccessEntry, EksError> {
    client.record("create_access_entry", &request.principal_arn)?;
    require_cluster(client, cluster)?;
    let key = (cluster.to_string(), request.principal_arn.clone());
    let mut entries = lock(&client.access_entries);
    if entries.contains_key(&key) {
        return Err(EksError::AlreadyExists(format!(
            "The specified access entry resource is already in use on this cluster: {}",
            request.principal_arn
        )));
    }
    let entry = AccessEntry {
        principal_arn: request.principal_arn.clone(),
        cluster_name: Some(cluster.to_string()),
        access_entry_arn: Some(format!(
            "arn:aws:eks:{}:{MOCK_ACCOUNT}:access-entry/{cluster}/{}",
            client.region,
            client.next_id()
        )),
        kubernetes_groups: request.kubernetes_groups.clone(),
        username: request.username.clone(),
        type_: Some(request.type_.clone().unwrap_or_else(|| "STANDARD".to_string())),
        tags: request.tags.clone(),
    };
    entries.insert(key, entry.clone());
    Ok(entry)
}

pub fn update_access_entry(
    client: &MockEksClient,
    cluster: &str,
    principal_arn: &str,
    request: &UpdateAccessEntryRequest,
) -> Result<AccessEntry, EksError> {
    client.record("update_access_entry", principal_arn)?;
    let mut entries = lock(&client.access_entries);
    let entry = entries
        .get_mut(&(cluster.to_string(), principal_arn.to_string()))
        .ok_or_else(|| entry_not_found(principal_arn))?;
    entry.kubernetes_groups = request.kubernetes_groups.clone();
    if request.username.is_some() {
        entry.username = request.username.clone();
    }
    Ok(entry.clone())
}

pub fn delete_access_entry(client: &MockEksClient, cluster: &str, principal_arn: &str) -> Result<(), EksError> {
    client.record("delete_access_entry", principal_arn)?;
    let key = (cluster.to_string(), principal_arn.to_string());
    lock(&client.access_entries)
        .remove(&key)
        .ok_or_else(|| entry_not_found(principal_arn))?;
    lock(&client.access_policies).remove(&key);
    Ok(())
}

pub fn list_associated_access_policies(
    client: &MockEksClient,
    cluster: &str,
    principal_arn: &str,
) -> Result<Vec<AssociatedAccessPolicy>, EksError> {
    client.record("list_associated_access_policies", principal_arn)?;
    let key = (cluster.to_string(), principal_arn.to_string());
    if !lock(&client.access_entries).contains_key(&key) {
        return Err(entry_not_found(principal_arn));
    }
    Ok(lock(&client.access_policies).get(&key).cloned().unwrap_or_default())
}

pub fn associate_access_policy(
    client: &MockEksClient,
    cluster: &str,
    principal_arn: &str,
    policy: &AssociatedAccessPolicy,
) -> Result<(), EksError> {
    client.record("associate_access_policy", principal_arn)?;
    let key = (cluster.to_string(), principal_arn.to_string());
    if !lock(&client.access_entries).contains_key(&key) {
        return Err(entry_not_found(principal_arn));
    }
    let mut policies = lock(&client.access_policies);
    let list = policies.entry(key).or_default();
    list.retain(|p| p.policy_arn != policy.policy_arn);
    list.push(policy.clone());
    Ok(())
}

pub fn disassociate_access_policy(
    client: &MockEksClient,
    cluster: &str,
    principal_arn: &str,
    policy_arn: &str,
) -> Result<(), EksError> {
    client.record("disassociate_access_policy", principal_arn)?;
    let key = (cluster.to_string(), principal_arn.to_string());
    if let Some(list) = lock(&client.access_policies).get_mut(&key) {
        list.retain(|p| p.policy_arn != policy_arn);
    }
    Ok(())
}

pub fn list_nodegroups(client: &MockEksClient, cluster: &str) -> Result<Vec<String>, EksError> {
    client.record("list_nodegroups", cluster)?;
    require_cluster(client, cluster)?;
    Ok(client.nodegroup_names(cluster))
}

pub fn describe_nodegroup(client: &MockEksClient, cluster: &str, nodegroup: &str) -> Result<Nodegroup, EksError> {
    client.record("describe_nodegroup", nodegroup)?;
    lock(&client.nodegroups)
        .get(&(cluster.to_string(), nodegroup.to_string()))
        .cloned()
        .ok_or_else(|| EksError::NotFound(format!("No node group found for name: {nodegroup}.")))
}

pub fn delete_nodegroup(client: &MockEksClient, cluster: &str, nodegroup: &str) -> Result<Nodegroup, EksError> {
    client.record("delete_nodegroup", nodegroup)?;
    let mut removed = lock(&client.nodegroups)
        .remove(&(cluster.to_string(), nodegroup.to_string()))
        .ok_or_else(|| EksError::NotFound(format!("No node group found for name: {nodegroup}.")))?;
    removed.status = Some("DELETING".to_string());
    Ok(removed)
}
