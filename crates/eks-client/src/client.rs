//! AWS API client
//!
//! Implements the gateway over the EKS REST layout (`/clusters`,
//! `/clusters/{name}/addons`, ...) and the JSON protocol used for IAM, ELB,
//! EC2 and Resource Groups Tagging.

use crate::common::HttpClient;
use crate::error::EksError;
use crate::eks_trait::EksClientTrait;
use crate::models::*;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const EKS: &str = "eks";
const IAM: &str = "iam";
const ELB: &str = "elb";
const ELBV2: &str = "elbv2";
const EC2: &str = "ec2";
const TAGGING: &str = "tagging";

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn enc(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

#[derive(Deserialize)]
struct ClusterEnvelope {
    cluster: Cluster,
}

#[derive(Deserialize)]
struct UpdateEnvelope {
    update: Update,
}

#[derive(Deserialize)]
struct AddonEnvelope {
    addon: Addon,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessEntryEnvelope {
    access_entry: AccessEntry,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessPoliciesPage {
    #[serde(default)]
    associated_access_policies: Vec<AssociatedAccessPolicy>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Deserialize)]
struct NodegroupEnvelope {
    nodegroup: Nodegroup,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetRoleResponse {
    role: Role,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct V2LoadBalancer {
    load_balancer_arn: String,
    load_balancer_name: String,
    #[serde(rename = "DNSName", default)]
    dns_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct V2LoadBalancersPage {
    #[serde(default)]
    load_balancers: Vec<V2LoadBalancer>,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ClassicLoadBalancer {
    load_balancer_name: String,
    #[serde(rename = "DNSName", default)]
    dns_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ClassicLoadBalancersPage {
    #[serde(default)]
    load_balancer_descriptions: Vec<ClassicLoadBalancer>,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetResourcesPage {
    #[serde(default)]
    resource_tag_mapping_list: Vec<TaggedResource>,
    #[serde(default)]
    pagination_token: Option<String>,
}

fn more(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

/// AWS API client
#[derive(Debug, Clone)]
pub struct EksClient {
    http: HttpClient,
}

impl EksClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `endpoint` - Signing endpoint base URL (e.g., "http://aws-signer:8080")
    /// * `region` - AWS region requests are signed for
    /// * `timeout` - Per-request timeout
    pub fn new(endpoint: String, region: String, timeout: Duration) -> Result<Self, EksError> {
        let client = Client::builder().timeout(timeout).build().map_err(EksError::Http)?;
        Ok(Self {
            http: HttpClient::new(client, endpoint, region),
        })
    }

    /// Region this client targets
    pub fn region(&self) -> &str {
        self.http.region()
    }

    async fn describe_v2_load_balancers(&self) -> Result<Vec<LoadBalancer>, EksError> {
        let mut all = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let body = match &marker {
                Some(m) => json!({ "Marker": m }),
                None => json!({}),
            };
            let page: V2LoadBalancersPage = self
                .http
                .call(ELBV2, "ElasticLoadBalancingV2.DescribeLoadBalancers", &body)
                .await?;
            all.extend(page.load_balancers.into_iter().map(|lb| LoadBalancer {
                load_balancer_name: lb.load_balancer_name,
                load_balancer_arn: Some(lb.load_balancer_arn),
                dns_name: lb.dns_name,
                kind: LoadBalancerKind::V2,
            }));
            match more(page.next_marker) {
                Some(m) => marker = Some(m),
                None => break,
            }
        }
        Ok(all)
    }

    async fn describe_classic_load_balancers(&self) -> Result<Vec<LoadBalancer>, EksError> {
        let mut all = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let body = match &marker {
                Some(m) => json!({ "Marker": m }),
                None => json!({}),
            };
            let page: ClassicLoadBalancersPage = self
                .http
                .call(ELB, "ElasticLoadBalancing.DescribeLoadBalancers", &body)
                .await?;
            all.extend(page.load_balancer_descriptions.into_iter().map(|lb| LoadBalancer {
                load_balancer_name: lb.load_balancer_name,
                load_balancer_arn: None,
                dns_name: lb.dns_name,
                kind: LoadBalancerKind::Classic,
            }));
            match more(page.next_marker) {
                Some(m) => marker = Some(m),
                None => break,
            }
        }
        Ok(all)
    }
}

#[async_trait::async_trait]
impl EksClientTrait for EksClient {
    fn endpoint(&self) -> &str {
        self.http.base_url()
    }

    async fn validate_connectivity(&self) -> Result<(), EksError> {
        debug!("Validating AWS endpoint connectivity");
        let _: serde_json::Value = self.http.get(EKS, "/clusters?maxResults=1").await?;
        debug!("AWS endpoint reachable");
        Ok(())
    }

    async fn describe_cluster(&self, name: &str) -> Result<Cluster, EksError> {
        let env: ClusterEnvelope = self.http.get(EKS, &format!("/clusters/{}", enc(name))).await?;
        Ok(env.cluster)
    }

    async fn create_cluster(&self, request: &CreateClusterRequest) -> Result<Cluster, EksError> {
        let body = serde_json::to_value(request)?;
        let env: ClusterEnvelope = self
            .http
            .post(EKS, "/clusters", &body)
            .await
            .map_err(EksError::on_create)?;
        Ok(env.cluster)
    }

    async fn update_cluster_version(&self, name: &str, version: &str, client_request_token: Option<&str>) -> Result<Update, EksError> {
        let mut body = json!({ "version": version });
        if let Some(token) = client_request_token {
            body["clientRequestToken"] = json!(token);
        }
        let env: UpdateEnvelope = self
            .http
            .post(EKS, &format!("/clusters/{}/updates", enc(name)), &body)
            .await?;
        Ok(env.update)
    }

    async fn update_cluster_config(&self, name: &str, request: &UpdateClusterConfigRequest) -> Result<Update, EksError> {
        let body = serde_json::to_value(request)?;
        let env: UpdateEnvelope = self
            .http
            .post(EKS, &format!("/clusters/{}/update-config", enc(name)), &body)
            .await?;
        Ok(env.update)
    }

    async fn delete_cluster(&self, name: &str) -> Result<Cluster, EksError> {
        let env: ClusterEnvelope = self.http.delete(EKS, &format!("/clusters/{}", enc(name))).await?;
        Ok(env.cluster)
    }

    async fn tag_resource(&self, resource_arn: &str, tags: &TagMap) -> Result<(), EksError> {
        let body = json!({ "tags": tags });
        let _: serde_json::Value = self
            .http
            .post(EKS, &format!("/tags/{}", enc(resource_arn)), &body)
            .await?;
        Ok(())
    }

    async fn list_addons(&self, cluster: &str) -> Result<Vec<String>, EksError> {
        self.http
            .fetch_all_pages(EKS, &format!("/clusters/{}/addons", enc(cluster)), "addons")
            .await
    }

    async fn describe_addon(&self, cluster: &str, addon: &str) -> Result<Addon, EksError> {
        let env: AddonEnvelope = self
            .http
            .get(EKS, &format!("/clusters/{}/addons/{}", enc(cluster), enc(addon)))
            .await?;
        Ok(env.addon)
    }

    async fn create_addon(&self, cluster: &str, request: &CreateAddonRequest) -> Result<Addon, EksError> {
        let body = serde_json::to_value(request)?;
        let env: AddonEnvelope = self
            .http
            .post(EKS, &format!("/clusters/{}/addons", enc(cluster)), &body)
            .await
            .map_err(EksError::on_create)?;
        Ok(env.addon)
    }

    async fn update_addon(&self, cluster: &str, addon: &str, request: &UpdateAddonRequest) -> Result<Update, EksError> {
        let body = serde_json::to_value(request)?;
        let env: UpdateEnvelope = self
            .http
            .post(EKS, &format!("/clusters/{}/addons/{}/update", enc(cluster), enc(addon)), &body)
            .await?;
        Ok(env.update)
    }

    async fn delete_addon(&self, cluster: &str, addon: &str) -> Result<Addon, EksError> {
        let env: AddonEnvelope = self
            .http
            .delete(EKS, &format!("/clusters/{}/addons/{}", enc(cluster), enc(addon)))
            .await?;
        Ok(env.addon)
    }

    async fn list_access_entries(&self, cluster: &str) -> Result<Vec<String>, EksError> {
        self.http
            .fetch_all_pages(EKS, &format!("/clusters/{}/access-entries", enc(cluster)), "accessEntries")
            .await
    }

    async fn describe_access_entry(&self, cluster: &str, principal_arn: &str) -> Result<AccessEntry, EksError> {
        let env: AccessEntryEnvelope = self
            .http
            .get(EKS, &format!("/clusters/{}/access-entries/{}", enc(cluster), enc(principal_arn)))
            .await?;
        Ok(env.access_entry)
    }

    async fn create_access_entry(&self, cluster: &str, request: &CreateAccessEntryRequest) -> Result<AccessEntry, EksError> {
        let body = serde_json::to_value(request)?;
        let env: AccessEntryEnvelope = self
            .http
            .post(EKS, &format!("/clusters/{}/access-entries", enc(cluster)), &body)
            .await
            .map_err(EksError::on_create)?;
        Ok(env.access_entry)
    }

    async fn update_access_entry(&self, cluster: &str, principal_arn: &str, request: &UpdateAccessEntryRequest) -> Result<AccessEntry, EksError> {
        let body = serde_json::to_value(request)?;
        let env: AccessEntryEnvelope = self
            .http
            .post(EKS, &format!("/clusters/{}/access-entries/{}", enc(cluster), enc(principal_arn)), &body)
            .await?;
        Ok(env.access_entry)
    }

    async fn delete_access_entry(&self, cluster: &str, principal_arn: &str) -> Result<(), EksError> {
        let _: serde_json::Value = self
            .http
            .delete(EKS, &format!("/clusters/{}/access-entries/{}", enc(cluster), enc(principal_arn)))
            .await?;
        Ok(())
    }

    async fn list_associated_access_policies(&self, cluster: &str, principal_arn: &str) -> Result<Vec<AssociatedAccessPolicy>, EksError> {
        let base = format!("/clusters/{}/access-entries/{}/access-policies", enc(cluster), enc(principal_arn));
        let mut all = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let path = match &token {
                Some(t) => format!("{base}?nextToken={}", enc(t)),
                None => base.clone(),
            };
            let page: AccessPoliciesPage = self.http.get(EKS, &path).await?;
            all.extend(page.associated_access_policies);
            match more(page.next_token) {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        Ok(all)
    }

    async fn associate_access_policy(&self, cluster: &str, principal_arn: &str, policy: &AssociatedAccessPolicy) -> Result<(), EksError> {
        let body = serde_json::to_value(policy)?;
        let _: serde_json::Value = self
            .http
            .post(
                EKS,
                &format!("/clusters/{}/access-entries/{}/access-policies", enc(cluster), enc(principal_arn)),
                &body,
            )
            .await?;
        Ok(())
    }

    async fn disassociate_access_policy(&self, cluster: &str, principal_arn: &str, policy_arn: &str) -> Result<(), EksError> {
        let _: serde_json::Value = self
            .http
            .delete(
                EKS,
                &format!(
                    "/clusters/{}/access-entries/{}/access-policies/{}",
                    enc(cluster),
                    enc(principal_arn),
                    enc(policy_arn)
                ),
            )
            .await?;
        Ok(())
    }

    async fn list_nodegroups(&self, cluster: &str) -> Result<Vec<String>, EksError> {
        self.http
            .fetch_all_pages(EKS, &format!("/clusters/{}/node-groups", enc(cluster)), "nodegroups")
            .await
    }

    async fn describe_nodegroup(&self, cluster: &str, nodegroup: &str) -> Result<Nodegroup, EksError> {
        let env: NodegroupEnvelope = self
            .http
            .get(EKS, &format!("/clusters/{}/node-groups/{}", enc(cluster), enc(nodegroup)))
            .await?;
        Ok(env.nodegroup)
    }

    async fn delete_nodegroup(&self, cluster: &str, nodegroup: &str) -> Result<Nodegroup, EksError> {
        let env: NodegroupEnvelope = self
            .http
            .delete(EKS, &format!("/clusters/{}/node-groups/{}", enc(cluster), enc(nodegroup)))
            .await?;
        Ok(env.nodegroup)
    }

    async fn describe_role(&self, role_name: &str) -> Result<Role, EksError> {
        let resp: GetRoleResponse = self
            .http
            .call(IAM, "AWSIdentityManagementV20100508.GetRole", &json!({ "RoleName": role_name }))
            .await?;
        Ok(resp.role)
    }

    async fn describe_load_balancers(&self) -> Result<Vec<LoadBalancer>, EksError> {
        let mut all = self.describe_v2_load_balancers().await?;
        all.extend(self.describe_classic_load_balancers().await?);
        Ok(all)
    }

    async fn delete_load_balancer(&self, target: &LoadBalancerRef) -> Result<(), EksError> {
        let _: serde_json::Value = match target {
            LoadBalancerRef::V2 { arn } => {
                self.http
                    .call(ELBV2, "ElasticLoadBalancingV2.DeleteLoadBalancer", &json!({ "LoadBalancerArn": arn }))
                    .await?
            }
            LoadBalancerRef::Classic { name } => {
                self.http
                    .call(ELB, "ElasticLoadBalancing.DeleteLoadBalancer", &json!({ "LoadBalancerName": name }))
                    .await?
            }
        };
        Ok(())
    }

    async fn delete_target_group(&self, arn: &str) -> Result<(), EksError> {
        let _: serde_json::Value = self
            .http
            .call(ELBV2, "ElasticLoadBalancingV2.DeleteTargetGroup", &json!({ "TargetGroupArn": arn }))
            .await?;
        Ok(())
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<(), EksError> {
        let _: serde_json::Value = self
            .http
            .call(EC2, "AmazonEC2.DeleteSecurityGroup", &json!({ "GroupId": group_id }))
            .await?;
        Ok(())
    }

    async fn get_resources_by_tag(&self, filters: &[TagFilter]) -> Result<Vec<TaggedResource>, EksError> {
        let mut all = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut body = json!({ "TagFilters": filters });
            if let Some(t) = &token {
                body["PaginationToken"] = json!(t);
            }
            let page: GetResourcesPage = self
                .http
                .call(TAGGING, "ResourceGroupsTaggingAPI_20170126.GetResources", &body)
                .await?;
            all.extend(page.resource_tag_mapping_list);
            match more(page.pagination_token) {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        Ok(all)
    }
}
