//! Tag-sweep garbage collection.
//!
//! Enumerates resources tagged `kubernetes.io/cluster/<name>=owned` through the
//! tagging API, keeps the ones a workload created (they carry
//! `kubernetes.io/service-name`) and deletes them: load balancers first, then
//! target groups, then security groups.

use super::{GcError, GcReport, GcSettings, delete_with_retry};
use crds::tags::{EKS_CLUSTER_NAME_TAG_KEY, SERVICE_NAME_TAG_KEY, cluster_aws_cloud_provider_tag_key};
use crds::ResourceLifecycle;
use eks_client::{Arn, EksClientTrait, LoadBalancerRef, ResourceKind, TagFilter, TaggedResource};
use tracing::{debug, info, warn};

/// Candidates grouped by delete call, in delete order.
#[derive(Debug, Default, PartialEq, Eq)]
struct Candidates {
    load_balancers: Vec<LoadBalancerRef>,
    target_groups: Vec<String>,
    security_groups: Vec<String>,
    skipped: Vec<String>,
}

fn classify(resources: &[TaggedResource], cluster_name: &str) -> Candidates {
    let key = cluster_aws_cloud_provider_tag_key(cluster_name);
    let mut candidates = Candidates::default();

    for resource in resources {
        let arn = &resource.resource_arn;
        if resource.tags.get(&key).map(String::as_str) != Some(ResourceLifecycle::Owned.as_str()) {
            debug!("{} is not owned by {}, skipping", arn, cluster_name);
            candidates.skipped.push(arn.clone());
            continue;
        }
        if !resource.tags.contains_key(SERVICE_NAME_TAG_KEY) {
            debug!("{} was not created for a Service, skipping", arn);
            candidates.skipped.push(arn.clone());
            continue;
        }
        let Some(parsed) = Arn::parse(arn) else {
            warn!("Unparseable ARN {} returned by the tagging API", arn);
            candidates.skipped.push(arn.clone());
            continue;
        };

        match parsed.kind() {
            ResourceKind::LoadBalancerV2 => candidates.load_balancers.push(LoadBalancerRef::V2 { arn: arn.clone() }),
            ResourceKind::ClassicLoadBalancer { name } => candidates.load_balancers.push(LoadBalancerRef::Classic { name }),
            ResourceKind::TargetGroup => candidates.target_groups.push(arn.clone()),
            ResourceKind::SecurityGroup { id } => {
                if resource.tags.contains_key(EKS_CLUSTER_NAME_TAG_KEY) {
                    debug!("{} is managed by EKS, skipping", id);
                    candidates.skipped.push(id);
                } else {
                    candidates.security_groups.push(id);
                }
            }
            ResourceKind::Other { resource_type } => {
                debug!("No cleanup for {} resources, skipping {}", resource_type, arn);
                candidates.skipped.push(arn.clone());
            }
        }
    }
    candidates
}

/// Delete every workload-created resource tagged as owned by `cluster_name`.
pub async fn collect(
    eks: &dyn EksClientTrait,
    cluster_name: &str,
    settings: &GcSettings,
) -> Result<GcReport, GcError> {
    let filters = [TagFilter {
        key: cluster_aws_cloud_provider_tag_key(cluster_name),
        values: vec![ResourceLifecycle::Owned.as_str().to_string()],
    }];
    let resources = eks.get_resources_by_tag(&filters).await?;
    let candidates = classify(&resources, cluster_name);

    let mut report = GcReport {
        skipped: candidates.skipped,
        ..Default::default()
    };
    let mut surviving = Vec::new();

    for lb in &candidates.load_balancers {
        let id = lb.to_string();
        match delete_with_retry(settings, &id, || eks.delete_load_balancer(lb)).await {
            Ok(()) => report.deleted.push(id),
            Err(e) => {
                warn!("Failed to delete load balancer {}: {}", id, e);
                surviving.push(id);
            }
        }
    }
    for arn in &candidates.target_groups {
        match delete_with_retry(settings, arn, || eks.delete_target_group(arn)).await {
            Ok(()) => report.deleted.push(arn.clone()),
            Err(e) => {
                warn!("Failed to delete target group {}: {}", arn, e);
                surviving.push(arn.clone());
            }
        }
    }
    for id in &candidates.security_groups {
        match delete_with_retry(settings, id, || eks.delete_security_group(id)).await {
            Ok(()) => report.deleted.push(id.clone()),
            Err(e) => {
                warn!("Failed to delete security group {}: {}", id, e);
                surviving.push(id.clone());
            }
        }
    }

    if surviving.is_empty() {
        if !report.deleted.is_empty() {
            info!("Deleted {} external resource(s) of cluster {}", report.deleted.len(), cluster_name);
        }
        Ok(report)
    } else {
        Err(GcError::Partial { surviving })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eks_client::{LoadBalancerKind, MockEksClient, TagMap};

    const CLUSTER: &str = "team-a_prod";

    fn workload_tags(cluster: &str, service: &str) -> TagMap {
        [
            (cluster_aws_cloud_provider_tag_key(cluster), "owned".to_string()),
            (SERVICE_NAME_TAG_KEY.to_string(), service.to_string()),
        ]
        .into()
    }

    fn settings() -> GcSettings {
        GcSettings::new(3)
    }

    /// podinfo exposed through an NLB and a classic ELB, plus resources that must survive.
    fn seed(mock: &MockEksClient) -> (String, String) {
        mock.add_load_balancer("podinfo-nlb", LoadBalancerKind::V2, workload_tags(CLUSTER, "default/podinfo-nlb"));
        mock.add_load_balancer("podinfo-elb", LoadBalancerKind::Classic, workload_tags(CLUSTER, "default/podinfo-elb"));
        let tg = mock.add_target_group("k8s-default-podinfo", workload_tags(CLUSTER, "default/podinfo-nlb"));
        mock.add_security_group("sg-0elb", workload_tags(CLUSTER, "default/podinfo-elb"));

        let mut eks_managed = workload_tags(CLUSTER, "default/podinfo-elb");
        eks_managed.insert(EKS_CLUSTER_NAME_TAG_KEY.to_string(), CLUSTER.to_string());
        mock.add_security_group("sg-0eks", eks_managed);

        let mut shared = workload_tags(CLUSTER, "default/ingress");
        shared.insert(cluster_aws_cloud_provider_tag_key(CLUSTER), "shared".to_string());
        mock.add_load_balancer("shared-ingress", LoadBalancerKind::V2, shared);
        mock.add_load_balancer("other-cluster", LoadBalancerKind::V2, workload_tags("team-a_prod-eu", "default/web"));
        let manual: TagMap = [(cluster_aws_cloud_provider_tag_key(CLUSTER), "owned".to_string())].into();
        mock.add_load_balancer("hand-made", LoadBalancerKind::V2, manual);
        (tg, "sg-0elb".to_string())
    }

    #[tokio::test]
    async fn test_sweep_converges() {
        let mock = MockEksClient::new("http://mock");
        let (tg, sg) = seed(&mock);

        let report = collect(&mock, CLUSTER, &settings()).await.unwrap();
        assert_eq!(report.deleted.len(), 4);
        assert!(report.deleted.contains(&"podinfo-elb".to_string()));
        assert!(report.skipped.contains(&"sg-0eks".to_string()));

        assert_eq!(mock.load_balancer_names(), vec!["hand-made", "other-cluster", "shared-ingress"]);
        assert!(!mock.has_target_group(&tg));
        assert!(!mock.has_security_group(&sg));
        assert!(mock.has_security_group("sg-0eks"));

        // Nothing workload-created is left for this cluster
        let filters = [TagFilter {
            key: cluster_aws_cloud_provider_tag_key(CLUSTER),
            values: vec!["owned".to_string()],
        }];
        let remaining = mock.get_resources_by_tag(&filters).await.unwrap();
        assert!(remaining.iter().all(|r| {
            !r.tags.contains_key(SERVICE_NAME_TAG_KEY)
                || !r.resource_arn.contains(":loadbalancer/")
        }));
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let mock = MockEksClient::new("http://mock");
        seed(&mock);
        collect(&mock, CLUSTER, &settings()).await.unwrap();
        let deletes_before = mock.call_count("delete_load_balancer");

        let report = collect(&mock, CLUSTER, &settings()).await.unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(mock.call_count("delete_load_balancer"), deletes_before);
    }

    #[tokio::test]
    async fn test_delete_order() {
        let mock = MockEksClient::new("http://mock");
        seed(&mock);
        collect(&mock, CLUSTER, &settings()).await.unwrap();

        let deletes: Vec<String> = mock
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("delete_"))
            .map(|c| c.split(':').next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            deletes,
            vec!["delete_load_balancer", "delete_load_balancer", "delete_target_group", "delete_security_group"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_use_security_group_is_retried() {
        let mock = MockEksClient::new("http://mock");
        let (_, sg) = seed(&mock);
        mock.set_in_use(&sg, 2);

        collect(&mock, CLUSTER, &settings()).await.unwrap();
        assert!(!mock.has_security_group(&sg));
        assert_eq!(mock.call_count("delete_security_group"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_keeps_going() {
        let mock = MockEksClient::new("http://mock");
        let (tg, sg) = seed(&mock);
        mock.set_in_use("podinfo-elb", 10);

        let err = collect(&mock, CLUSTER, &settings()).await.unwrap_err();
        assert_eq!(err.surviving(), ["podinfo-elb".to_string()]);
        assert_eq!(mock.call_count("delete_load_balancer"), 1 + 3);
        assert!(!mock.has_target_group(&tg));
        assert!(!mock.has_security_group(&sg));
        assert_eq!(mock.load_balancer_names(), vec!["hand-made", "other-cluster", "podinfo-elb", "shared-ingress"]);
    }

    #[test]
    fn test_classify_requires_exact_owner() {
        let resources = vec![TaggedResource {
            resource_arn: "arn:aws:elasticloadbalancing:us-west-2:123:loadbalancer/net/web/1".to_string(),
            tags: workload_tags("team-a_prod-eu", "default/web"),
        }];
        let candidates = classify(&resources, CLUSTER);
        assert!(candidates.load_balancers.is_empty());
        assert_eq!(candidates.skipped.len(), 1);
    }
}
