//! Direct garbage collection.
//!
//! Uses the hostnames the workload cluster reports for its `LoadBalancer`
//! Services and deletes the load balancers whose DNS name matches. The workload
//! API must still be reachable, so this runs before the cluster is deleted.

use super::{GcError, GcReport, GcSettings, delete_with_retry};
use eks_client::EksClientTrait;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Delete the load balancers serving `hostnames`.
pub async fn collect(eks: &dyn EksClientTrait, hostnames: &[String], settings: &GcSettings) -> Result<GcReport, GcError> {
    let mut report = GcReport::default();
    if hostnames.is_empty() {
        debug!("No LoadBalancer Services in the workload cluster");
        return Ok(report);
    }

    let wanted: BTreeSet<String> = hostnames.iter().map(|h| h.to_ascii_lowercase()).collect();
    let load_balancers = eks.describe_load_balancers().await?;
    let matched: Vec<_> = load_balancers
        .iter()
        .filter(|lb| {
            lb.dns_name
                .as_deref()
                .is_some_and(|dns| wanted.contains(&dns.to_ascii_lowercase()))
        })
        .collect();

    let found: BTreeSet<String> = matched
        .iter()
        .filter_map(|lb| lb.dns_name.as_deref().map(str::to_ascii_lowercase))
        .collect();
    report.skipped = wanted.difference(&found).cloned().collect();
    for hostname in &report.skipped {
        debug!("No load balancer found for {}", hostname);
    }

    let mut surviving = Vec::new();
    for lb in matched {
        let target = lb.reference();
        let id = target.to_string();
        match delete_with_retry(settings, &id, || eks.delete_load_balancer(&target)).await {
            Ok(()) => {
                info!("Deleted load balancer {} ({})", lb.load_balancer_name, id);
                report.deleted.push(id);
            }
            Err(e) => {
                warn!("Failed to delete load balancer {}: {}", id, e);
                surviving.push(id);
            }
        }
    }

    if surviving.is_empty() {
        Ok(report)
    } else {
        Err(GcError::Partial { surviving })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eks_client::{LoadBalancerKind, MockEksClient, TagMap};

    async fn hostnames(mock: &MockEksClient, names: &[&str]) -> Vec<String> {
        mock.describe_load_balancers()
            .await
            .unwrap()
            .into_iter()
            .filter(|lb| names.contains(&lb.load_balancer_name.as_str()))
            .filter_map(|lb| lb.dns_name)
            .collect()
    }

    #[tokio::test]
    async fn test_direct_deletes_service_load_balancers() {
        let mock = MockEksClient::new("http://mock");
        mock.add_load_balancer("podinfo-nlb", LoadBalancerKind::V2, TagMap::new());
        mock.add_load_balancer("podinfo-elb", LoadBalancerKind::Classic, TagMap::new());
        mock.add_load_balancer("unrelated", LoadBalancerKind::V2, TagMap::new());

        let mut services = hostnames(&mock, &["podinfo-nlb", "podinfo-elb"]).await;
        services.push("gone.elb.us-west-2.amazonaws.com".to_string());
        services[0] = services[0].to_uppercase();

        let report = collect(&mock, &services, &GcSettings::new(3)).await.unwrap();
        assert_eq!(report.deleted.len(), 2);
        assert!(report.deleted.contains(&"podinfo-elb".to_string()));
        assert_eq!(report.skipped, vec!["gone.elb.us-west-2.amazonaws.com".to_string()]);
        assert_eq!(mock.load_balancer_names(), vec!["unrelated"]);

        // Second pass has nothing left to match
        let report = collect(&mock, &services, &GcSettings::new(3)).await.unwrap();
        assert!(report.deleted.is_empty());
    }

    #[tokio::test]
    async fn test_no_services_makes_no_calls() {
        let mock = MockEksClient::new("http://mock");
        let report = collect(&mock, &[], &GcSettings::default()).await.unwrap();
        assert_eq!(report, GcReport::default());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_reports_survivors() {
        let mock = MockEksClient::new("http://mock");
        let arn = mock.add_load_balancer("podinfo-nlb", LoadBalancerKind::V2, TagMap::new());
        mock.set_in_use(&arn, 5);
        let services = hostnames(&mock, &["podinfo-nlb"]).await;

        let err = collect(&mock, &services, &GcSettings::new(2)).await.unwrap_err();
        assert_eq!(err.surviving(), [arn]);
    }
}
