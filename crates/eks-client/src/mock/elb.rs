//! ELB and EC2 operations for MockEksClient
//!
//! Deletes honour injected `ResourceInUse` failures so dependency ordering and
//! retry paths can be exercised.

use super::{MockEksClient, lock};
use crate::error::EksError;
use crate::models::*;

pub fn describe_load_balancers(client: &MockEksClient) -> Result<Vec<LoadBalancer>, EksError> {
    client.record("describe_load_balancers", "")?;
    let mut lbs: Vec<LoadBalancer> = lock(&client.load_balancers).values().map(|l| l.lb.clone()).collect();
    lbs.sort_by(|a, b| a.load_balancer_name.cmp(&b.load_balancer_name));
    Ok(lbs)
}

pub fn delete_load_balancer(client: &MockEksClient, target: &LoadBalancerRef) -> Result<(), EksError> {
    client.record("delete_load_balancer", &target.to_string())?;
    client.check_in_use(&target.to_string())?;

    let mut lbs = lock(&client.load_balancers);
    let key = match target {
        LoadBalancerRef::V2 { arn } => lbs
            .get(arn)
            .filter(|l| l.lb.kind == LoadBalancerKind::V2)
            .map(|l| l.arn.clone()),
        LoadBalancerRef::Classic { name } => lbs
            .values()
            .find(|l| l.lb.kind == LoadBalancerKind::Classic && &l.lb.load_balancer_name == name)
            .map(|l| l.arn.clone()),
    };
    match key {
        Some(k) => {
            lbs.remove(&k);
            Ok(())
        }
        None => Err(EksError::NotFound(format!("Load balancer '{target}' not found"))),
    }
}

pub fn delete_target_group(client: &MockEksClient, arn: &str) -> Result<(), EksError> {
    client.record("delete_target_group", arn)?;
    client.check_in_use(arn)?;
    lock(&client.target_groups)
        .remove(arn)
        .map(|_| ())
        .ok_or_else(|| EksError::NotFound(format!("Target groups '{arn}' not found")))
}

pub fn delete_security_group(client: &MockEksClient, group_id: &str) -> Result<(), EksError> {
    client.record("delete_security_group", group_id)?;
    client.check_in_use(group_id)?;
    lock(&client.security_groups)
        .remove(group_id)
        .map(|_| ())
        .ok_or_else(|| EksError::NotFound(format!("The security group '{group_id}' does not exist")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eks_trait::EksClientTrait;

    #[tokio::test]
    async fn test_delete_by_arn_and_by_name() {
        let mock = MockEksClient::new("http://mock");
        let nlb = mock.add_load_balancer("podinfo-nlb", LoadBalancerKind::V2, TagMap::new());
        mock.add_load_balancer("podinfo-elb", LoadBalancerKind::Classic, TagMap::new());
        assert_eq!(mock.describe_load_balancers().await.unwrap().len(), 2);

        mock.delete_load_balancer(&LoadBalancerRef::V2 { arn: nlb }).await.unwrap();
        mock.delete_load_balancer(&LoadBalancerRef::Classic { name: "podinfo-elb".to_string() })
            .await
            .unwrap();
        assert!(mock.load_balancer_names().is_empty());

        let err = mock
            .delete_load_balancer(&LoadBalancerRef::Classic { name: "podinfo-elb".to_string() })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_in_use_then_succeeds() {
        let mock = MockEksClient::new("http://mock");
        mock.add_security_group("sg-1", TagMap::new());
        mock.set_in_use("sg-1", 2);
        assert!(mock.delete_security_group("sg-1").await.unwrap_err().is_resource_in_use());
        assert!(mock.delete_security_group("sg-1").await.unwrap_err().is_resource_in_use());
        mock.delete_security_group("sg-1").await.unwrap();
        assert!(!mock.has_security_group("sg-1"));
    }
}
