//! Shared rate limiting
//!
//! One token bucket fronts every remote call the process makes, whichever
//! reconciliation or garbage collection pass issues it.

use crate::error::EksError;
use crate::eks_trait::EksClientTrait;
use crate::models::*;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token bucket with a burst of one.
#[derive(Debug)]
pub struct TokenBucket {
    interval: Duration,
    next_free: Mutex<Option<Instant>>,
}

impl TokenBucket {
    /// Bucket refilling `per_second` tokens per second.
    pub fn new(per_second: u32) -> Self {
        let per_second = per_second.max(1);
        Self {
            interval: Duration::from_secs(1) / per_second,
            next_free: Mutex::new(None),
        }
    }

    /// Time between tokens.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for a token.
    pub async fn acquire(&self) {
        let wait_until = {
            let mut next_free = self.next_free.lock().await;
            let now = Instant::now();
            let slot = match *next_free {
                Some(t) if t > now => t,
                _ => now,
            };
            *next_free = Some(slot + self.interval);
            slot
        };
        tokio::time::sleep_until(wait_until).await;
    }
}

/// Gateway wrapper that takes one token per remote call.
#[derive(Debug)]
pub struct RateLimitedClient<C> {
    inner: C,
    bucket: TokenBucket,
}

impl<C: EksClientTrait> RateLimitedClient<C> {
    /// Wrap `inner`, allowing `per_second` calls per second.
    pub fn new(inner: C, per_second: u32) -> Self {
        Self {
            inner,
            bucket: TokenBucket::new(per_second),
        }
    }

    /// The wrapped client
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait::async_trait]
impl<C: EksClientTrait> EksClientTrait for RateLimitedClient<C> {
    fn endpoint(&self) -> &str {
        self.inner.endpoint()
    }

    async fn validate_connectivity(&self) -> Result<(), EksError> {
        self.bucket.acquire().await;
        self.inner.validate_connectivity().await
    }

    async fn describe_cluster(&self, name: &str) -> Result<Cluster, EksError> {
        self.bucket.acquire().await;
        self.inner.describe_cluster(name).await
    }

    async fn create_cluster(&self, request: &CreateClusterRequest) -> Result<Cluster, EksError> {
        self.bucket.acquire().await;
        self.inner.create_cluster(request).await
    }

    async fn update_cluster_version(&self, name: &str, version: &str, client_request_token: Option<&str>) -> Result<Update, EksError> {
        self.bucket.acquire().await;
        self.inner.update_cluster_version(name, version, client_request_token).await
    }

    async fn update_cluster_config(&self, name: &str, request: &UpdateClusterConfigRequest) -> Result<Update, EksError> {
        self.bucket.acquire().await;
        self.inner.update_cluster_config(name, request).await
    }

    async fn delete_cluster(&self, name: &str) -> Result<Cluster, EksError> {
        self.bucket.acquire().await;
        self.inner.delete_cluster(name).await
    }

    async fn tag_resource(&self, resource_arn: &str, tags: &TagMap) -> Result<(), EksError> {
        self.bucket.acquire().await;
        self.inner.tag_resource(resource_arn, tags).await
    }

    async fn list_addons(&self, cluster: &str) -> Result<Vec<String>, EksError> {
        self.bucket.acquire().await;
        self.inner.list_addons(cluster).await
    }

    async fn describe_addon(&self, cluster: &str, addon: &str) -> Result<Addon, EksError> {
        self.bucket.acquire().await;
        self.inner.describe_addon(cluster, addon).await
    }

    async fn create_addon(&self, cluster: &str, request: &CreateAddonRequest) -> Result<Addon, EksError> {
        self.bucket.acquire().await;
        self.inner.create_addon(cluster, request).await
    }

    async fn update_addon(&self, cluster: &str, addon: &str, request: &UpdateAddonRequest) -> Result<Update, EksError> {
        self.bucket.acquire().await;
        self.inner.update_addon(cluster, addon, request).await
    }

    async fn delete_addon(&self, cluster: &str, addon: &str) -> Result<Addon, EksError> {
        self.bucket.acquire().await;
        self.inner.delete_addon(cluster, addon).await
    }

    async fn list_access_entries(&self, cluster: &str) -> Result<Vec<String>, EksError> {
        self.bucket.acquire().await;
        self.inner.list_access_entries(cluster).await
    }

    async fn describe_access_entry(&self, cluster: &str, principal_arn: &str) -> Result<AccessEntry, EksError> {
        self.bucket.acquire().await;
        self.inner.describe_access_entry(cluster, principal_arn).await
    }

    async fn create_access_entry(&self, cluster: &str, request: &CreateAccessEntryRequest) -> Result<AccessEntry, EksError> {
        self.bucket.acquire().await;
        self.inner.create_access_entry(cluster, request).await
    }

    async fn update_access_entry(&self, cluster: &str, principal_arn: &str, request: &UpdateAccessEntryRequest) -> Result<AccessEntry, EksError> {
        self.bucket.acquire().await;
        self.inner.update_access_entry(cluster, principal_arn, request).await
    }

    async fn delete_access_entry(&self, cluster: &str, principal_arn: &str) -> Result<(), EksError> {
        self.bucket.acquire().await;
        self.inner.delete_access_entry(cluster, principal_arn).await
    }

    async fn list_associated_access_policies(&self, cluster: &str, principal_arn: &str) -> Result<Vec<AssociatedAccessPolicy>, EksError> {
        self.bucket.acquire().await;
        self.inner.list_associated_access_policies(cluster, principal_arn).await
    }

    async fn associate_access_policy(&self, cluster: &str, principal_arn: &str, policy: &AssociatedAccessPolicy) -> Result<(), EksError> {
        self.bucket.acquire().await;
        self.inner.associate_access_policy(cluster, principal_arn, policy).await
    }

    async fn disassociate_access_policy(&self, cluster: &str, principal_arn: &str, policy_arn: &str) -> Result<(), EksError> {
        self.bucket.acquire().await;
        self.inner.disassociate_access_policy(cluster, principal_arn, policy_arn).await
    }

    async fn list_nodegroups(&self, cluster: &str) -> Result<Vec<String>, EksError> {
        self.bucket.acquire().await;
        self.inner.list_nodegroups(cluster).await
    }

    async fn describe_nodegroup(&self, cluster: &str, nodegroup: &str) -> Result<Nodegroup, EksError> {
        self.bucket.acquire().await;
        self.inner.describe_nodegroup(cluster, nodegroup).await
    }

    async fn delete_nodegroup(&self, cluster: &str, nodegroup: &str) -> Result<Nodegroup, EksError> {
        self.bucket.acquire().await;
        self.inner.delete_nodegroup(cluster, nodegroup).await
    }

    async fn describe_role(&self, role_name: &str) -> Result<Role, EksError> {
        self.bucket.acquire().await;
        self.inner.describe_role(role_name).await
    }

    async fn describe_load_balancers(&self) -> Result<Vec<LoadBalancer>, EksError> {
        self.bucket.acquire().await;
        self.inner.describe_load_balancers().await
    }

    async fn delete_load_balancer(&self, target: &LoadBalancerRef) -> Result<(), EksError> {
        self.bucket.acquire().await;
        self.inner.delete_load_balancer(target).await
    }

    async fn delete_target_group(&self, arn: &str) -> Result<(), EksError> {
        self.bucket.acquire().await;
        self.inner.delete_target_group(arn).await
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<(), EksError> {
        self.bucket.acquire().await;
        self.inner.delete_security_group(group_id).await
    }

    async fn get_resources_by_tag(&self, filters: &[TagFilter]) -> Result<Vec<TaggedResource>, EksError> {
        self.bucket.acquire().await;
        self.inner.get_resources_by_tag(filters).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_token_is_immediate() {
        let bucket = TokenBucket::new(10);
        let start = Instant::now();
        bucket.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_are_paced() {
        let bucket = TokenBucket::new(10);
        let start = Instant::now();
        for _ in 0..5 {
            bucket.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(400));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_is_shared_across_tasks() {
        let bucket = Arc::new(TokenBucket::new(4));
        let start = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let bucket = Arc::clone(&bucket);
                tokio::spawn(async move { bucket.acquire().await })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_time_does_not_accumulate_burst() {
        let bucket = TokenBucket::new(10);
        bucket.acquire().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        let start = Instant::now();
        bucket.acquire().await;
        bucket.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
