//! External resource garbage collection.
//!
//! Workloads in the managed cluster create cloud resources (load balancers for
//! `LoadBalancer` Services, their target groups and security groups) that
//! deleting the cluster does not remove. Two strategies find them:
//!
//! - `direct`: match the Service hostnames reported by the workload cluster
//!   against load balancer DNS names. Runs before the cluster is deleted.
//! - `tag_sweep`: enumerate everything tagged as owned by the cluster through
//!   the tagging API. Runs after the cluster is gone.
//!
//! Both keep going past individual failures and report every survivor.

pub mod direct;
pub mod tag_sweep;

use crate::backoff::FibonacciBackoff;
use eks_client::EksError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Garbage collection errors
#[derive(Debug, Error)]
pub enum GcError {
    /// Some candidates could not be deleted
    #[error("{} resource(s) could not be deleted: {}", .surviving.len(), .surviving.join(", "))]
    Partial {
        /// Identifiers of the resources that remain
        surviving: Vec<String>,
    },

    /// Enumerating candidates failed
    #[error("listing candidates failed: {0}")]
    List(#[from] EksError),
}

impl GcError {
    /// Identifiers left behind by a partial collection.
    pub fn surviving(&self) -> &[String] {
        match self {
            GcError::Partial { surviving } => surviving,
            GcError::List(_) => &[],
        }
    }
}

/// What a collection pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Resources deleted, or already gone, by identifier
    pub deleted: Vec<String>,
    /// Candidates left alone on purpose
    pub skipped: Vec<String>,
}

/// Retry bounds for deletes that hit a dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcSettings {
    /// Attempts per resource, including the first
    pub max_attempts: u32,
    /// First retry delay
    pub min_delay: Duration,
    /// Largest retry delay
    pub max_delay: Duration,
}

impl GcSettings {
    /// Settings with second-scale delays.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl Default for GcSettings {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Run `delete` until it succeeds, retrying while the resource is in use.
///
/// `NotFound` counts as success. Any other error, or running out of attempts,
/// is returned.
pub(crate) async fn delete_with_retry<F, Fut>(settings: &GcSettings, id: &str, mut delete: F) -> Result<(), EksError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), EksError>>,
{
    let mut attempt = 0;
    loop {
        match delete().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("{} already deleted", id);
                return Ok(());
            }
            Err(e) if e.is_resource_in_use() && attempt + 1 < settings.max_attempts => {
                let delay = FibonacciBackoff::for_attempt(attempt, settings.min_delay, settings.max_delay);
                debug!("{} still in use, retrying in {:?} (attempt {}/{})", id, delay, attempt + 1, settings.max_attempts);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
