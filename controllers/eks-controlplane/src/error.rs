//! Controller-specific error types.
//!
//! Upstream errors (kube, the AWS gateway, garbage collection, the webhook
//! server) are wrapped here so the watcher can decide between backoff and
//! suspension from a single type.

use crate::admission::server::WebhookError;
use crate::gc::GcError;
use eks_client::EksError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the EKS control plane controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// AWS API error
    #[error("AWS error: {0}")]
    Eks(#[from] EksError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// A failure that retrying cannot fix; the object is suspended until its spec changes
    #[error("{0}")]
    NonRetryable(String),

    /// A cluster with the requested name exists but carries no ownership tag for it
    #[error("EKS cluster {0} already exists and is not owned by this control plane")]
    NotOwned(String),

    /// External resource garbage collection failed
    #[error("Garbage collection failed: {0}")]
    Gc(#[from] GcError),

    /// Reading or writing the control plane object failed
    #[error("Store error: {0}")]
    Store(String),

    /// Reaching the workload cluster failed
    #[error("Workload cluster error: {0}")]
    Workload(String),

    /// Admission webhook server failed
    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),
}

impl ControllerError {
    /// Whether the failure should move the object to `Failed` instead of being retried.
    pub fn is_non_retryable(&self) -> bool {
        match self {
            ControllerError::NonRetryable(_) | ControllerError::NotOwned(_) => true,
            ControllerError::Eks(e) => e.is_non_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_retryable_classification() {
        assert!(ControllerError::NonRetryable("bad subnets".to_string()).is_non_retryable());
        assert!(ControllerError::NotOwned("team-a_prod".to_string()).is_non_retryable());
        assert!(ControllerError::Eks(EksError::NonRetryable {
            code: "InvalidParameterException".to_string(),
            message: "role is invalid".to_string(),
        })
        .is_non_retryable());
        assert!(!ControllerError::Eks(EksError::Throttling("slow down".to_string())).is_non_retryable());
        assert!(!ControllerError::Eks(EksError::Authentication("ExpiredToken".to_string())).is_non_retryable());
        assert!(!ControllerError::Store("conflict".to_string()).is_non_retryable());
    }

    #[test]
    fn test_non_retryable_message_is_verbatim() {
        let err = ControllerError::NonRetryable("EKS cluster in unexpected FAILED state".to_string());
        assert_eq!(err.to_string(), "EKS cluster in unexpected FAILED state");
    }
}
