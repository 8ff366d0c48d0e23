//! Gateway errors
//!
//! Remote failures are classified once, at the HTTP boundary, so callers only
//! ever branch on the variant or one of the `is_*` helpers.

use thiserror::Error;

/// Errors that can occur when calling the AWS APIs
#[derive(Debug, Error)]
pub enum EksError {
    /// Request rate exceeded
    #[error("Throttled: {0}")]
    Throttling(String),

    /// Service side failure (5xx)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Request did not complete in time; outcome unknown
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Create conflicted with an existing resource
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Resource is busy or has dependents
    #[error("Resource in use: {0}")]
    ResourceInUse(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request rejected; retrying the same request will not help
    #[error("{code}: {message}")]
    NonRetryable {
        /// AWS error code, e.g. "InvalidParameterException"
        code: String,
        /// Message returned by the service
        message: String,
    },

    /// Credentials rejected (401/403)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Transport error
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for EksError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EksError::Timeout(e.to_string())
        } else {
            EksError::Http(e)
        }
    }
}

impl EksError {
    /// Worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EksError::Throttling(_)
                | EksError::Unavailable(_)
                | EksError::Timeout(_)
                | EksError::Http(_)
                | EksError::Authentication(_)
        )
    }

    /// The resource already exists; treat as success and re-read.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EksError::AlreadyExists(_))
    }

    /// The resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EksError::NotFound(_))
    }

    /// The resource is busy or still has dependents.
    pub fn is_resource_in_use(&self) -> bool {
        matches!(self, EksError::ResourceInUse(_))
    }

    /// The request can never succeed as issued.
    ///
    /// Rejected credentials are not included: they recover on rotation without
    /// any change to the request.
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, EksError::NonRetryable { .. })
    }

    /// Reinterpret a resource-in-use error returned by a create call.
    ///
    /// EKS answers a duplicate create with `ResourceInUseException`.
    #[must_use]
    pub fn on_create(self) -> Self {
        match self {
            EksError::ResourceInUse(m) => EksError::AlreadyExists(m),
            other => other,
        }
    }
}
