//! AWS gateway for the EKS control plane operator
//!
//! A typed client for the EKS, IAM, ELB, EC2 and Resource Groups Tagging calls
//! the operator makes, with a classified error taxonomy and a shared rate
//! limiter.
//!
//! # Example
//!
//! ```no_run
//! use eks_client::{EksClient, EksClientTrait, RateLimitedClient, DEFAULT_TIMEOUT};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = EksClient::new(
//!     "http://aws-signer:8080".to_string(),
//!     "us-west-2".to_string(),
//!     DEFAULT_TIMEOUT,
//! )?;
//! let client = RateLimitedClient::new(client, 10);
//!
//! match client.describe_cluster("team-a_prod").await {
//!     Ok(cluster) => println!("{} is {}", cluster.name, cluster.status),
//!     Err(e) if e.is_not_found() => println!("not created yet"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Error taxonomy**: transient, conflict, not-found, in-use and non-retryable failures
//! - **Rate limiting**: one token bucket shared by every caller
//! - **ARN classification**: maps tagged resources to the call that deletes them
//! - **Mock client**: in-memory implementation behind the `test-util` feature

pub mod arn;
pub mod client;
pub mod common;
pub mod error;
pub mod models;
pub mod rate_limit;
#[path = "trait.rs"]
pub mod eks_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use arn::{Arn, ResourceKind};
pub use client::{DEFAULT_TIMEOUT, EksClient};
pub use common::{HttpClient, classify_error};
pub use eks_trait::EksClientTrait;
pub use error::EksError;
pub use models::*;
pub use rate_limit::{RateLimitedClient, TokenBucket};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockEksClient;
