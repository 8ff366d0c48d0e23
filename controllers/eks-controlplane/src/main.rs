//! EKS Control Plane Controller
//!
//! Reconciles EKSControlPlane objects against Amazon EKS:
//! - creates, adopts, upgrades and updates the remote cluster
//! - converges managed add-ons, access entries and the aws-auth mapping
//! - garbage-collects load balancers and security groups left by the workload
//!   cluster before the finalizer is released
//!
//! The same process serves the validating/defaulting admission webhook and the
//! probe and metrics endpoints.

mod admission;
mod backoff;
mod config;
mod controller;
mod error;
mod gc;
mod health;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod version;
mod watcher;
mod workload;

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use controller::Controller;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting EKS Control Plane Controller");

    let config = OperatorConfig::from_env()?;

    info!("Configuration:");
    info!("  EKS endpoint: {}", config.eks_endpoint);
    info!("  Region: {}", config.region);
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  GC strategy: {} (max passes {})", config.gc_strategy, config.gc_max_passes);
    info!("  Webhook port: {}, health port: {}", config.webhook_port, config.health_port);

    let registry = Arc::new(crds::Registry::with_defaults());
    let controller = Controller::new(config, registry).await?;
    controller.run().await?;

    Ok(())
}
