//! Main controller implementation.
//!
//! Builds the AWS gateway, the Kubernetes store and the reconciler, then runs
//! the watcher next to the probe server and the admission webhook.

use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::health::{HealthState, Metrics, run_health_server};
use crate::reconciler::store::KubeStore;
use crate::reconciler::{Reconciler, ReconcilerSettings};
use crate::watcher::watch_control_planes;
use crate::workload::KubeWorkloadClientFactory;
use crds::{EksControlPlane, Registry};
use eks_client::{EksClient, RateLimitedClient};
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Main controller for EKSControlPlane objects.
pub struct Controller {
    config: OperatorConfig,
    api: Api<EksControlPlane>,
    reconciler: Arc<Reconciler>,
    health: Arc<HealthState>,
    registry: Arc<Registry>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: OperatorConfig, registry: Arc<Registry>) -> Result<Self, ControllerError> {
        info!("Initializing EKS control plane controller");

        let kube_client = Client::try_default().await?;

        let eks = EksClient::new(config.eks_endpoint.clone(), config.region.clone(), config.api_timeout)?;
        let eks = RateLimitedClient::new(eks, config.rate_limit_per_second);

        let api: Api<EksControlPlane> = match config.namespace.as_deref() {
            Some(ns) => Api::namespaced(kube_client.clone(), ns),
            None => Api::all(kube_client.clone()),
        };

        let prometheus = prometheus::Registry::new();
        let metrics = Metrics::new(&prometheus)
            .map_err(|e| ControllerError::InvalidConfig(format!("cannot register metrics: {e}")))?;

        let reconciler = Reconciler::new(
            Arc::new(eks),
            Arc::new(KubeStore::new(kube_client.clone())),
            Arc::new(KubeWorkloadClientFactory::new(kube_client)),
            ReconcilerSettings::from_config(&config),
            Arc::new(metrics),
        );

        Ok(Self {
            config,
            api,
            reconciler: Arc::new(reconciler),
            health: Arc::new(HealthState::new(prometheus)),
            registry,
        })
    }

    /// Runs until the watcher or one of the servers stops.
    pub async fn run(self) -> Result<(), ControllerError> {
        let watcher: JoinHandle<Result<(), ControllerError>> =
            tokio::spawn(watch_control_planes(self.api.clone(), self.reconciler.clone()));
        let health: JoinHandle<Result<(), ControllerError>> =
            tokio::spawn(run_health_server(self.health.clone(), self.config.health_port));
        let webhook = self.spawn_webhook();

        self.health.set_ready(true);
        info!("EKS control plane controller started");

        let result = tokio::select! {
            res = watcher => flatten("watcher", res),
            res = health => flatten("health server", res),
            res = webhook => flatten("webhook server", res),
        };
        self.health.set_ready(false);
        result
    }

    /// Serve admission only when certificates are mounted.
    fn spawn_webhook(&self) -> JoinHandle<Result<(), ControllerError>> {
        let config = self.config.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            if !config.webhook_cert_path().exists() || !config.webhook_key_path().exists() {
                warn!(
                    "No webhook certificates in {}, admission webhook disabled",
                    config.webhook_cert_dir.display()
                );
                return std::future::pending().await;
            }
            crate::admission::server::run_webhook_server(&config, registry)
                .await
                .map_err(ControllerError::from)
        })
    }
}

fn flatten(task: &str, res: Result<Result<(), ControllerError>, tokio::task::JoinError>) -> Result<(), ControllerError> {
    match res {
        Ok(Ok(())) => {
            warn!("{} exited", task);
            Ok(())
        }
        Ok(Err(e)) => {
            error!("{} failed: {}", task, e);
            Err(e)
        }
        Err(e) => {
            error!("{} panicked: {}", task, e);
            Err(ControllerError::Watch(format!("{task} task failed: {e}")))
        }
    }
}
