//! Operator configuration.
//!
//! Everything is read from environment variables. Required values missing from
//! the environment are reported as `ControllerError::InvalidConfig`.

use crate::error::ControllerError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How workload-created load balancers are found during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcStrategy {
    /// Read LoadBalancer Services from the workload cluster and match by DNS name.
    Direct,
    /// Enumerate resources carrying the cluster's cloud-provider ownership tag.
    #[default]
    TagSweep,
}

impl FromStr for GcStrategy {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(GcStrategy::Direct),
            "tag-sweep" | "tagsweep" | "alternative" => Ok(GcStrategy::TagSweep),
            other => Err(ControllerError::InvalidConfig(format!(
                "GC_STRATEGY must be 'direct' or 'tag-sweep', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for GcStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcStrategy::Direct => f.write_str("direct"),
            GcStrategy::TagSweep => f.write_str("tag-sweep"),
        }
    }
}

/// Runtime configuration for the operator process.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Signing proxy in front of the AWS APIs
    pub eks_endpoint: String,
    /// AWS region
    pub region: String,
    /// Namespace to watch; all namespaces when `None`
    pub namespace: Option<String>,
    /// Garbage collection strategy
    pub gc_strategy: GcStrategy,
    /// Attempts per resource delete that hits a dependency
    pub gc_max_attempts: u32,
    /// Partial sweeps tolerated before the finalizer is removed anyway
    pub gc_max_passes: u32,
    /// Timeout for a single AWS call
    pub api_timeout: Duration,
    /// AWS calls per second across all reconciliations
    pub rate_limit_per_second: u32,
    /// Directory holding tls.crt and tls.key for the webhook
    pub webhook_cert_dir: PathBuf,
    /// Webhook listen port
    pub webhook_port: u16,
    /// Probe and metrics listen port
    pub health_port: u16,
    /// Periodic resync of converged objects
    pub resync: Duration,
}

impl OperatorConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of a variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| {
                ControllerError::InvalidConfig(format!("{key} environment variable is required"))
            })
        };

        let gc_strategy = match (get("GC_STRATEGY"), get("ALTERNATIVE_GC_STRATEGY")) {
            (Some(strategy), _) => strategy.parse()?,
            (None, Some(legacy)) => {
                if parse_value::<bool>("ALTERNATIVE_GC_STRATEGY", &legacy.to_ascii_lowercase())? {
                    GcStrategy::TagSweep
                } else {
                    GcStrategy::Direct
                }
            }
            (None, None) => GcStrategy::default(),
        };

        let config = Self {
            eks_endpoint: required("EKS_ENDPOINT")?,
            region: required("AWS_REGION")?,
            namespace: get("WATCH_NAMESPACE"),
            gc_strategy,
            gc_max_attempts: parse_or(&get, "GC_MAX_ATTEMPTS", 5)?,
            gc_max_passes: parse_or(&get, "GC_MAX_PASSES", 3)?,
            api_timeout: Duration::from_secs(parse_or(&get, "API_TIMEOUT_SECS", 30)?),
            rate_limit_per_second: parse_or(&get, "RATE_LIMIT_PER_SECOND", 10)?,
            webhook_cert_dir: get("WEBHOOK_CERT_DIR")
                .map_or_else(|| PathBuf::from("/etc/webhook/certs"), PathBuf::from),
            webhook_port: parse_or(&get, "WEBHOOK_PORT", 9443)?,
            health_port: parse_or(&get, "HEALTH_PORT", 8080)?,
            resync: Duration::from_secs(parse_or(&get, "RESYNC_SECS", 600)?),
        };

        for (key, value) in [
            ("GC_MAX_ATTEMPTS", config.gc_max_attempts),
            ("GC_MAX_PASSES", config.gc_max_passes),
            ("RATE_LIMIT_PER_SECOND", config.rate_limit_per_second),
        ] {
            if value == 0 {
                return Err(ControllerError::InvalidConfig(format!("{key} must be greater than zero")));
            }
        }

        Ok(config)
    }

    /// Path of the webhook serving certificate.
    pub fn webhook_cert_path(&self) -> PathBuf {
        self.webhook_cert_dir.join("tls.crt")
    }

    /// Path of the webhook private key.
    pub fn webhook_key_path(&self) -> PathBuf {
        self.webhook_cert_dir.join("tls.key")
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ControllerError> {
    raw.parse()
        .map_err(|_| ControllerError::InvalidConfig(format!("{key} has an invalid value '{raw}'")))
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<OperatorConfig, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        OperatorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [("EKS_ENDPOINT", "http://aws-signer:8080"), ("AWS_REGION", "eu-west-1")];

    #[test]
    fn test_defaults() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.eks_endpoint, "http://aws-signer:8080");
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.namespace, None);
        assert_eq!(config.gc_strategy, GcStrategy::TagSweep);
        assert_eq!(config.gc_max_attempts, 5);
        assert_eq!(config.gc_max_passes, 3);
        assert_eq!(config.api_timeout, Duration::from_secs(30));
        assert_eq!(config.rate_limit_per_second, 10);
        assert_eq!(config.webhook_cert_path(), PathBuf::from("/etc/webhook/certs/tls.crt"));
        assert_eq!(config.webhook_port, 9443);
        assert_eq!(config.health_port, 8080);
        assert_eq!(config.resync, Duration::from_secs(600));
    }

    #[test]
    fn test_missing_required() {
        let err = load(&[("AWS_REGION", "eu-west-1")]).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(ref m) if m.contains("EKS_ENDPOINT")));

        let err = load(&[("EKS_ENDPOINT", "http://aws-signer:8080"), ("AWS_REGION", "  ")]).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(ref m) if m.contains("AWS_REGION")));
    }

    #[test]
    fn test_gc_strategy_selection() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("GC_STRATEGY", "direct"));
        assert_eq!(load(&vars).unwrap().gc_strategy, GcStrategy::Direct);

        let mut vars = REQUIRED.to_vec();
        vars.push(("ALTERNATIVE_GC_STRATEGY", "false"));
        assert_eq!(load(&vars).unwrap().gc_strategy, GcStrategy::Direct);

        let mut vars = REQUIRED.to_vec();
        vars.push(("ALTERNATIVE_GC_STRATEGY", "TRUE"));
        assert_eq!(load(&vars).unwrap().gc_strategy, GcStrategy::TagSweep);

        // The explicit setting wins over the legacy flag
        let mut vars = REQUIRED.to_vec();
        vars.push(("GC_STRATEGY", "tag-sweep"));
        vars.push(("ALTERNATIVE_GC_STRATEGY", "false"));
        assert_eq!(load(&vars).unwrap().gc_strategy, GcStrategy::TagSweep);

        let mut vars = REQUIRED.to_vec();
        vars.push(("GC_STRATEGY", "sideways"));
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_invalid_numbers() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("WEBHOOK_PORT", "70000"));
        assert!(load(&vars).is_err());

        let mut vars = REQUIRED.to_vec();
        vars.push(("RATE_LIMIT_PER_SECOND", "0"));
        assert!(load(&vars).is_err());

        let mut vars = REQUIRED.to_vec();
        vars.push(("GC_MAX_PASSES", "1"));
        vars.push(("WATCH_NAMESPACE", "capi-system"));
        let config = load(&vars).unwrap();
        assert_eq!(config.gc_max_passes, 1);
        assert_eq!(config.namespace.as_deref(), Some("capi-system"));
    }
}
