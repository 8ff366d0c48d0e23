//! Defaulting for EKSControlPlane.
//!
//! `default` is pure and idempotent: applying it to its own output yields the
//! same spec.

use crate::version;
use crds::{
    AzSelection, CniIngressRule, DEFAULT_AZ_USAGE_LIMIT, DEFAULT_PUBLIC_CIDR, EksControlPlane,
    EksControlPlaneSpec, IdentityRef, TokenMethod,
};
use kube::ResourceExt;
use sha2::{Digest, Sha256};

/// EKS rejects cluster names of this length or longer.
pub const MAX_CLUSTER_NAME_LENGTH: usize = 100;

/// Prefix of hashed cluster names.
pub const HASHED_NAME_PREFIX: &str = "capa_";

const HASHED_NAME_LENGTH: usize = 32;

/// Return the spec with every default applied.
pub fn default(cp: &EksControlPlane) -> EksControlPlaneSpec {
    let mut spec = cp.spec.clone();

    if cp.cluster_name().is_none() {
        let namespace = cp.namespace().unwrap_or_else(|| "default".to_string());
        spec.eks_cluster_name = Some(generate_cluster_name(&cp.name_any(), &namespace));
    }

    if spec.identity_ref.is_none() {
        spec.identity_ref = Some(IdentityRef::controller_default());
    }

    if let Some(normalized) = spec.version.as_deref().and_then(version::normalize) {
        spec.version = Some(normalized);
    }

    let vpc = &mut spec.network.vpc;
    vpc.availability_zone_usage_limit.get_or_insert(DEFAULT_AZ_USAGE_LIMIT);
    vpc.availability_zone_selection.get_or_insert(AzSelection::Ordered);

    if let Some(cni) = spec.network.cni.as_mut() {
        if cni.cni_ingress_rules.is_empty() {
            cni.cni_ingress_rules = CniIngressRule::calico_defaults();
        }
    }

    spec.token_method.get_or_insert(TokenMethod::IamAuthenticator);

    if spec.bastion.enabled && spec.bastion.allowed_cidr_blocks.is_empty() {
        spec.bastion.allowed_cidr_blocks = vec![DEFAULT_PUBLIC_CIDR.to_string()];
    }

    spec
}

/// Derive the remote cluster name from the object's namespace and name.
///
/// Names that would reach the EKS length limit are replaced by `capa_` and a
/// truncated base36 SHA-256 of the derived name.
pub fn generate_cluster_name(name: &str, namespace: &str) -> String {
    let derived = format!("{namespace}_{}", name.replace('.', "_"));
    if derived.len() < MAX_CLUSTER_NAME_LENGTH {
        return derived;
    }
    let hash_length = HASHED_NAME_LENGTH - HASHED_NAME_PREFIX.len();
    let mut hashed = base36(&Sha256::digest(derived.as_bytes()));
    hashed.truncate(hash_length);
    format!("{HASHED_NAME_PREFIX}{hashed}")
}

/// Lowercase base36 rendering of a big-endian unsigned integer.
fn base36(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut number: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    let mut out = Vec::new();
    while !number.is_empty() {
        let mut quotient = Vec::with_capacity(number.len());
        let mut remainder: u32 = 0;
        for byte in &number {
            let acc = (remainder << 8) | u32::from(*byte);
            let q = acc / 36;
            remainder = acc % 36;
            if !(quotient.is_empty() && q == 0) {
                // q < 256 because remainder < 36
                quotient.push(q as u8);
            }
        }
        out.push(DIGITS[remainder as usize]);
        number = quotient;
    }
    if out.is_empty() {
        out.push(b'0');
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_control_plane;
    use crds::{BastionSpec, CniSpec};

    #[test]
    fn test_cluster_name_from_namespace_and_name() {
        assert_eq!(generate_cluster_name("prod.eu", "team-a"), "team-a_prod_eu");
    }

    #[test]
    fn test_long_cluster_name_is_hashed() {
        let long = "x".repeat(120);
        let first = generate_cluster_name(&long, "team-a");
        let second = generate_cluster_name(&long, "team-a");
        assert_eq!(first, second);
        assert!(first.starts_with(HASHED_NAME_PREFIX));
        assert_eq!(first.len(), HASHED_NAME_LENGTH);
        assert!(first[HASHED_NAME_PREFIX.len()..].bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()));
        assert_ne!(first, generate_cluster_name(&long, "team-b"));

        // 99 characters stays as is, 100 is hashed
        let ns = "n";
        let fits = "y".repeat(MAX_CLUSTER_NAME_LENGTH - ns.len() - 2);
        assert_eq!(generate_cluster_name(&fits, ns).len(), MAX_CLUSTER_NAME_LENGTH - 1);
        let at_limit = "y".repeat(MAX_CLUSTER_NAME_LENGTH - ns.len() - 1);
        assert!(generate_cluster_name(&at_limit, ns).starts_with(HASHED_NAME_PREFIX));
    }

    #[test]
    fn test_base36() {
        assert_eq!(base36(&[0]), "0");
        assert_eq!(base36(&[35]), "z");
        assert_eq!(base36(&[36]), "10");
        assert_eq!(base36(&[1, 0]), "74");
        assert_eq!(base36(&[0, 0, 1, 0]), "74");
    }

    #[test]
    fn test_defaults_applied() {
        let mut cp = create_test_control_plane("cp", "team-a");
        cp.spec.eks_cluster_name = None;
        cp.spec.version = Some("1.29.4".to_string());
        cp.spec.network.cni = Some(CniSpec::default());
        cp.spec.bastion = BastionSpec {
            enabled: true,
            allowed_cidr_blocks: vec![],
        };

        let spec = default(&cp);
        assert_eq!(spec.eks_cluster_name.as_deref(), Some("team-a_cp"));
        assert_eq!(spec.identity_ref, Some(IdentityRef::controller_default()));
        assert_eq!(spec.version.as_deref(), Some("v1.29"));
        assert_eq!(spec.network.vpc.availability_zone_usage_limit, Some(3));
        assert_eq!(spec.network.vpc.availability_zone_selection, Some(AzSelection::Ordered));
        let rules = &spec.network.cni.as_ref().unwrap().cni_ingress_rules;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].description, "bgp (calico)");
        assert_eq!((rules[1].protocol.as_str(), rules[1].from_port, rules[1].to_port), ("4", -1, 65535));
        assert_eq!(spec.token_method, Some(TokenMethod::IamAuthenticator));
        assert_eq!(spec.bastion.allowed_cidr_blocks, vec!["0.0.0.0/0".to_string()]);
    }

    #[test]
    fn test_defaults_keep_user_values() {
        let mut cp = create_test_control_plane("cp", "team-a");
        cp.spec.eks_cluster_name = Some("custom".to_string());
        cp.spec.token_method = Some(TokenMethod::AwsCli);
        cp.spec.network.vpc.availability_zone_usage_limit = Some(2);
        cp.spec.network.cni = Some(CniSpec {
            cni_ingress_rules: vec![CniIngressRule {
                description: "vxlan".to_string(),
                protocol: "udp".to_string(),
                from_port: 4789,
                to_port: 4789,
            }],
        });

        let spec = default(&cp);
        assert_eq!(spec.eks_cluster_name.as_deref(), Some("custom"));
        assert_eq!(spec.token_method, Some(TokenMethod::AwsCli));
        assert_eq!(spec.network.vpc.availability_zone_usage_limit, Some(2));
        assert_eq!(spec.network.cni.unwrap().cni_ingress_rules.len(), 1);
    }

    #[test]
    fn test_defaulting_is_idempotent() {
        let mut cp = create_test_control_plane("prod.eu-west", "team-a");
        cp.spec.eks_cluster_name = Some(String::new());
        cp.spec.version = Some("1.30".to_string());
        cp.spec.network.cni = Some(CniSpec::default());
        cp.spec.bastion.enabled = true;

        let once = default(&cp);
        cp.spec = once.clone();
        let twice = default(&cp);
        assert_eq!(once, twice);
    }
}
