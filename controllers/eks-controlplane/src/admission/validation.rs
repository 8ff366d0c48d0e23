//! Validation for EKSControlPlane create and update.
//!
//! Every rule runs and all violations are reported together; a request is
//! either accepted as a whole or rejected as a whole.

use super::cidr::{is_valid_ipv4_cidr, validate_secondary_cidr};
use super::{AdmissionError, FieldViolation};
use crate::version::{at_least, minor_cmp, parse_lenient};
use crds::{AccessScopeType, AuthenticationMode, EksControlPlane, EksControlPlaneSpec, KUBE_PROXY_ADDON, VPC_CNI_ADDON};

/// Validate a create (`old` is `None`) or an update.
pub fn validate(old: Option<&EksControlPlane>, new: &EksControlPlane) -> Result<(), AdmissionError> {
    let mut violations = validate_spec(&new.spec);
    if let Some(old) = old {
        violations.extend(validate_update(&old.spec, &new.spec));
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(AdmissionError { violations })
    }
}

fn validate_spec(spec: &EksControlPlaneSpec) -> Vec<FieldViolation> {
    let mut violations = Vec::new();

    let version = match spec.version.as_deref() {
        Some(raw) => match parse_lenient(raw) {
            Some(v) => Some(v),
            None => {
                violations.push(FieldViolation::invalid(
                    "spec.version",
                    format!("{raw} is not a valid Kubernetes version, expected e.g. v1.29"),
                ));
                None
            }
        },
        None => None,
    };

    if !spec.addons().is_empty() {
        if let Some(v) = &version {
            if !at_least(v, 1, 18, 0) {
                violations.push(FieldViolation::invalid(
                    "spec.version",
                    "addons requires Kubernetes v1.18 or greater",
                ));
            }
        }
        if spec.vpc_cni.disable && spec.addon(VPC_CNI_ADDON).is_some() {
            violations.push(FieldViolation::forbidden(
                "spec.vpcCni.disable",
                "cannot disable vpc-cni if the VPC CNI addon is specified",
            ));
        }
        if spec.kube_proxy.disable && spec.addon(KUBE_PROXY_ADDON).is_some() {
            violations.push(FieldViolation::forbidden(
                "spec.kubeProxy.disable",
                "cannot disable kube-proxy if the kube-proxy addon is specified",
            ));
        }
    }

    if let Some(ipv6) = &spec.network.vpc.ipv6 {
        if let Some(v) = &version {
            if !at_least(v, 1, 22, 0) {
                violations.push(FieldViolation::invalid("spec.version", "IPv6 requires Kubernetes v1.22 or greater"));
            }
        }
        if spec.addons().is_empty() {
            violations.push(FieldViolation::required(
                "spec.addons",
                "addons are required to be set explicitly if IPv6 is enabled",
            ));
        } else {
            let cni_ok = spec
                .addon(VPC_CNI_ADDON)
                .and_then(|a| parse_lenient(&a.version))
                .is_some_and(|v| at_least(&v, 1, 10, 2));
            if !cni_ok {
                violations.push(FieldViolation::invalid(
                    "spec.addons",
                    "vpc-cni version must be above or equal to v1.10.2 for IPv6",
                ));
            }
        }
        let has_cidr = ipv6.cidr_block.as_deref().is_some_and(|c| !c.is_empty());
        let has_pool = ipv6.pool_id.as_deref().is_some_and(|p| !p.is_empty());
        if has_cidr && !has_pool {
            violations.push(FieldViolation::invalid(
                "spec.network.vpc.ipv6.poolId",
                "poolId cannot be empty if cidrBlock is set",
            ));
        }
    }

    for tag in spec.additional_tags.validate() {
        violations.push(FieldViolation::invalid(
            "spec.additionalTags",
            format!("{}: {}", tag.bad_value, tag.message),
        ));
    }

    if let Some(cidr) = &spec.secondary_cidr_block {
        if let Err(e) = validate_secondary_cidr(cidr) {
            violations.push(FieldViolation::invalid("spec.secondaryCidrBlock", e.message()));
        }
    }

    if let Some(cidrs) = &spec.endpoint_access.public_cidrs {
        for cidr in cidrs.iter().filter(|c| !is_valid_ipv4_cidr(c)) {
            violations.push(FieldViolation::invalid(
                "spec.endpointAccess.publicCIDRs",
                format!("{cidr} must be a valid CIDR range"),
            ));
        }
    }

    if !spec.access_entries.is_empty() && spec.authentication_mode() == AuthenticationMode::ConfigMap {
        violations.push(FieldViolation::forbidden(
            "spec.accessEntries",
            "accessEntries can only be used when authenticationMode is API or API_AND_CONFIG_MAP",
        ));
    }
    for (i, entry) in spec.access_entries.iter().enumerate() {
        for (j, policy) in entry.access_policies.iter().enumerate() {
            if policy.access_scope.type_ == AccessScopeType::Namespace && policy.access_scope.namespaces.is_empty() {
                violations.push(FieldViolation::required(
                    format!("spec.accessEntries[{i}].accessPolicies[{j}].accessScope.namespaces"),
                    "namespaces are required when the access scope type is namespace",
                ));
            }
        }
    }

    violations
}

fn validate_update(old: &EksControlPlaneSpec, new: &EksControlPlaneSpec) -> Vec<FieldViolation> {
    let mut violations = Vec::new();

    let old_name = old.eks_cluster_name.as_deref().filter(|n| !n.is_empty());
    let new_name = new.eks_cluster_name.as_deref().filter(|n| !n.is_empty());
    match (old_name, new_name) {
        (_, None) => violations.push(FieldViolation::required("spec.eksClusterName", "eksClusterName is required")),
        (Some(o), Some(n)) if o != n => {
            violations.push(FieldViolation::immutable("spec.eksClusterName", "field is immutable"));
        }
        _ => {}
    }

    if old.region != new.region {
        violations.push(FieldViolation::immutable("spec.region", "field is immutable"));
    }

    let old_version = old.version.as_deref().and_then(parse_lenient);
    let new_version = new.version.as_deref().and_then(parse_lenient);
    if let (Some(o), Some(n)) = (&old_version, &new_version) {
        if minor_cmp(n, o).is_lt() {
            violations.push(FieldViolation::invalid("spec.version", "new version less than old version"));
        }
    }

    if let Some(old_enc) = &old.encryption_config {
        match &new.encryption_config {
            None => violations.push(FieldViolation::invalid(
                "spec.encryptionConfig",
                "disabling EKS encryption is not allowed after it has been enabled",
            )),
            Some(new_enc) => {
                if old_enc.provider().is_some() && old_enc.provider() != new_enc.provider() {
                    violations.push(FieldViolation::immutable(
                        "spec.encryptionConfig.provider",
                        "changing EKS encryption is not allowed after it has been enabled",
                    ));
                }
                if old_enc.resources.iter().any(|r| !new_enc.resources.contains(r)) {
                    violations.push(FieldViolation::invalid(
                        "spec.encryptionConfig.resources",
                        "encrypted resources can only be added",
                    ));
                }
            }
        }
    }

    if let Some(old_cidr) = &old.secondary_cidr_block {
        if new.secondary_cidr_block.as_ref() != Some(old_cidr) {
            violations.push(FieldViolation::immutable("spec.secondaryCidrBlock", "field is immutable"));
        }
    }

    if old.network.vpc.ipv6.is_some() != new.network.vpc.ipv6.is_some() {
        violations.push(FieldViolation::immutable(
            "spec.network.vpc.ipv6",
            "changing IP family is not allowed after it has been set",
        ));
    }

    let old_mode = old.authentication_mode();
    let new_mode = new.authentication_mode();
    if !old_mode.can_transition_to(new_mode) {
        violations.push(FieldViolation::invalid(
            "spec.accessConfig.authenticationMode",
            format!(
                "authenticationMode cannot change from {} to {}; it may only move from CONFIG_MAP to API_AND_CONFIG_MAP to API",
                old_mode.as_api_str(),
                new_mode.as_api_str()
            ),
        ));
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::FieldReason;
    use crate::test_utils::create_test_control_plane;
    use crds::{AccessConfig, AccessEntry, Addon, EncryptionConfig, Ipv6Spec};

    fn addon(name: &str, version: &str) -> Addon {
        Addon {
            name: name.to_string(),
            version: version.to_string(),
            configuration: None,
            conflict_resolution: None,
            service_account_role_arn: None,
        }
    }

    fn reject(old: Option<&EksControlPlane>, new: &EksControlPlane) -> AdmissionError {
        validate(old, new).expect_err("request should be rejected")
    }

    #[test]
    fn test_valid_create_is_accepted() {
        let cp = create_test_control_plane("cp", "team-a");
        assert_eq!(validate(None, &cp), Ok(()));
    }

    #[test]
    fn test_invalid_version() {
        let mut cp = create_test_control_plane("cp", "team-a");
        cp.spec.version = Some("latest".to_string());
        let err = reject(None, &cp);
        assert_eq!(err.find("spec.version").unwrap().reason, FieldReason::FieldValueInvalid);
    }

    #[test]
    fn test_version_is_monotonic() {
        let old = create_test_control_plane("cp", "team-a");
        let mut new = old.clone();
        new.spec.version = Some("v1.28".to_string());
        let err = reject(Some(&old), &new);
        assert_eq!(err.find("spec.version").unwrap().message, "new version less than old version");

        new.spec.version = Some("v1.30".to_string());
        assert_eq!(validate(Some(&old), &new), Ok(()));
        new.spec.version = Some("1.29.7".to_string());
        assert_eq!(validate(Some(&old), &new), Ok(()));
    }

    #[test]
    fn test_addon_requires_118() {
        let mut cp = create_test_control_plane("cp", "team-a");
        cp.spec.version = Some("v1.17".to_string());
        cp.spec.addons = Some(vec![addon("coredns", "v1.8.0-eksbuild.1")]);
        let err = reject(None, &cp);
        assert!(err.find("spec.version").unwrap().message.contains("v1.18"));
    }

    #[test]
    fn test_disable_builtin_with_declared_addon() {
        let mut cp = create_test_control_plane("cp", "team-a");
        cp.spec.vpc_cni.disable = true;
        cp.spec.kube_proxy.disable = true;
        // No add-ons declared: allowed
        assert_eq!(validate(None, &cp), Ok(()));

        cp.spec.addons = Some(vec![addon("vpc-cni", "v1.15.1-eksbuild.1"), addon("kube-proxy", "v1.29.0-eksbuild.1")]);
        let err = reject(None, &cp);
        assert_eq!(err.find("spec.vpcCni.disable").unwrap().reason, FieldReason::FieldValueForbidden);
        assert!(err.has_field("spec.kubeProxy.disable"));

        // Declaring other add-ons does not conflict
        cp.spec.addons = Some(vec![addon("coredns", "v1.11.1-eksbuild.4")]);
        assert_eq!(validate(None, &cp), Ok(()));
    }

    #[test]
    fn test_ipv6_gating() {
        let mut cp = create_test_control_plane("cp", "team-a");
        cp.spec.version = Some("v1.21".to_string());
        cp.spec.network.vpc.ipv6 = Some(Ipv6Spec {
            cidr_block: Some("2001:db8::/56".to_string()),
            pool_id: None,
            egress_only_internet_gateway_id: None,
        });
        let err = reject(None, &cp);
        let messages: Vec<&str> = err.violations.iter().map(|v| v.message.as_str()).collect();
        assert!(messages.contains(&"IPv6 requires Kubernetes v1.22 or greater"));
        assert!(messages.iter().any(|m| m.contains("addons")));
        assert!(messages.contains(&"poolId cannot be empty if cidrBlock is set"));

        cp.spec.version = Some("v1.29".to_string());
        cp.spec.addons = Some(vec![addon("vpc-cni", "v1.10.1-eksbuild.1")]);
        let err = reject(None, &cp);
        assert!(err.violations.iter().any(|v| v.message.contains("v1.10.2")));

        cp.spec.addons = Some(vec![addon("vpc-cni", "v1.10.2-eksbuild.1")]);
        cp.spec.network.vpc.ipv6.as_mut().unwrap().pool_id = Some("ipv6pool-ec2-0123".to_string());
        assert_eq!(validate(None, &cp), Ok(()));
    }

    #[test]
    fn test_secondary_cidr() {
        let mut cp = create_test_control_plane("cp", "team-a");
        cp.spec.secondary_cidr_block = Some("100.64.0.0/16".to_string());
        assert_eq!(validate(None, &cp), Ok(()));

        for bad in ["100.64.0.0/10", "100.64.0.0/29", "10.0.0.0/20", "garbage"] {
            cp.spec.secondary_cidr_block = Some(bad.to_string());
            let err = reject(None, &cp);
            assert!(err.has_field("spec.secondaryCidrBlock"), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_secondary_cidr_immutable() {
        let mut old = create_test_control_plane("cp", "team-a");
        old.spec.secondary_cidr_block = Some("100.64.0.0/16".to_string());
        let mut new = old.clone();
        new.spec.secondary_cidr_block = Some("100.65.0.0/16".to_string());
        let err = reject(Some(&old), &new);
        assert_eq!(err.find("spec.secondaryCidrBlock").unwrap().reason, FieldReason::FieldValueImmutable);
    }

    #[test]
    fn test_encryption_provider_immutable() {
        let mut old = create_test_control_plane("cp", "team-a");
        old.spec.encryption_config = Some(EncryptionConfig {
            provider: Some("arn:aws:kms:us-west-2:123456789012:key/one".to_string()),
            resources: vec!["secrets".to_string()],
        });

        let mut new = old.clone();
        new.spec.encryption_config = None;
        assert!(reject(Some(&old), &new).has_field("spec.encryptionConfig"));

        new.spec.encryption_config = Some(EncryptionConfig {
            provider: Some("arn:aws:kms:us-west-2:123456789012:key/two".to_string()),
            resources: vec!["secrets".to_string()],
        });
        assert!(reject(Some(&old), &new).has_field("spec.encryptionConfig.provider"));

        // Resources may grow
        new.spec.encryption_config = old.spec.encryption_config.clone();
        new.spec.encryption_config.as_mut().unwrap().resources.push("configmaps".to_string());
        assert_eq!(validate(Some(&old), &new), Ok(()));

        // nil to populated is allowed
        let plain = create_test_control_plane("cp", "team-a");
        assert_eq!(validate(Some(&plain), &old), Ok(()));
    }

    #[test]
    fn test_ipv6_and_identity_immutable() {
        let old = create_test_control_plane("cp", "team-a");
        let mut new = old.clone();
        new.spec.version = Some("v1.29".to_string());
        new.spec.addons = Some(vec![addon("vpc-cni", "v1.16.0-eksbuild.1")]);
        new.spec.network.vpc.ipv6 = Some(Ipv6Spec::default());
        new.spec.region = "eu-central-1".to_string();
        new.spec.eks_cluster_name = Some("renamed".to_string());

        let err = reject(Some(&old), &new);
        assert!(err.has_field("spec.network.vpc.ipv6"));
        assert!(err.has_field("spec.region"));
        assert_eq!(err.find("spec.eksClusterName").unwrap().reason, FieldReason::FieldValueImmutable);

        new = old.clone();
        new.spec.eks_cluster_name = None;
        assert_eq!(reject(Some(&old), &new).find("spec.eksClusterName").unwrap().reason, FieldReason::FieldValueRequired);
    }

    #[test]
    fn test_authentication_mode_only_moves_forward() {
        let mut old = create_test_control_plane("cp", "team-a");
        old.spec.access_config = Some(AccessConfig {
            authentication_mode: AuthenticationMode::Api,
            bootstrap_cluster_creator_admin_permissions: None,
        });
        let mut new = old.clone();
        new.spec.access_config.as_mut().unwrap().authentication_mode = AuthenticationMode::ApiAndConfigMap;
        assert!(reject(Some(&old), &new).has_field("spec.accessConfig.authenticationMode"));

        let mut old = create_test_control_plane("cp", "team-a");
        old.spec.access_config = None;
        new.spec.access_config.as_mut().unwrap().authentication_mode = AuthenticationMode::ApiAndConfigMap;
        assert_eq!(validate(Some(&old), &new), Ok(()));
        old.spec.access_config = new.spec.access_config.clone();
        new.spec.access_config.as_mut().unwrap().authentication_mode = AuthenticationMode::Api;
        assert_eq!(validate(Some(&old), &new), Ok(()));
    }

    #[test]
    fn test_access_entries_need_api_mode() {
        let mut cp = create_test_control_plane("cp", "team-a");
        cp.spec.access_entries = vec![AccessEntry {
            principal_arn: "arn:aws:iam::123456789012:role/admins".to_string(),
            type_: "STANDARD".to_string(),
            username: None,
            kubernetes_groups: vec![],
            access_policies: vec![],
        }];
        assert!(reject(None, &cp).has_field("spec.accessEntries"));

        cp.spec.access_config = Some(AccessConfig {
            authentication_mode: AuthenticationMode::ApiAndConfigMap,
            bootstrap_cluster_creator_admin_permissions: None,
        });
        assert_eq!(validate(None, &cp), Ok(()));
    }

    #[test]
    fn test_tags_and_public_cidrs_are_checked_together() {
        let mut cp = create_test_control_plane("cp", "team-a");
        cp.spec.additional_tags.insert("aws:reserved", "x");
        cp.spec.endpoint_access.public_cidrs = Some(vec!["203.0.113.0/24".to_string(), "nope".to_string()]);
        let err = reject(None, &cp);
        assert_eq!(err.violations.len(), 2);
        assert!(err.find("spec.additionalTags").unwrap().message.contains("aws:"));
        assert!(err.find("spec.endpointAccess.publicCIDRs").unwrap().message.starts_with("nope"));
    }
}
