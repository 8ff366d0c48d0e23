//! Network configuration for the control plane
//!
//! Describes the VPC the cluster lives in, its subnets and the CNI ingress rules
//! that must be opened between nodes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default number of availability zones the control plane spreads across.
pub const DEFAULT_AZ_USAGE_LIMIT: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// VPC configuration
    #[serde(default)]
    pub vpc: VpcSpec,

    /// Subnets the control plane attaches ENIs to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<SubnetSpec>,

    /// Extra security groups attached to the control plane ENIs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_group_ids: Vec<String>,

    /// CNI ingress rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cni: Option<CniSpec>,
}

impl NetworkSpec {
    /// Subnet ids in declaration order.
    pub fn subnet_ids(&self) -> Vec<String> {
        self.subnets.iter().filter_map(|s| s.id.clone()).collect()
    }

    /// Distinct availability zones covered by the declared subnets.
    pub fn availability_zones(&self) -> Vec<String> {
        let mut zones: Vec<String> = self
            .subnets
            .iter()
            .filter_map(|s| s.availability_zone.clone())
            .collect();
        zones.sort();
        zones.dedup();
        zones
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VpcSpec {
    /// Existing VPC id (unmanaged VPC)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Primary IPv4 CIDR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr_block: Option<String>,

    /// Maximum number of AZs to use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone_usage_limit: Option<u32>,

    /// How AZs are picked when more are available than the limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone_selection: Option<AzSelection>,

    /// IPv6 configuration; presence enables IPv6
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<Ipv6Spec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Ipv6Spec {
    /// IPv6 CIDR from a BYOIP pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr_block: Option<String>,

    /// BYOIP pool id; required with `cidrBlock`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<String>,

    /// Egress-only internet gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub egress_only_internet_gateway_id: Option<String>,
}

/// Availability zone selection scheme.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum AzSelection {
    /// Zones in lexical order
    #[default]
    Ordered,
    /// Zones picked at random
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    /// Subnet id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Availability zone of the subnet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,

    /// Whether the subnet routes to an internet gateway
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CniSpec {
    /// Ingress rules the CNI needs between nodes
    #[serde(default)]
    pub cni_ingress_rules: Vec<CniIngressRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CniIngressRule {
    /// Rule description
    pub description: String,

    /// Protocol: "tcp", "udp", "icmp" or an IP protocol number
    pub protocol: String,

    /// First port
    pub from_port: i64,

    /// Last port
    pub to_port: i64,
}

impl CniIngressRule {
    /// Rules opened for Calico when none are declared.
    pub fn calico_defaults() -> Vec<CniIngressRule> {
        vec![
            CniIngressRule {
                description: "bgp (calico)".to_string(),
                protocol: "tcp".to_string(),
                from_port: 179,
                to_port: 179,
            },
            CniIngressRule {
                description: "IP-in-IP (calico)".to_string(),
                protocol: "4".to_string(),
                from_port: -1,
                to_port: 65535,
            },
        ]
    }
}

/// Observed network state.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    /// Security group EKS created for the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_security_group_id: Option<String>,

    /// VPC the cluster runs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,

    /// "ipv4" or "ipv6"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_family: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BastionSpec {
    /// Whether a bastion host should be provisioned
    #[serde(default)]
    pub enabled: bool,

    /// CIDRs allowed to reach the bastion; defaults to 0.0.0.0/0 when enabled
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_cidr_blocks: Vec<String>,
}
