//! ARN parsing and classification
//!
//! The tagging API returns bare ARNs; the garbage collector needs to know which
//! delete call each one maps to.

use std::fmt;

/// Parsed `arn:partition:service:region:account:resource`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account: String,
    pub resource: String,
}

impl Arn {
    /// Parse an ARN string.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(6, ':');
        if parts.next()? != "arn" {
            return None;
        }
        let partition = parts.next()?.to_string();
        let service = parts.next()?.to_string();
        let region = parts.next()?.to_string();
        let account = parts.next()?.to_string();
        let resource = parts.next()?.to_string();
        if partition.is_empty() || service.is_empty() || resource.is_empty() {
            return None;
        }
        Some(Self {
            partition,
            service,
            region,
            account,
            resource,
        })
    }

    /// Classify the resource this ARN names.
    pub fn kind(&self) -> ResourceKind {
        let segments: Vec<&str> = self.resource.split('/').collect();
        match (self.service.as_str(), segments.as_slice()) {
            ("elasticloadbalancing", ["loadbalancer", "app" | "net" | "gwy", ..]) => ResourceKind::LoadBalancerV2,
            ("elasticloadbalancing", ["loadbalancer", name]) => ResourceKind::ClassicLoadBalancer {
                name: (*name).to_string(),
            },
            ("elasticloadbalancing", ["targetgroup", ..]) => ResourceKind::TargetGroup,
            ("ec2", ["security-group", id]) => ResourceKind::SecurityGroup { id: (*id).to_string() },
            _ => ResourceKind::Other {
                resource_type: segments.first().map(|s| (*s).to_string()).unwrap_or_default(),
            },
        }
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account, self.resource
        )
    }
}

/// What kind of resource an ARN names, as far as cleanup is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    /// ALB/NLB/GWLB; deleted by ARN
    LoadBalancerV2,
    /// Classic ELB; deleted by name
    ClassicLoadBalancer { name: String },
    /// ELBv2 target group; deleted by ARN
    TargetGroup,
    /// EC2 security group; deleted by id
    SecurityGroup { id: String },
    /// Anything else
    Other { resource_type: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_load_balancers() {
        let nlb = Arn::parse("arn:aws:elasticloadbalancing:us-west-2:123456789012:loadbalancer/net/podinfo-nlb/50dc6c495c0c9188").unwrap();
        assert_eq!(nlb.kind(), ResourceKind::LoadBalancerV2);

        let alb = Arn::parse("arn:aws:elasticloadbalancing:us-west-2:123456789012:loadbalancer/app/web/1234").unwrap();
        assert_eq!(alb.kind(), ResourceKind::LoadBalancerV2);

        let elb = Arn::parse("arn:aws:elasticloadbalancing:us-west-2:123456789012:loadbalancer/podinfo-elb").unwrap();
        assert_eq!(elb.kind(), ResourceKind::ClassicLoadBalancer { name: "podinfo-elb".to_string() });
    }

    #[test]
    fn test_classify_other_resources() {
        let tg = Arn::parse("arn:aws:elasticloadbalancing:us-west-2:123:targetgroup/k8s-default-podinfo/73e2d6bc24d8a067").unwrap();
        assert_eq!(tg.kind(), ResourceKind::TargetGroup);

        let sg = Arn::parse("arn:aws:ec2:us-west-2:123:security-group/sg-0abc").unwrap();
        assert_eq!(sg.kind(), ResourceKind::SecurityGroup { id: "sg-0abc".to_string() });

        let vol = Arn::parse("arn:aws:ec2:us-west-2:123:volume/vol-1").unwrap();
        assert_eq!(vol.kind(), ResourceKind::Other { resource_type: "volume".to_string() });
    }

    #[test]
    fn test_parse_rejects_garbage_and_round_trips() {
        assert!(Arn::parse("not-an-arn").is_none());
        assert!(Arn::parse("arn:aws:eks").is_none());
        let s = "arn:aws-cn:eks:cn-north-1:123:cluster/c1";
        assert_eq!(Arn::parse(s).unwrap().to_string(), s);
    }
}
