//! Ownership and lifecycle tags
//!
//! Every AWS resource the operator creates carries an ownership tag whose key is
//! derived from the cluster name and whose value is the resource lifecycle
//! (`owned` or `shared`). The garbage collector relies on these tags to find
//! candidates and to tell owned resources apart from pre-existing ones.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Prefix of the provider-scoped ownership tag key.
pub const CLUSTER_TAG_KEY_PREFIX: &str = "sigs.k8s.io/cluster-api-provider-aws/cluster/";

/// Prefix of the tag key the in-cluster cloud provider stamps on resources it creates.
pub const CLOUD_PROVIDER_CLUSTER_TAG_KEY_PREFIX: &str = "kubernetes.io/cluster/";

/// Tag key carrying a resource's role (e.g. "bastion", "apiserver").
pub const ROLE_TAG_KEY: &str = "sigs.k8s.io/cluster-api-provider-aws/role";

/// Tag key carrying a resource's display name.
pub const NAME_TAG_KEY: &str = "Name";

/// Tag key the cloud provider sets on load balancers provisioned for a Service.
pub const SERVICE_NAME_TAG_KEY: &str = "kubernetes.io/service-name";

/// Tag key EKS sets on resources it manages itself.
pub const EKS_CLUSTER_NAME_TAG_KEY: &str = "aws:eks:cluster-name";

const MAX_KEY_LENGTH: usize = 128;
const MAX_VALUE_LENGTH: usize = 256;
const RESERVED_KEY_PREFIX: &str = "aws:";
const ALLOWED_PUNCTUATION: &str = "_.:/=+-@";

/// Lifecycle of a tagged resource relative to a cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResourceLifecycle {
    /// Created by the operator and deleted with the cluster.
    Owned,
    /// Pre-existing and only attached to; never deleted.
    Shared,
}

impl ResourceLifecycle {
    /// Tag value for this lifecycle.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceLifecycle::Owned => "owned",
            ResourceLifecycle::Shared => "shared",
        }
    }

    /// Parse a tag value. Matching is exact.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "owned" => Some(ResourceLifecycle::Owned),
            "shared" => Some(ResourceLifecycle::Shared),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider ownership tag key for a cluster.
pub fn cluster_tag_key(cluster_name: &str) -> String {
    format!("{CLUSTER_TAG_KEY_PREFIX}{cluster_name}")
}

/// Cloud-provider ownership tag key for a cluster.
///
/// This is the key the in-cluster cloud controller puts on load balancers it
/// provisions, and the key EKS expects on the cluster itself.
pub fn cluster_aws_cloud_provider_tag_key(cluster_name: &str) -> String {
    format!("{CLOUD_PROVIDER_CLUSTER_TAG_KEY_PREFIX}{cluster_name}")
}

/// Decode an ownership tag pair for `cluster_name`.
///
/// Returns the lifecycle only when the key names exactly this cluster, so a
/// tag for `prod-eu` is never mistaken for one belonging to `prod`.
pub fn parse_ownership(key: &str, value: &str, cluster_name: &str) -> Option<ResourceLifecycle> {
    let owner = key
        .strip_prefix(CLUSTER_TAG_KEY_PREFIX)
        .or_else(|| key.strip_prefix(CLOUD_PROVIDER_CLUSTER_TAG_KEY_PREFIX))?;
    if owner != cluster_name {
        return None;
    }
    ResourceLifecycle::parse(value)
}

/// A single tag validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagViolation {
    /// The offending key or value.
    pub bad_value: String,
    /// Human-readable detail.
    pub message: String,
}

impl TagViolation {
    fn new(bad_value: &str, message: impl Into<String>) -> Self {
        Self {
            bad_value: bad_value.to_string(),
            message: message.into(),
        }
    }
}

/// Map of AWS tags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(transparent)]
pub struct Tags(pub BTreeMap<String, String>);

impl Tags {
    /// Create an empty tag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Look up a tag value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// True when no tags are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over key/value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Merge `other` into a copy of `self`; `other` wins on conflicting keys.
    #[must_use]
    pub fn merge(&self, other: &Tags) -> Tags {
        let mut merged = self.clone();
        for (k, v) in &other.0 {
            merged.0.insert(k.clone(), v.clone());
        }
        merged
    }

    /// Tags in `self` that are missing from `other` or carry a different value there.
    #[must_use]
    pub fn difference(&self, other: &Tags) -> Tags {
        Tags(
            self.0
                .iter()
                .filter(|(k, v)| other.0.get(*k) != Some(*v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Lifecycle recorded for `cluster_name`, if any ownership tag names it.
    pub fn lifecycle_for(&self, cluster_name: &str) -> Option<ResourceLifecycle> {
        self.0
            .iter()
            .find_map(|(k, v)| parse_ownership(k, v, cluster_name))
    }

    /// True when the resource is tagged as owned by `cluster_name`.
    pub fn has_owned(&self, cluster_name: &str) -> bool {
        self.lifecycle_for(cluster_name) == Some(ResourceLifecycle::Owned)
    }

    /// Validate user supplied tags against AWS limits.
    pub fn validate(&self) -> Vec<TagViolation> {
        let mut violations = Vec::new();
        for (key, value) in &self.0 {
            if key.is_empty() {
                violations.push(TagViolation::new(key, "key cannot be empty"));
                continue;
            }
            if key.chars().count() > MAX_KEY_LENGTH {
                violations.push(TagViolation::new(
                    key,
                    format!("key cannot be longer than {MAX_KEY_LENGTH} characters"),
                ));
            }
            if key.starts_with(RESERVED_KEY_PREFIX) {
                violations.push(TagViolation::new(
                    key,
                    format!("user created tag's key cannot have prefix {RESERVED_KEY_PREFIX}"),
                ));
            }
            if !has_allowed_characters(key) {
                violations.push(TagViolation::new(
                    key,
                    "key cannot have characters other than alphabets, numbers, spaces and _ . : / = + - @ .",
                ));
            }
            if value.chars().count() > MAX_VALUE_LENGTH {
                violations.push(TagViolation::new(
                    value,
                    format!("value cannot be longer than {MAX_VALUE_LENGTH} characters"),
                ));
            }
            if !has_allowed_characters(value) {
                violations.push(TagViolation::new(
                    value,
                    "value cannot have characters other than alphabets, numbers, spaces and _ . : / = + - @ .",
                ));
            }
        }
        violations
    }
}

impl From<BTreeMap<String, String>> for Tags {
    fn from(map: BTreeMap<String, String>) -> Self {
        Tags(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Tags(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn has_allowed_characters(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_alphanumeric() || c.is_whitespace() || ALLOWED_PUNCTUATION.contains(c))
}

/// Parameters for building the tag set of a resource the operator creates.
#[derive(Debug, Clone)]
pub struct BuildParams {
    /// Cluster the resource belongs to.
    pub cluster_name: String,
    /// Whether the operator owns the resource.
    pub lifecycle: ResourceLifecycle,
    /// Optional `Name` tag.
    pub name: Option<String>,
    /// Optional role tag.
    pub role: Option<String>,
    /// User supplied tags; these never override the ownership tag.
    pub additional: Tags,
}

impl BuildParams {
    /// Params for a resource owned by `cluster_name`.
    pub fn owned(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            lifecycle: ResourceLifecycle::Owned,
            name: None,
            role: None,
            additional: Tags::new(),
        }
    }

    /// Set the `Name` tag.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the role tag.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Add user supplied tags.
    #[must_use]
    pub fn with_additional(mut self, additional: &Tags) -> Self {
        self.additional = additional.clone();
        self
    }

    /// Build the final tag set.
    pub fn build(&self) -> Tags {
        let mut tags = self.additional.clone();
        tags.insert(cluster_tag_key(&self.cluster_name), self.lifecycle.as_str());
        if let Some(name) = &self.name {
            tags.insert(NAME_TAG_KEY, name.clone());
        }
        if let Some(role) = &self.role {
            tags.insert(ROLE_TAG_KEY, role.clone());
        }
        tags
    }
}
