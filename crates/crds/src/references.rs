//! Identity references
//!
//! Points a control plane at the principal whose credentials the operator uses
//! when calling AWS on its behalf.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of the cluster-wide controller identity.
pub const CONTROLLER_IDENTITY_KIND: &str = "AWSClusterControllerIdentity";

/// Name of the singleton controller identity.
pub const DEFAULT_IDENTITY_NAME: &str = "default";

/// Reference to the identity used for AWS API calls.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRef {
    /// Kind of the identity, e.g. "AWSClusterControllerIdentity" or "AWSClusterRoleIdentity"
    pub kind: String,

    /// Name of the identity
    pub name: String,
}

impl IdentityRef {
    /// Reference to the controller's own identity.
    pub fn controller_default() -> Self {
        Self {
            kind: CONTROLLER_IDENTITY_KIND.to_string(),
            name: DEFAULT_IDENTITY_NAME.to_string(),
        }
    }
}
