//! EKS Operator CRD Definitions
//!
//! Custom resource types, the ownership tag model, status conditions and the
//! kind registry shared by the controller and the admission webhook.

pub mod conditions;
pub mod eks_control_plane;
pub mod network;
pub mod references;
pub mod registry;
pub mod tags;

pub use conditions::{Condition, ConditionSeverity, ConditionStatus, Conditions};
pub use eks_control_plane::*;
pub use network::*;
pub use references::*;
pub use registry::{KindEntry, Registry, RegistryError};
pub use tags::{BuildParams, ResourceLifecycle, TagViolation, Tags};
