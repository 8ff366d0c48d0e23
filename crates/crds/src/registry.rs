//! Kind registry
//!
//! Explicit table of the kinds this operator serves. It is built once at
//! startup and passed to whoever needs to turn an untyped object into a typed
//! one (the admission server) or print CRDs (`crdgen`).

use crate::eks_control_plane::EksControlPlane;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::{DynamicObject, GroupVersionKind};
use kube::{CustomResourceExt, Resource};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown kind: {0}")]
    UnknownKind(String),

    #[error("Object is missing apiVersion/kind")]
    MissingTypeMeta,

    #[error("Kind mismatch: expected {expected}, got {actual}")]
    KindMismatch { expected: String, actual: String },

    #[error("Failed to decode {kind}: {source}")]
    Decode {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A served kind.
#[derive(Debug, Clone)]
pub struct KindEntry {
    /// Group, version and kind
    pub gvk: GroupVersionKind,
    /// Plural resource name
    pub plural: String,
    /// Versions served by the API server
    pub served_versions: Vec<String>,
    /// Version persisted in etcd
    pub storage_version: String,
    /// Generated CRD
    pub crd: CustomResourceDefinition,
}

/// Registry of served kinds keyed by `group/version/kind`.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: BTreeMap<String, KindEntry>,
}

fn gvk_key(gvk: &GroupVersionKind) -> String {
    format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every kind this operator serves.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register::<EksControlPlane>();
        registry
    }

    /// Register a custom resource kind.
    pub fn register<K>(&mut self)
    where
        K: Resource<DynamicType = ()> + CustomResourceExt,
    {
        let gvk = GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()));
        let version = K::version(&()).into_owned();
        let entry = KindEntry {
            gvk: gvk.clone(),
            plural: K::plural(&()).into_owned(),
            served_versions: vec![version.clone()],
            storage_version: version,
            crd: K::crd(),
        };
        self.entries.insert(gvk_key(&gvk), entry);
    }

    /// Look up a kind.
    pub fn lookup(&self, gvk: &GroupVersionKind) -> Option<&KindEntry> {
        self.entries.get(&gvk_key(gvk))
    }

    /// All registered entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = &KindEntry> {
        self.entries.values()
    }

    /// CRDs of every registered kind.
    pub fn crds(&self) -> Vec<CustomResourceDefinition> {
        self.entries.values().map(|e| e.crd.clone()).collect()
    }

    /// Decode an untyped object into `K`, rejecting unregistered kinds.
    pub fn decode<K>(&self, obj: &DynamicObject) -> Result<K, RegistryError>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let types = obj.types.as_ref().ok_or(RegistryError::MissingTypeMeta)?;
        let gvk = GroupVersionKind::try_from(types).map_err(|_| RegistryError::MissingTypeMeta)?;
        let entry = self
            .lookup(&gvk)
            .ok_or_else(|| RegistryError::UnknownKind(gvk_key(&gvk)))?;

        let expected = K::kind(&());
        if entry.gvk.kind != expected {
            return Err(RegistryError::KindMismatch {
                expected: expected.into_owned(),
                actual: entry.gvk.kind.clone(),
            });
        }

        let value = serde_json::to_value(obj).map_err(|source| RegistryError::Decode {
            kind: entry.gvk.kind.clone(),
            source,
        })?;
        serde_json::from_value(value).map_err(|source| RegistryError::Decode {
            kind: entry.gvk.kind.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::{ApiResource, TypeMeta};

    fn dynamic(api_version: &str, kind: &str, spec: serde_json::Value) -> DynamicObject {
        let gvk = GroupVersionKind::gvk("controlplane.cluster.x-k8s.io", "v1beta2", kind);
        let mut obj = DynamicObject::new("cp", &ApiResource::from_gvk(&gvk)).within("default");
        obj.types = Some(TypeMeta {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
        });
        obj.data = serde_json::json!({ "spec": spec });
        obj
    }

    #[test]
    fn test_defaults_register_control_plane() {
        let registry = Registry::with_defaults();
        let gvk = GroupVersionKind::gvk("controlplane.cluster.x-k8s.io", "v1beta2", "EKSControlPlane");
        let entry = registry.lookup(&gvk).unwrap();
        assert_eq!(entry.plural, "ekscontrolplanes");
        assert_eq!(entry.storage_version, "v1beta2");
        assert_eq!(registry.crds().len(), 1);
    }

    #[test]
    fn test_decode_known_kind() {
        let registry = Registry::with_defaults();
        let obj = dynamic(
            "controlplane.cluster.x-k8s.io/v1beta2",
            "EKSControlPlane",
            serde_json::json!({ "region": "us-east-1", "version": "v1.29" }),
        );
        let cp: EksControlPlane = registry.decode(&obj).unwrap();
        assert_eq!(cp.spec.region, "us-east-1");
        assert_eq!(cp.spec.version.as_deref(), Some("v1.29"));
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let registry = Registry::with_defaults();
        let obj = dynamic(
            "controlplane.cluster.x-k8s.io/v1beta2",
            "ROSAControlPlane",
            serde_json::json!({}),
        );
        let err = registry.decode::<EksControlPlane>(&obj).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownKind(_)));
    }
}
