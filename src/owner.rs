//! Owner references between replicas and their copies
//!
//! A copy points back at its ConfigMapReplica through an `OwnerReference`
//! with `controller=true` and `blockOwnerDeletion=true`, so the API server's
//! garbage collector removes copies when the replica is deleted. The
//! reference is plain metadata; nothing here dereferences it.
//!
//! Kinds must be registered in a [`TypeScheme`] before they can take part in
//! an owner link. The scheme is built once at startup and handed to the
//! controller context.

use std::collections::BTreeSet;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

use crate::Error;

/// Registry of kinds the controller may link with owner references
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeScheme {
    kinds: BTreeSet<(String, String)>,
}

impl TypeScheme {
    /// Create an empty scheme
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a statically-typed kind and return self for chaining
    pub fn register<K>(mut self) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        self.kinds.insert(gvk_of::<K>());
        self
    }

    /// Scheme containing the kinds the replicator links: ConfigMapReplica
    /// owners and ConfigMap dependents
    pub fn replicator() -> Self {
        Self::new()
            .register::<crate::crd::ConfigMapReplica>()
            .register::<k8s_openapi::api::core::v1::ConfigMap>()
    }

    /// Whether `K` has been registered
    pub fn is_registered<K>(&self) -> bool
    where
        K: Resource<DynamicType = ()>,
    {
        self.kinds.contains(&gvk_of::<K>())
    }

    /// Make `owner` the controlling owner of `dependent`.
    ///
    /// Fails when either kind is unregistered, when the owner has no uid
    /// (it was never persisted), when a namespaced owner lives in a different
    /// namespace than the dependent, or when the dependent is already
    /// controlled by a different owner. An existing reference to the same
    /// owner is replaced, so the call is idempotent.
    pub fn set_controller_reference<O, D>(&self, owner: &O, dependent: &mut D) -> Result<(), Error>
    where
        O: Resource<DynamicType = ()>,
        D: Resource<DynamicType = ()>,
    {
        let owner_kind = O::kind(&()).to_string();
        let dependent_kind = D::kind(&()).to_string();

        if !self.is_registered::<O>() {
            return Err(Error::owner_link(
                owner_kind,
                "owner kind is not registered in the type scheme",
            ));
        }
        if !self.is_registered::<D>() {
            return Err(Error::owner_link(
                dependent_kind,
                "dependent kind is not registered in the type scheme",
            ));
        }

        if let Some(owner_ns) = owner.meta().namespace.as_deref() {
            if dependent.meta().namespace.as_deref() != Some(owner_ns) {
                return Err(Error::owner_link(
                    owner_kind,
                    format!(
                        "namespaced owner in '{owner_ns}' cannot own objects in other namespaces"
                    ),
                ));
            }
        }

        let mut reference = owner
            .controller_owner_ref(&())
            .ok_or_else(|| Error::owner_link(owner_kind.clone(), "owner has no name or uid"))?;
        reference.block_owner_deletion = Some(true);

        let refs = dependent.meta_mut().owner_references.get_or_insert_with(Vec::new);

        if let Some(existing) = refs
            .iter()
            .find(|r| r.controller == Some(true) && r.uid != reference.uid)
        {
            return Err(Error::owner_link(
                dependent_kind,
                format!("already controlled by {} {}", existing.kind, existing.name),
            ));
        }

        refs.retain(|r| r.uid != reference.uid);
        refs.push(reference);
        Ok(())
    }
}

/// Whether `refs` contains a controller reference to the owner with `uid`
pub fn is_controlled_by(refs: Option<&[OwnerReference]>, uid: &str) -> bool {
    refs.is_some_and(|refs| {
        refs.iter()
            .any(|r| r.uid == uid && r.controller == Some(true))
    })
}

fn gvk_of<K: Resource<DynamicType = ()>>() -> (String, String) {
    (K::api_version(&()).to_string(), K::kind(&()).to_string())
}
