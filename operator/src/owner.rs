use crate::{store::ObjectStore, Error, Result};
use common::{Cluster, Kind, PAUSED_ANNOTATION};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use tracing::debug;

fn is_cluster_ref(owner: &OwnerReference) -> bool {
    owner.kind == Kind::Cluster.as_str()
        && owner.api_version.split('/').next() == Some(&*Cluster::group(&()))
}

/// Find the Cluster owning `meta`
///
/// `None` until an upstream controller has linked the object. A dangling
/// reference is reported as an error so the key is retried.
pub async fn resolve_owner(store: &dyn ObjectStore, meta: &ObjectMeta) -> Result<Option<Cluster>> {
    let Some(owner) = meta.owner_references.iter().flatten().find(|o| is_cluster_ref(o)) else {
        return Ok(None);
    };
    let ns = meta.namespace.as_deref().ok_or(Error::MissingObjectKey("namespace"))?;
    debug!(namespace = ns, cluster = %owner.name, "resolving owner Cluster");
    store
        .get_cluster(ns, &owner.name)
        .await?
        .map(Some)
        .ok_or_else(|| Error::Other(format!("owner Cluster {ns}/{} not found", owner.name)))
}

/// Whether the Cluster or the object itself asks for reconciliation to stop
pub fn is_paused(cluster: &Cluster, meta: &ObjectMeta) -> bool {
    cluster.is_paused()
        || meta
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(PAUSED_ANNOTATION))
}
