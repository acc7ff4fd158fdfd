use crate::{
    events,
    owner::{is_paused, resolve_owner},
    patch::Patcher,
    Context, Outcome, ReconcileKey, Reconciler, Result,
};
use async_trait::async_trait;
use common::Kind;
use kube::Resource;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Drives a HostedControlPlane to ready by running the installer once
pub struct ControlPlaneReconciler {
    ctx: Arc<Context>,
}

impl ControlPlaneReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for ControlPlaneReconciler {
    fn kind(&self) -> Kind {
        Kind::HostedControlPlane
    }

    #[instrument(skip(self), fields(kind = "HostedControlPlane"))]
    async fn reconcile(&self, key: &ReconcileKey) -> Result<Outcome> {
        let store = self.ctx.store.as_ref();
        let Some(mut hcp) = store.get_control_plane(&key.namespace, &key.name).await? else {
            debug!("HostedControlPlane {key} not found");
            return Ok(Outcome::Settled);
        };

        let Some(cluster) = resolve_owner(store, &hcp.metadata).await? else {
            info!("Cluster Controller has not yet set OwnerRef on {key}");
            return Ok(Outcome::Settled);
        };
        if is_paused(&cluster, &hcp.metadata) {
            info!("HostedControlPlane {key} or linked Cluster is marked as paused. Won't reconcile");
            return Ok(Outcome::Settled);
        }
        if hcp.metadata.deletion_timestamp.is_some() {
            info!("HostedControlPlane {key} is being deleted, deletion is not handled");
        }
        if hcp.is_ready() {
            debug!("HostedControlPlane {key} already ready");
            return Ok(Outcome::Settled);
        }

        let patcher = Patcher::snapshot(Kind::HostedControlPlane, &hcp)?;
        info!("HostedControlPlane {key} is not ready, running installer");
        self.ctx.installer.install(key).await?;

        hcp.set_ready();
        patcher.apply(store, &hcp).await?;
        info!("Successfully reconciled HostedControlPlane {key}");

        let oref = hcp.object_ref(&());
        events::publish(store, &oref, events::from_install(&key.name)).await;
        events::publish(store, &oref, events::from_ready(Kind::HostedControlPlane.as_str(), &key.name)).await;
        Ok(Outcome::Settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{installer::MockInstaller, store::{MockObjectStore, PatchScope}, Error};
    use common::{
        cluster::ClusterSpec,
        hostedcontrolplane::{HostedControlPlaneSpec, HostedControlPlaneStatus},
        Cluster, HostedControlPlane, PAUSED_ANNOTATION,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use mockall::predicate::eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn key() -> ReconcileKey {
        ReconcileKey::new("clusters", "cp1")
    }

    fn control_plane(ready: bool, owned: bool) -> HostedControlPlane {
        let mut hcp = HostedControlPlane::new("cp1", HostedControlPlaneSpec {
            base_domain: "example.com".to_string(),
            version: Some("4.8".to_string()),
            ..Default::default()
        });
        hcp.metadata.namespace = Some("clusters".to_string());
        hcp.metadata.resource_version = Some("1".to_string());
        if owned {
            hcp.metadata.owner_references = Some(vec![OwnerReference {
                api_version: "cluster.x-k8s.io/v1alpha4".to_string(),
                kind: "Cluster".to_string(),
                name: "example".to_string(),
                uid: "uid-1".to_string(),
                ..OwnerReference::default()
            }]);
        }
        hcp.status = Some(HostedControlPlaneStatus {
            ready,
            ..Default::default()
        });
        hcp
    }

    fn store_with(hcp: HostedControlPlane, cluster: Cluster) -> MockObjectStore {
        let mut store = MockObjectStore::new();
        store
            .expect_get_control_plane()
            .with(eq("clusters"), eq("cp1"))
            .returning(move |_, _| Ok(Some(hcp.clone())));
        store
            .expect_get_cluster()
            .with(eq("clusters"), eq("example"))
            .returning(move |_, _| Ok(Some(cluster.clone())));
        store
    }

    fn cluster() -> Cluster {
        let mut c = Cluster::new("example", ClusterSpec::default());
        c.metadata.namespace = Some("clusters".to_string());
        c
    }

    async fn run(store: MockObjectStore, installer: MockInstaller) -> Result<Outcome> {
        let ctx = Context::for_testing(store, installer);
        ControlPlaneReconciler::new(ctx).reconcile(&key()).await
    }

    #[tokio::test]
    async fn missing_object_is_settled() {
        let mut store = MockObjectStore::new();
        store.expect_get_control_plane().returning(|_, _| Ok(None));
        let mut installer = MockInstaller::new();
        installer.expect_install().never();
        assert_eq!(run(store, installer).await.unwrap(), Outcome::Settled);
    }

    #[tokio::test]
    async fn unlinked_object_is_left_alone() {
        let hcp = control_plane(false, false);
        let mut store = MockObjectStore::new();
        store.expect_get_control_plane().returning(move |_, _| Ok(Some(hcp.clone())));
        store.expect_get_cluster().never();
        store.expect_patch().never();
        let mut installer = MockInstaller::new();
        installer.expect_install().never();
        assert_eq!(run(store, installer).await.unwrap(), Outcome::Settled);
    }

    #[tokio::test]
    async fn paused_cluster_blocks_everything() {
        let mut c = cluster();
        c.spec.paused = true;
        let mut store = store_with(control_plane(false, true), c);
        store.expect_patch().never();
        store.expect_publish_event().never();
        let mut installer = MockInstaller::new();
        installer.expect_install().never();
        assert_eq!(run(store, installer).await.unwrap(), Outcome::Settled);
    }

    #[tokio::test]
    async fn paused_annotation_blocks_everything() {
        let mut hcp = control_plane(false, true);
        hcp.metadata.annotations = Some(BTreeMap::from([(PAUSED_ANNOTATION.to_string(), "".to_string())]));
        let mut store = store_with(hcp, cluster());
        store.expect_patch().never();
        let mut installer = MockInstaller::new();
        installer.expect_install().never();
        assert_eq!(run(store, installer).await.unwrap(), Outcome::Settled);
    }

    #[tokio::test]
    async fn installer_success_patches_only_ready() {
        let mut store = store_with(control_plane(false, true), cluster());
        store
            .expect_patch()
            .withf(|kind, ns, name, scope, rv, diff| {
                *kind == Kind::HostedControlPlane
                    && ns == "clusters"
                    && name == "cp1"
                    && *scope == PatchScope::Status
                    && rv.as_deref() == Some("1")
                    && *diff == json!({"status": {"ready": true}})
            })
            .times(1)
            .returning(|_, _, _, _, _, _| Ok(Some("2".to_string())));
        store.expect_publish_event().times(2).returning(|_, _| Ok(()));
        let mut installer = MockInstaller::new();
        installer
            .expect_install()
            .with(eq(key()))
            .times(1)
            .returning(|_| Ok(()));
        assert_eq!(run(store, installer).await.unwrap(), Outcome::Settled);
    }

    #[tokio::test]
    async fn installer_failure_leaves_status_alone() {
        let mut store = store_with(control_plane(false, true), cluster());
        store.expect_patch().never();
        store.expect_publish_event().never();
        let mut installer = MockInstaller::new();
        installer
            .expect_install()
            .times(1)
            .returning(|k| Err(Error::InstallerFailed(k.to_string(), "BackoffLimitExceeded".to_string())));
        assert!(matches!(run(store, installer).await, Err(Error::InstallerFailed(..))));
    }

    #[tokio::test]
    async fn ready_control_plane_is_idempotent() {
        let mut store = store_with(control_plane(true, true), cluster());
        store.expect_patch().never();
        store.expect_publish_event().never();
        let mut installer = MockInstaller::new();
        installer.expect_install().never();
        let ctx = Context::for_testing(store, installer);
        let reconciler = ControlPlaneReconciler::new(ctx);
        for _ in 0..3 {
            assert_eq!(reconciler.reconcile(&key()).await.unwrap(), Outcome::Settled);
        }
    }

    #[tokio::test]
    async fn conflict_is_returned_for_retry() {
        let mut store = store_with(control_plane(false, true), cluster());
        store
            .expect_patch()
            .times(1)
            .returning(|kind, ns, name, _, _, _| Err(Error::Conflict(kind.to_string(), format!("{ns}/{name}"))));
        store.expect_publish_event().never();
        let mut installer = MockInstaller::new();
        installer.expect_install().times(1).returning(|_| Ok(()));
        assert!(matches!(run(store, installer).await, Err(Error::Conflict(..))));
    }

    #[tokio::test]
    async fn event_failure_does_not_fail_reconcile() {
        let mut store = store_with(control_plane(false, true), cluster());
        store.expect_patch().times(1).returning(|_, _, _, _, _, _| Ok(None));
        store
            .expect_publish_event()
            .returning(|_, _| Err(Error::Other("forbidden".to_string())));
        let mut installer = MockInstaller::new();
        installer.expect_install().times(1).returning(|_| Ok(()));
        assert_eq!(run(store, installer).await.unwrap(), Outcome::Settled);
    }
}
