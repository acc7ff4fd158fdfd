use crate::{
    events,
    owner::{is_paused, resolve_owner},
    patch::Patcher,
    Context, Error, Outcome, ReconcileKey, Reconciler, Result,
};
use async_trait::async_trait;
use common::{machineset::pick_template, Kind};
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Drives a GuestCluster to ready once its control plane is ready
///
/// The compute MachineSet is derived from an existing one in the machine
/// namespace and created on the not-ready to ready transition only.
pub struct GuestClusterReconciler {
    ctx: Arc<Context>,
}

impl GuestClusterReconciler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Reconciler for GuestClusterReconciler {
    fn kind(&self) -> Kind {
        Kind::GuestCluster
    }

    #[instrument(skip(self), fields(kind = "GuestCluster"))]
    async fn reconcile(&self, key: &ReconcileKey) -> Result<Outcome> {
        let store = self.ctx.store.as_ref();
        let Some(mut gc) = store.get_guest_cluster(&key.namespace, &key.name).await? else {
            info!("GuestCluster {key} not found");
            return Ok(Outcome::Settled);
        };

        let Some(cluster) = resolve_owner(store, &gc.metadata).await? else {
            info!("Cluster Controller has not yet set OwnerRef on {key}");
            return Ok(Outcome::Settled);
        };
        if is_paused(&cluster, &gc.metadata) {
            info!("GuestCluster {key} or linked Cluster is marked as paused. Won't reconcile");
            return Ok(Outcome::Settled);
        }
        if gc.metadata.deletion_timestamp.is_some() {
            info!("GuestCluster {key} is being deleted, deletion is not handled");
        }
        // the ready flag alone guards the MachineSet creation below
        if gc.is_ready() {
            debug!("GuestCluster {key} already ready");
            return Ok(Outcome::Settled);
        }

        let Some(cp_name) = cluster.control_plane_name() else {
            info!("Cluster {} has no controlPlaneRef yet. Requeuing", cluster.name_any());
            return Ok(Outcome::Requeue);
        };
        let Some(hcp) = store.get_control_plane(&key.namespace, cp_name).await? else {
            info!("HostedControlPlane {}/{cp_name} not found yet. Requeuing", key.namespace);
            return Ok(Outcome::Requeue);
        };
        if !hcp.is_ready() {
            info!("Control plane {cp_name} is not ready yet. Requeuing");
            return Ok(Outcome::Requeue);
        }

        let patcher = Patcher::snapshot(Kind::GuestCluster, &gc)?;
        let namespace = &self.ctx.machine_namespace;
        let templates = store.list_machine_sets(namespace).await?;
        let Some(template) = pick_template(&templates) else {
            info!("No MachineSet in {namespace} to use as a template yet");
            return Ok(Outcome::Settled);
        };
        debug!("Using MachineSet {namespace}/{} as template", template.name_any());
        let machine_set = template.derive_compute(&hcp, &gc, namespace)?;

        let oref = gc.object_ref(&());
        match store.create_machine_set(&machine_set).await {
            Ok(created) => {
                info!("Created MachineSet {namespace}/{} for {key}", created.name_any());
                let ev = events::from_create(
                    Kind::GuestCluster.as_str(),
                    &key.name,
                    Kind::MachineSet.as_str(),
                    &created.name_any(),
                    Some(created.object_ref(&())),
                );
                events::publish(store, &oref, ev).await;
            }
            // an earlier attempt may have created it without recording ready
            Err(Error::AlreadyExists(kind, existing)) => {
                match store.get_machine_set(namespace, &machine_set.name_any()).await? {
                    Some(current) if current.is_compute_pool_of(&hcp, &gc) => {
                        warn!("MachineSet {existing} already exists for {key}, adopting it");
                    }
                    _ => {
                        warn!("MachineSet {existing} exists and is not the compute pool of {key}");
                        return Err(Error::AlreadyExists(kind, existing));
                    }
                }
            }
            Err(e) => return Err(e),
        }

        gc.set_ready();
        patcher.apply(store, &gc).await?;
        info!("Successfully reconciled GuestCluster {key}");
        events::publish(store, &oref, events::from_ready(Kind::GuestCluster.as_str(), &key.name)).await;
        Ok(Outcome::Settled)
    }
}
