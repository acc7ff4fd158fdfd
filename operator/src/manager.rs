use crate::{
    backoff::Backoff,
    config::Parameters,
    controlplane::ControlPlaneReconciler,
    guestcluster::GuestClusterReconciler,
    installer::{Installer, JobInstaller},
    metrics::ReconcileMetrics,
    store::{KubeStore, ObjectStore},
    Error, Metrics, Outcome, ReconcileKey, Reconciler, Result,
};
use chrono::{DateTime, Utc};
use common::{Cluster, GuestCluster, HostedControlPlane, Kind, Scheme};
use futures::{future::BoxFuture, FutureExt, StreamExt};
use kube::{
    api::{Api, DynamicObject, ListParams},
    client::Client,
    runtime::{
        controller::{self, Action, Controller},
        reflector::{self, ObjectRef, Store},
        watcher::{self, Config},
        WatchStreamExt,
    },
    Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt::Debug, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tracing::{info, warn};

// Context for our reconcilers
pub struct Context {
    /// Object store, the Kubernetes API in production
    pub store: Arc<dyn ObjectStore>,
    /// Control plane provisioning step
    pub installer: Arc<dyn Installer>,
    /// Namespace of the template and derived MachineSets
    pub machine_namespace: String,
}

#[cfg(test)]
impl Context {
    pub fn for_testing(
        store: crate::store::MockObjectStore,
        installer: crate::installer::MockInstaller,
    ) -> Arc<Self> {
        Arc::new(Self {
            store: Arc::new(store),
            installer: Arc::new(installer),
            machine_namespace: "openshift-machine-api".to_string(),
        })
    }
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self { last_event: Utc::now() }
    }
}

/// Runs one reconciler under a kube `Controller`
///
/// Turns the reconciler outcome into a requeue action, with per-key backoff.
struct Driver {
    reconciler: Arc<dyn Reconciler>,
    backoff: Backoff,
    sync_period: Duration,
    metrics: ReconcileMetrics,
    diagnostics: Arc<RwLock<Diagnostics>>,
}

impl Driver {
    fn action(&self, key: &ReconcileKey, outcome: Outcome) -> Action {
        match outcome {
            Outcome::Settled => {
                self.backoff.reset(key);
                Action::requeue(self.sync_period)
            }
            Outcome::Requeue => Action::requeue(self.backoff.next(key)),
            Outcome::RequeueAfter(after) => Action::requeue(after),
        }
    }
}

async fn reconcile<K: Resource>(obj: Arc<K>, driver: Arc<Driver>) -> Result<Action> {
    driver.diagnostics.write().await.last_event = Utc::now();
    // the watched copy only provides the key, reconcilers read the object again
    let key = ReconcileKey::from_object(obj.as_ref())?;
    let _measure = driver.metrics.count_and_measure();
    let outcome = driver.reconciler.reconcile(&key).await?;
    Ok(driver.action(&key, outcome))
}

fn error_policy<K: Resource>(obj: Arc<K>, error: &Error, driver: Arc<Driver>) -> Action {
    let kind = driver.reconciler.kind();
    match ReconcileKey::from_object(obj.as_ref()) {
        Ok(key) => {
            warn!("reconcile failed for {kind} {key}: {error}");
            driver.metrics.reconcile_failure(&key, error);
            Action::requeue(driver.backoff.next(&key))
        }
        Err(e) => {
            warn!("reconcile failed for {kind} without a key: {e}");
            Action::requeue(driver.sync_period)
        }
    }
}

fn watch_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn run_controller<K>(controller: Controller<K>, driver: Arc<Driver>, concurrency: u16) -> BoxFuture<'static, ()>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    controller
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, driver)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .boxed()
}

/// Control plane referenced by a Cluster
fn control_plane_of(cluster: &Cluster) -> Option<ObjectRef<HostedControlPlane>> {
    let namespace = cluster.namespace()?;
    Some(ObjectRef::new(cluster.control_plane_name()?).within(&namespace))
}

/// GuestCluster a Cluster uses as infrastructure
fn guest_of(cluster: &Cluster) -> Option<ObjectRef<GuestCluster>> {
    let namespace = cluster.namespace()?;
    Some(ObjectRef::new(cluster.guest_cluster_name()?).within(&namespace))
}

/// GuestClusters waiting on `hcp`, found through the Clusters linking both
fn guests_of(hcp: &HostedControlPlane, clusters: &[Arc<Cluster>]) -> Vec<ObjectRef<GuestCluster>> {
    let namespace = hcp.namespace();
    let name = hcp.name_any();
    clusters
        .iter()
        .filter(|c| c.namespace() == namespace && c.control_plane_name() == Some(name.as_str()))
        .filter_map(|c| guest_of(c))
        .collect()
}

/// Cache of the watched Clusters, with the future that keeps it current
fn cluster_cache(client: &Client, namespace: Option<&str>) -> (Store<Cluster>, BoxFuture<'static, ()>) {
    let (reader, writer) = reflector::store::<Cluster>();
    let stream = watcher::watcher(watch_api::<Cluster>(client, namespace), Config::default()).default_backoff();
    let driver = reflector::reflector(writer, stream)
        .applied_objects()
        .for_each(|_| futures::future::ready(()))
        .boxed();
    (reader, driver)
}

/// Data owned by the Manager
#[derive(Clone, Default)]
pub struct Manager {
    /// Diagnostics populated by the reconcilers
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    metrics: Metrics,
}

/// Manager that owns a Controller per reconciled kind
impl Manager {
    /// Lifecycle initialization interface for app
    ///
    /// This returns a `Manager` and one controller future per kind to be awaited,
    /// plus the future filling the Cluster cache.
    /// It is up to `main` to wait for the controller streams.
    pub async fn new(client: Client, params: &Parameters) -> Result<(Self, Vec<(Kind, BoxFuture<'static, ()>)>)> {
        let manager = Manager::default();
        let scheme = Arc::new(Scheme::new());
        ensure_served(&client, &scheme).await?;

        let context = Arc::new(Context {
            store: Arc::new(KubeStore::new(client.clone(), scheme)),
            installer: Arc::new(JobInstaller::new(
                client.clone(),
                params.installer_image.clone(),
                params.installer_timeout(),
            )),
            machine_namespace: params.machine_namespace.clone(),
        });
        let reconcilers: Vec<Arc<dyn Reconciler>> = vec![
            Arc::new(ControlPlaneReconciler::new(context.clone())),
            Arc::new(GuestClusterReconciler::new(context)),
        ];

        let namespace = params.watch_namespace();
        let (clusters, cluster_driver) = cluster_cache(&client, namespace);
        let mut controllers = Vec::with_capacity(reconcilers.len() + 1);
        controllers.push((Kind::Cluster, cluster_driver));
        for reconciler in reconcilers {
            let kind = reconciler.kind();
            let driver = Arc::new(Driver {
                reconciler,
                backoff: Backoff::new(params.backoff()),
                sync_period: params.sync_period(),
                metrics: manager.metrics.kind(kind),
                diagnostics: manager.diagnostics.clone(),
            });
            // Cluster changes (pause, links) retrigger the objects they point at
            let controller = match kind {
                Kind::HostedControlPlane => run_controller(
                    Controller::new(watch_api::<HostedControlPlane>(&client, namespace), Config::default().any_semantic())
                        .watches(watch_api::<Cluster>(&client, namespace), Config::default(), |c| control_plane_of(&c)),
                    driver,
                    params.concurrency,
                ),
                Kind::GuestCluster => {
                    let clusters = clusters.clone();
                    run_controller(
                        Controller::new(watch_api::<GuestCluster>(&client, namespace), Config::default().any_semantic())
                            .watches(watch_api::<Cluster>(&client, namespace), Config::default(), |c| guest_of(&c))
                            .watches(
                                watch_api::<HostedControlPlane>(&client, namespace),
                                Config::default(),
                                move |hcp| guests_of(&hcp, &clusters.state()),
                            ),
                        driver,
                        params.concurrency,
                    )
                }
                other => return Err(Error::Other(format!("{other} is not a reconciled kind"))),
            };
            info!("Starting {kind} controller");
            controllers.push((kind, controller));
        }
        Ok((manager, controllers))
    }

    /// Metrics getter
    pub fn metrics(&self) -> Result<String> {
        self.metrics.encode()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }
}

/// Ensure every kind is served before loop-watching
async fn ensure_served(client: &Client, scheme: &Scheme) -> Result<()> {
    for (kind, ar) in scheme.iter() {
        let api: Api<DynamicObject> = Api::all_with(client.clone(), ar);
        if let Err(e) = api.list(&ListParams::default().limit(1)).await {
            let hint = if kind.is_owned() {
                "is the crd installed? please run: cargo run --bin crdgen | kubectl apply -f -"
            } else {
                "is the provider installed?"
            };
            return Err(Error::Other(format!("{kind} ({}) is not served: {e}, {hint}", ar.api_version)));
        }
    }
    Ok(())
}
