use async_trait::async_trait;
use common::Kind;
use kube::Resource;
use std::{fmt, time::Duration};

pub use common::{Error, Result};

/// Identity of the object a reconcile runs for
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReconcileKey {
    pub namespace: String,
    pub name: String,
}

impl ReconcileKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn from_object<K: Resource>(obj: &K) -> Result<Self> {
        let meta = obj.meta();
        Ok(Self {
            namespace: meta.namespace.clone().ok_or(Error::MissingObjectKey("namespace"))?,
            name: meta.name.clone().ok_or(Error::MissingObjectKey("name"))?,
        })
    }
}

impl fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// What the scheduler should do with a key once a reconcile returned without error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing left to do until the next observed change
    Settled,
    /// A dependency is not ready yet, retry with backoff
    Requeue,
    RequeueAfter(Duration),
}

/// One reconciler per kind, driven by the manager
#[async_trait]
pub trait Reconciler: Send + Sync {
    fn kind(&self) -> Kind;
    async fn reconcile(&self, key: &ReconcileKey) -> Result<Outcome>;
}

/// Field manager and event reporter name
pub static OPERATOR: &str = "hosted-capi-controller";
pub static INSTALLER_IMAGE: &str = "quay.io/openshift-hive/hypershift-installer:latest";

pub mod backoff;
pub mod config;
pub mod controlplane;
pub mod events;
pub mod guestcluster;
pub mod installer;
pub mod owner;
pub mod patch;
pub mod store;

/// State machinery for kube, as exposeable to actix
pub mod manager;
pub use manager::{Context, Manager};

/// Metrics
mod metrics;
pub use metrics::Metrics;
