use crate::{Error, ReconcileKey};
use common::Kind;
use prometheus_client::{
    encoding::{text::encode, EncodeLabelSet},
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};
use std::{collections::BTreeMap, sync::Arc};
use tokio::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    kinds: BTreeMap<Kind, ReconcileMetrics>,
    registry: Arc<Registry>,
}

impl Default for Metrics {
    fn default() -> Self {
        let mut registry = Registry::default();
        let kinds = [Kind::HostedControlPlane, Kind::GuestCluster]
            .into_iter()
            .map(|kind| {
                let sub = registry.sub_registry_with_prefix(format!("{}_reconcile", prefix(kind)));
                (kind, ReconcileMetrics::default().register(sub))
            })
            .collect();
        Self {
            kinds,
            registry: Arc::new(registry),
        }
    }
}

fn prefix(kind: Kind) -> &'static str {
    match kind {
        Kind::Cluster => "cluster",
        Kind::HostedControlPlane => "hosted_control_plane",
        Kind::GuestCluster => "guest_cluster",
        Kind::MachineSet => "machine_set",
    }
}

impl Metrics {
    /// Metrics of a reconciled kind
    ///
    /// Kinds that are only read get a detached set that is never exported.
    pub fn kind(&self, kind: Kind) -> ReconcileMetrics {
        self.kinds.get(&kind).cloned().unwrap_or_default()
    }

    /// Render the registry in the OpenMetrics text format
    pub fn encode(&self) -> Result<String, Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry).map_err(|e| Error::Other(e.to_string()))?;
        Ok(buffer)
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub instance: String,
    pub error: String,
}

#[derive(Clone)]
pub struct ReconcileMetrics {
    pub runs: Counter,
    pub failures: Family<ErrorLabels, Counter>,
    pub duration: Histogram,
}

impl Default for ReconcileMetrics {
    fn default() -> Self {
        Self {
            runs: Counter::default(),
            failures: Family::<ErrorLabels, Counter>::default(),
            duration: Histogram::new([0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60.].into_iter()),
        }
    }
}

impl ReconcileMetrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, r: &mut Registry) -> Self {
        r.register_with_unit("duration", "reconcile duration", Unit::Seconds, self.duration.clone());
        r.register("failures", "reconciliation errors", self.failures.clone());
        r.register("runs", "reconciliations", self.runs.clone());
        self
    }

    pub fn reconcile_failure(&self, key: &ReconcileKey, e: &Error) {
        self.failures
            .get_or_create(&ErrorLabels {
                instance: key.to_string(),
                error: e.metric_label(),
            })
            .inc();
    }

    pub fn count_and_measure(&self) -> ReconcileMeasurer {
        self.runs.inc();
        ReconcileMeasurer {
            start: Instant::now(),
            metric: self.duration.clone(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct ReconcileMeasurer {
    start: Instant,
    metric: Histogram,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.observe(duration);
    }
}
