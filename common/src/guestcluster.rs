use crate::cluster::ApiEndpoint;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Host published as the control plane endpoint until it can be inferred from the HostedControlPlane
pub static PLACEHOLDER_ENDPOINT_HOST: &str = "fake";
pub const PLACEHOLDER_ENDPOINT_PORT: i32 = 1234;

/// Generate the Kubernetes wrapper struct `GuestCluster` from our Spec and Status struct
///
/// This provides a hook for generating the CRD yaml (in crdgen.rs)
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    kind = "GuestCluster",
    group = "hypershift.openshift.io",
    version = "v1alpha4",
    namespaced,
    status = "GuestClusterStatus",
    shortname = "gc",
    shortname = "gcs",
    category = "cluster-api",
    doc = "Workload-side infrastructure of a Cluster",
    printcolumn = r#"
    {"name":"Replicas", "type":"integer", "description":"Initial compute replicas", "jsonPath":".spec.initialReplicas"},
    {"name":"Endpoint", "type":"string",  "description":"Control plane host", "jsonPath":".spec.controlPlaneEndpoint.host"},
    {"name":"Ready",    "type":"boolean", "description":"Infrastructure ready", "jsonPath":".status.ready"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GuestClusterSpec {
    /// Endpoint used to communicate with the control plane
    #[serde(default)]
    pub control_plane_endpoint: ApiEndpoint,
    /// Number of compute machines created once the control plane is ready
    #[serde(default)]
    pub initial_replicas: i32,
}

/// The status object of `GuestCluster`
#[derive(Deserialize, Serialize, Eq, PartialEq, Clone, Debug, Default, JsonSchema)]
pub struct GuestClusterStatus {
    /// Compute infrastructure has been requested and the endpoint published
    #[serde(default)]
    pub ready: bool,
}

impl GuestCluster {
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.ready)
    }

    /// Mark the guest cluster ready and publish the endpoint expected by the Cluster controller
    pub fn set_ready(&mut self) {
        self.status.get_or_insert_with(Default::default).ready = true;
        self.spec.control_plane_endpoint = ApiEndpoint {
            host: PLACEHOLDER_ENDPOINT_HOST.to_string(),
            port: PLACEHOLDER_ENDPOINT_PORT,
        };
    }
}
