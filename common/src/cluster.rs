use crate::PAUSED_ANNOTATION;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};

/// Cluster-API `Cluster`, read-only from this operator's point of view
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default)]
#[kube(
    kind = "Cluster",
    group = "cluster.x-k8s.io",
    version = "v1alpha4",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Paused can be used to prevent controllers from processing the Cluster and all its associated objects
    #[serde(default)]
    pub paused: bool,
    /// Reference to the provider-specific control plane object
    pub control_plane_ref: Option<ObjectReference>,
    /// Reference to the provider-specific infrastructure object
    pub infrastructure_ref: Option<ObjectReference>,
    /// Endpoint used to communicate with the control plane
    pub control_plane_endpoint: Option<ApiEndpoint>,
}

/// ApiEndpoint represents a reachable Kubernetes API endpoint
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    /// The hostname on which the API server is serving
    #[serde(default)]
    pub host: String,
    /// The port on which the API server is serving
    #[serde(default)]
    pub port: i32,
}

impl Cluster {
    pub fn is_paused(&self) -> bool {
        self.spec.paused || self.annotations().contains_key(PAUSED_ANNOTATION)
    }

    /// Name of the linked control plane, if the Cluster controller has set one
    pub fn control_plane_name(&self) -> Option<&str> {
        self.spec
            .control_plane_ref
            .as_ref()
            .and_then(|r| r.name.as_deref())
            .filter(|n| !n.is_empty())
    }

    /// Name of the GuestCluster this Cluster uses as infrastructure
    pub fn guest_cluster_name(&self) -> Option<&str> {
        self.spec
            .infrastructure_ref
            .as_ref()
            .filter(|r| r.kind.as_deref() == Some("GuestCluster"))
            .and_then(|r| r.name.as_deref())
            .filter(|n| !n.is_empty())
    }
}
