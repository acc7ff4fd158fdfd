use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Generate the Kubernetes wrapper struct `HostedControlPlane` from our Spec and Status struct
///
/// This provides a hook for generating the CRD yaml (in crdgen.rs)
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    kind = "HostedControlPlane",
    group = "hypershift.openshift.io",
    version = "v1alpha4",
    namespaced,
    status = "HostedControlPlaneStatus",
    shortname = "hcp",
    shortname = "hcps",
    category = "cluster-api",
    doc = "Managed control plane hosted for a Cluster",
    printcolumn = r#"
    {"name":"Version", "type":"string",  "description":"Desired version", "jsonPath":".spec.version"},
    {"name":"Ready",   "type":"boolean", "description":"API server ready", "jsonPath":".status.ready"},
    {"name":"Failure", "type":"string",  "description":"Terminal failure", "jsonPath":".status.failureMessage"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct HostedControlPlaneSpec {
    pub name: Option<String>,
    /// SSHKey is the public Secure Shell (SSH) key to provide access to instances.
    #[serde(default)]
    pub ssh_key: String,
    pub base_domain: String,
    #[serde(default)]
    pub pull_secret: String,
    pub networking: Option<Networking>,
    /// Desired Kubernetes version
    #[schemars(length(min = 2))]
    pub version: Option<String>,
}

/// Pod network provider in the cluster
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Networking {
    /// Type of network to install, OpenShiftSDN when unset
    #[serde(default = "default_network_type")]
    pub network_type: String,
    /// IP address pools for pods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cluster_network: Vec<ClusterNetworkEntry>,
    /// IP address pools for services, only one entry is supported
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_network: Vec<String>,
}

fn default_network_type() -> String {
    "OpenShiftSDN".to_string()
}

/// A single IP address block for pod IP blocks
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworkEntry {
    /// The IP block address pool
    pub cidr: String,
    /// Prefix size to allocate to each node from the CIDR
    pub host_prefix: i32,
    /// Deprecated block size, in bits
    #[serde(rename = "hostSubnetLength", default, skip_serializing_if = "Option::is_none")]
    pub deprecated_host_subnet_length: Option<i32>,
}

/// The status object of `HostedControlPlane`
#[derive(Deserialize, Serialize, Eq, PartialEq, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HostedControlPlaneStatus {
    /// The API server is ready to receive requests
    #[serde(default)]
    pub ready: bool,
    /// Terminal problem reconciling the state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

impl HostedControlPlane {
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.ready)
    }

    pub fn set_ready(&mut self) {
        self.status.get_or_insert_with(Default::default).ready = true;
    }

    /// Name of the secret holding the compute user-data generated for this control plane
    pub fn user_data_secret_name(&self) -> String {
        format!("{}-user-data", kube::ResourceExt::name_any(self))
    }
}
