use crate::{Error, GuestCluster, HostedControlPlane, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub static MACHINESET_LABEL: &str = "machine.openshift.io/cluster-api-machineset";
pub static MACHINE_ROLE_LABEL: &str = "machine.openshift.io/cluster-api-machine-role";
pub static COMPUTE_ROLE: &str = "compute";
/// Records which GuestCluster a derived MachineSet was created for
pub static GUEST_CLUSTER_ANNOTATION: &str = "hypershift.openshift.io/guest-cluster";

/// Machine-API `MachineSet`, used both as a configuration template and as the derived compute pool
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default)]
#[kube(
    kind = "MachineSet",
    group = "machine.openshift.io",
    version = "v1beta1",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSetSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default)]
    pub selector: LabelSelector,
    #[serde(default)]
    pub template: MachineTemplateSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct MachineTemplateSpec {
    #[serde(default)]
    pub metadata: MachineTemplateMeta,
    #[serde(default)]
    pub spec: MachineSpec,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct MachineTemplateMeta {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    #[serde(default)]
    pub provider_spec: ProviderSpec,
}

/// Provider-specific machine configuration, kept opaque
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProviderSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Labels selecting the compute machines of a guest cluster
pub fn compute_labels(guest_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (MACHINESET_LABEL.to_string(), guest_name.to_string()),
        (MACHINE_ROLE_LABEL.to_string(), COMPUTE_ROLE.to_string()),
    ])
}

fn guest_key(guest: &GuestCluster) -> String {
    match guest.namespace() {
        Some(ns) => format!("{ns}/{}", guest.name_any()),
        None => guest.name_any(),
    }
}

/// Choose the MachineSet whose provider configuration is copied.
///
/// List order is not stable across calls, the lowest name wins.
pub fn pick_template(candidates: &[MachineSet]) -> Option<&MachineSet> {
    candidates.iter().min_by(|a, b| a.name_any().cmp(&b.name_any()))
}

impl MachineSet {
    /// Build the compute MachineSet of `guest` from the provider configuration of `self`
    pub fn derive_compute(
        &self,
        control_plane: &HostedControlPlane,
        guest: &GuestCluster,
        namespace: &str,
    ) -> Result<MachineSet> {
        let mut provider = self
            .spec
            .template
            .spec
            .provider_spec
            .value
            .clone()
            .ok_or_else(|| Error::InvalidTemplate(self.name_any(), "providerSpec.value is empty".to_string()))?;
        let config = provider.as_object_mut().ok_or_else(|| {
            Error::InvalidTemplate(self.name_any(), "providerSpec.value is not an object".to_string())
        })?;
        let secret_name = Value::String(control_plane.user_data_secret_name());
        match config.get_mut("userDataSecret").and_then(Value::as_object_mut) {
            Some(secret) => {
                secret.insert("name".to_string(), secret_name);
            }
            None => {
                config.insert("userDataSecret".to_string(), serde_json::json!({ "name": secret_name }));
            }
        }

        let name = guest.name_any();
        let mut ms = MachineSet::new(&name, MachineSetSpec {
            replicas: Some(guest.spec.initial_replicas),
            selector: LabelSelector {
                match_labels: Some(compute_labels(&name)),
                ..LabelSelector::default()
            },
            template: MachineTemplateSpec {
                metadata: MachineTemplateMeta {
                    labels: compute_labels(&name),
                },
                spec: MachineSpec {
                    provider_spec: ProviderSpec { value: Some(provider) },
                },
            },
        });
        ms.metadata.namespace = Some(namespace.to_string());
        ms.annotations_mut()
            .insert(GUEST_CLUSTER_ANNOTATION.to_string(), guest_key(guest));
        Ok(ms)
    }

    /// Whether `self` is the compute pool `derive_compute` builds for `guest` on `control_plane`
    ///
    /// Only the identifying parts are compared: selector, user-data secret and guest annotation.
    pub fn is_compute_pool_of(&self, control_plane: &HostedControlPlane, guest: &GuestCluster) -> bool {
        let secret = control_plane.user_data_secret_name();
        self.spec.selector.match_labels.as_ref() == Some(&compute_labels(&guest.name_any()))
            && self.user_data_secret() == Some(secret.as_str())
            && self.annotations().get(GUEST_CLUSTER_ANNOTATION) == Some(&guest_key(guest))
    }

    pub fn user_data_secret(&self) -> Option<&str> {
        self.spec
            .template
            .spec
            .provider_spec
            .value
            .as_ref()?
            .get("userDataSecret")?
            .get("name")?
            .as_str()
    }
}
