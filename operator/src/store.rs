use crate::{Error, OPERATOR, Result};
use async_trait::async_trait;
use common::{Cluster, GuestCluster, HostedControlPlane, Kind, MachineSet, Scheme};
use k8s_openapi::api::core::v1::ObjectReference;
use kube::{
    api::{Api, DynamicObject, ListParams, Patch, PatchParams, PostParams},
    runtime::events::{Event, Recorder, Reporter},
    Client, ResourceExt,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{fmt::Debug, sync::Arc};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

/// Which half of an object a patch targets
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchScope {
    /// metadata and spec
    Main,
    /// the status subresource
    Status,
}

/// Trait abstracting the declarative object store
///
/// This trait allows mocking the Kubernetes API in tests while using
/// the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get a Cluster, `None` when it does not exist
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>>;

    async fn get_control_plane(&self, namespace: &str, name: &str) -> Result<Option<HostedControlPlane>>;

    async fn get_guest_cluster(&self, namespace: &str, name: &str) -> Result<Option<GuestCluster>>;

    async fn get_machine_set(&self, namespace: &str, name: &str) -> Result<Option<MachineSet>>;

    /// List the MachineSets of a namespace, in store order
    async fn list_machine_sets(&self, namespace: &str) -> Result<Vec<MachineSet>>;

    /// Create a MachineSet in its own namespace
    ///
    /// Fails with `Error::AlreadyExists` when the name is taken.
    async fn create_machine_set(&self, machine_set: &MachineSet) -> Result<MachineSet>;

    /// Submit a JSON merge patch
    ///
    /// When `resource_version` is set the store rejects the patch with `Error::Conflict`
    /// if the object changed since that version. Returns the new resource version.
    async fn patch(
        &self,
        kind: Kind,
        namespace: &str,
        name: &str,
        scope: PatchScope,
        resource_version: Option<String>,
        diff: &Value,
    ) -> Result<Option<String>>;

    /// Publish a Kubernetes Event about `reference`
    async fn publish_event(&self, reference: &ObjectReference, event: &Event) -> Result<()>;
}

/// Real Kubernetes implementation of the object store
pub struct KubeStore {
    client: Client,
    scheme: Arc<Scheme>,
    reporter: Reporter,
}

impl KubeStore {
    pub fn new(client: Client, scheme: Arc<Scheme>) -> Self {
        Self {
            client,
            scheme,
            reporter: get_reporter(),
        }
    }

    async fn get_opt<K>(&self, namespace: &str, name: &str) -> Result<Option<K>>
    where
        K: kube::Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await.map_err(Error::KubeError)
    }
}

pub fn get_reporter() -> Reporter {
    Reporter {
        controller: OPERATOR.into(),
        instance: Some(std::env::var("POD_NAME").unwrap_or_else(|_| "unknown".to_string())),
    }
}

fn is_conflict(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(ae) if ae.code == 409)
}

/// Body of a merge patch, with `resource_version` as a precondition when set
///
/// A resourceVersion inside a merge patch is enforced by the API server.
pub fn patch_body(diff: &Value, resource_version: Option<String>) -> Value {
    let mut body = diff.clone();
    if let (Some(rv), Some(obj)) = (resource_version, body.as_object_mut()) {
        let metadata = obj
            .entry("metadata")
            .or_insert_with(|| Value::Object(Default::default()));
        if let Some(meta) = metadata.as_object_mut() {
            meta.insert("resourceVersion".to_string(), Value::String(rv));
        }
    }
    body
}

/// A taken name on create becomes `Error::AlreadyExists`
pub fn map_create_error(e: kube::Error, kind: Kind, namespace: &str, name: &str) -> Error {
    if is_conflict(&e) {
        Error::AlreadyExists(kind.to_string(), format!("{namespace}/{name}"))
    } else {
        Error::KubeError(e)
    }
}

/// A failed precondition on patch becomes `Error::Conflict`
pub fn map_patch_error(e: kube::Error, kind: Kind, namespace: &str, name: &str) -> Error {
    if is_conflict(&e) {
        Error::Conflict(kind.to_string(), format!("{namespace}/{name}"))
    } else {
        Error::KubeError(e)
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>> {
        self.get_opt(namespace, name).await
    }

    async fn get_control_plane(&self, namespace: &str, name: &str) -> Result<Option<HostedControlPlane>> {
        self.get_opt(namespace, name).await
    }

    async fn get_guest_cluster(&self, namespace: &str, name: &str) -> Result<Option<GuestCluster>> {
        self.get_opt(namespace, name).await
    }

    async fn get_machine_set(&self, namespace: &str, name: &str) -> Result<Option<MachineSet>> {
        self.get_opt(namespace, name).await
    }

    async fn list_machine_sets(&self, namespace: &str) -> Result<Vec<MachineSet>> {
        let api: Api<MachineSet> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default()).await.map_err(Error::KubeError)?;
        Ok(list.items)
    }

    async fn create_machine_set(&self, machine_set: &MachineSet) -> Result<MachineSet> {
        let ns = machine_set.namespace().ok_or(Error::MissingObjectKey("namespace"))?;
        let api: Api<MachineSet> = Api::namespaced(self.client.clone(), &ns);
        api.create(&PostParams::default(), machine_set)
            .await
            .map_err(|e| map_create_error(e, Kind::MachineSet, &ns, &machine_set.name_any()))
    }

    async fn patch(
        &self,
        kind: Kind,
        namespace: &str,
        name: &str,
        scope: PatchScope,
        resource_version: Option<String>,
        diff: &Value,
    ) -> Result<Option<String>> {
        let body = patch_body(diff, resource_version);
        debug!(%kind, namespace, name, ?scope, patch = %body, "patching");
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, self.scheme.resource(kind));
        let params = PatchParams {
            field_manager: Some(OPERATOR.to_string()),
            ..PatchParams::default()
        };
        let patch = Patch::Merge(&body);
        let res = match scope {
            PatchScope::Main => api.patch(name, &params, &patch).await,
            PatchScope::Status => api.patch_status(name, &params, &patch).await,
        };
        res.map(|obj| obj.metadata.resource_version)
            .map_err(|e| map_patch_error(e, kind, namespace, name))
    }

    async fn publish_event(&self, reference: &ObjectReference, event: &Event) -> Result<()> {
        let recorder =
            Recorder::new(self.client.clone(), self.reporter.clone(), reference.clone());
        let event = Event {
            type_: event.type_,
            reason: event.reason.clone(),
            note: event.note.clone(),
            action: event.action.clone(),
            secondary: event.secondary.clone(),
        };
        recorder.publish(event).await.map_err(Error::KubeError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;
    use serde_json::json;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} from the api server"),
            reason: reason.to_string(),
            code,
        })
    }

    #[test]
    fn status_diff_gets_a_metadata_precondition() {
        let diff = json!({"status": {"ready": true}});
        let body = patch_body(&diff, Some("42".to_string()));
        assert_eq!(body, json!({
            "status": {"ready": true},
            "metadata": {"resourceVersion": "42"},
        }));
    }

    #[test]
    fn precondition_keeps_other_metadata_changes() {
        let diff = json!({"metadata": {"labels": {"a": "b"}}});
        let body = patch_body(&diff, Some("7".to_string()));
        assert_eq!(body["metadata"]["labels"]["a"], "b");
        assert_eq!(body["metadata"]["resourceVersion"], "7");
    }

    #[test]
    fn no_version_leaves_the_diff_alone() {
        let diff = json!({"spec": {"initialReplicas": 2}});
        assert_eq!(patch_body(&diff, None), diff);
    }

    #[test]
    fn taken_name_is_already_exists() {
        let err = map_create_error(api_error(409, "AlreadyExists"), Kind::MachineSet, "ns", "gc");
        assert!(matches!(err, Error::AlreadyExists(kind, key) if kind == "MachineSet" && key == "ns/gc"));
        let err = map_create_error(api_error(403, "Forbidden"), Kind::MachineSet, "ns", "gc");
        assert!(matches!(err, Error::KubeError(kube::Error::Api(ae)) if ae.code == 403));
    }

    #[test]
    fn stale_version_is_a_conflict() {
        let err = map_patch_error(api_error(409, "Conflict"), Kind::GuestCluster, "clusters", "gc");
        assert!(matches!(err, Error::Conflict(ref kind, ref key) if kind == "GuestCluster" && key == "clusters/gc"));
        assert_eq!(err.metric_label(), "conflict");
        let err = map_patch_error(api_error(404, "NotFound"), Kind::GuestCluster, "clusters", "gc");
        assert!(matches!(err, Error::KubeError(_)));
        let err = map_patch_error(api_error(500, "InternalError"), Kind::GuestCluster, "clusters", "gc");
        assert!(matches!(err, Error::KubeError(kube::Error::Api(ae)) if ae.code == 500));
    }
}
