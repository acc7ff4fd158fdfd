//! Snapshot-diff persistence.
//!
//! A `Patcher` remembers how an object looked when it was read. At the end of
//! a reconcile only what changed since then is sent, the status subresource
//! separately from everything else, with the read-time resourceVersion as a
//! precondition. A conflict is returned to the caller untouched.
use crate::{
    store::{ObjectStore, PatchScope},
    Error, Result,
};
use common::{
    diff::{merge_patch, split_status},
    Kind,
};
use kube::Resource;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

pub struct Patcher {
    kind: Kind,
    namespace: String,
    name: String,
    resource_version: Option<String>,
    main: Value,
    status: Value,
}

impl Patcher {
    /// Capture `obj` right after it was read and before any mutation
    pub fn snapshot<K: Resource + Serialize>(kind: Kind, obj: &K) -> Result<Self> {
        let meta = obj.meta();
        let (main, status) = split_status(&serde_json::to_value(obj)?);
        Ok(Self {
            kind,
            namespace: meta.namespace.clone().ok_or(Error::MissingObjectKey("namespace"))?,
            name: meta.name.clone().ok_or(Error::MissingObjectKey("name"))?,
            resource_version: meta.resource_version.clone(),
            main,
            status,
        })
    }

    /// Persist the changes made to `obj` since the snapshot
    ///
    /// Returns whether anything was written.
    pub async fn apply<K: Resource + Serialize>(self, store: &dyn ObjectStore, obj: &K) -> Result<bool> {
        let (main, status) = split_status(&serde_json::to_value(obj)?);
        let mut resource_version = self.resource_version.clone();
        let mut written = false;

        if let Some(diff) = merge_patch(&self.main, &main) {
            debug!(kind = %self.kind, name = %self.name, patch = %diff, "spec changed");
            resource_version = store
                .patch(self.kind, &self.namespace, &self.name, PatchScope::Main, resource_version, &diff)
                .await?;
            written = true;
        }
        if let Some(diff) = merge_patch(&self.status, &status) {
            let diff = json!({ "status": diff });
            debug!(kind = %self.kind, name = %self.name, patch = %diff, "status changed");
            store
                .patch(self.kind, &self.namespace, &self.name, PatchScope::Status, resource_version, &diff)
                .await?;
            written = true;
        }
        Ok(written)
    }
}
