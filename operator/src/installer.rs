//! Control plane installation, run as a Kubernetes Job.
use crate::{Error, ReconcileKey, Result, INSTALLER_IMAGE, OPERATOR};
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams},
    runtime::wait::{await_condition, Condition},
    Client,
};
use std::time::Duration;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

/// Service account the installer Job runs as
pub static INSTALLER_SERVICE_ACCOUNT: &str = "hypershift-installer";

/// Provisions the components of a hosted control plane
///
/// Must be safe to call again for the same key: a crash between a successful
/// install and the status update re-runs it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, key: &ReconcileKey) -> Result<()>;
}

#[derive(Debug, PartialEq, Eq)]
pub enum JobState {
    Running,
    Complete,
    Failed(String),
}

pub fn job_name(key: &ReconcileKey) -> String {
    format!("{}-installer", key.name)
}

/// Job manifest installing the control plane of `key`
pub fn installer_job(key: &ReconcileKey, image: &str) -> Result<Job> {
    Ok(serde_json::from_value(serde_json::json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": job_name(key),
            "namespace": key.namespace,
            "labels": {
                "app.kubernetes.io/managed-by": OPERATOR,
                "hypershift.openshift.io/hosted-control-plane": key.name,
            },
        },
        "spec": {
            "backoffLimit": 3,
            "parallelism": 1,
            "template": {
                "spec": {
                    "serviceAccountName": INSTALLER_SERVICE_ACCOUNT,
                    "restartPolicy": "Never",
                    "containers": [{
                        "name": "installer",
                        "image": image,
                        "imagePullPolicy": "IfNotPresent",
                        "env": [
                            {"name": "NAMESPACE", "value": key.namespace},
                            {"name": "NAME", "value": key.name},
                        ],
                    }],
                },
            },
        },
    }))?)
}

/// Where a Job stands according to its conditions
pub fn job_state(job: &Job) -> JobState {
    let conditions = job.status.as_ref().and_then(|s| s.conditions.as_ref());
    for c in conditions.into_iter().flatten() {
        if c.status != "True" {
            continue;
        }
        match c.type_.as_str() {
            "Complete" => return JobState::Complete,
            "Failed" => {
                return JobState::Failed(
                    c.message
                        .clone()
                        .or_else(|| c.reason.clone())
                        .unwrap_or_else(|| "job failed".to_string()),
                )
            }
            _ => {}
        }
    }
    JobState::Running
}

fn is_job_finished() -> impl Condition<Job> {
    |obj: Option<&Job>| obj.is_some_and(|job| job_state(job) != JobState::Running)
}

/// Runs the installer image as a Job and waits for it
pub struct JobInstaller {
    client: Client,
    image: String,
    timeout: Duration,
}

impl JobInstaller {
    pub fn new(client: Client, image: Option<String>, timeout: Duration) -> Self {
        Self {
            client,
            image: image.unwrap_or_else(|| INSTALLER_IMAGE.to_string()),
            timeout,
        }
    }
}

#[async_trait]
impl Installer for JobInstaller {
    async fn install(&self, key: &ReconcileKey) -> Result<()> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), &key.namespace);
        let name = job_name(key);
        let job = installer_job(key, &self.image)?;
        // re-applying an unchanged Job is a no-op, so a retried install resumes the same run
        api.patch(&name, &PatchParams::apply(OPERATOR).force(), &Patch::Apply(&job))
            .await
            .map_err(Error::KubeError)?;
        info!("Waiting for installer job {}/{name}", key.namespace);

        let finished = tokio::time::timeout(self.timeout, await_condition(api.clone(), &name, is_job_finished()))
            .await??
            .ok_or_else(|| Error::InstallerFailed(key.to_string(), format!("job {name} disappeared")))?;

        match job_state(&finished) {
            JobState::Complete => Ok(()),
            JobState::Failed(message) => {
                warn!("Installer job {}/{name} failed: {message}", key.namespace);
                // removing it lets the next attempt start a fresh run
                api.delete(&name, &DeleteParams::background())
                    .await
                    .map_err(Error::KubeError)?;
                Err(Error::InstallerFailed(key.to_string(), message))
            }
            JobState::Running => Err(Error::InstallerFailed(key.to_string(), format!("job {name} still running"))),
        }
    }
}
