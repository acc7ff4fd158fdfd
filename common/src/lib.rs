use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("K8s error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("K8s wait error: {0}")]
    KubeWaitError(#[from] kube::runtime::wait::Error),

    #[error("Elapsed wait error: {0}")]
    Elapsed(#[from] tokio::time::error::Elapsed),

    #[error("{0} {1} changed since it was read")]
    Conflict(String, String),

    #[error("{0} {1} already exists")]
    AlreadyExists(String, String),

    #[error("Object is missing its {0}")]
    MissingObjectKey(&'static str),

    #[error("Invalid template MachineSet {0}: {1}")]
    InvalidTemplate(String, String),

    #[error("Installer failed for {0}: {1}")]
    InstallerFailed(String, String),

    #[error("Error: {0}")]
    Other(String),
}
impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::KubeError(kube::Error::Api(e)) => format!("kubeerror_{}", e.reason).to_lowercase(),
            Error::KubeError(_) => "kubeerror".to_string(),
            _ => format!("{self:?}")
                .split('(')
                .next()
                .unwrap_or_default()
                .to_lowercase(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub mod cluster;
pub mod diff;
pub mod guestcluster;
pub mod hostedcontrolplane;
pub mod machineset;
pub mod scheme;

pub use cluster::Cluster;
pub use guestcluster::GuestCluster;
pub use hostedcontrolplane::HostedControlPlane;
pub use machineset::MachineSet;
pub use scheme::{Kind, Scheme};

/// Annotation marking a single object as paused
pub static PAUSED_ANNOTATION: &str = "cluster.x-k8s.io/paused";
