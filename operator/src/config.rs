use crate::backoff::BackoffConfig;
use clap::Parser;
use std::{net::SocketAddr, time::Duration};

/// Hosted control plane and guest cluster controllers
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Parameters {
    /// Address the metrics and health endpoints bind to
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9000")]
    pub metrics_addr: SocketAddr,

    /// Namespace to watch, all namespaces when empty
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    pub namespace: String,

    /// Maximum number of objects reconciled at once, per kind
    #[arg(long, env = "CONCURRENCY", default_value_t = 10)]
    pub concurrency: u16,

    /// Seconds between two full resyncs of a settled object
    #[arg(long, env = "SYNC_PERIOD", default_value_t = 600)]
    pub sync_period: u64,

    /// Namespace holding the template and derived MachineSets
    #[arg(long, env = "MACHINE_NAMESPACE", default_value = "openshift-machine-api")]
    pub machine_namespace: String,

    /// Image of the control plane installer job
    #[arg(long, env = "INSTALLER_IMAGE")]
    pub installer_image: Option<String>,

    /// Seconds to wait for the installer job
    #[arg(long, env = "INSTALLER_TIMEOUT", default_value_t = 600)]
    pub installer_timeout: u64,

    /// Seconds before the first retry of a failed or waiting object
    #[arg(long, env = "BACKOFF_INITIAL", default_value_t = 1)]
    pub backoff_initial: u64,

    /// Upper bound, in seconds, of the retry delay
    #[arg(long, env = "BACKOFF_MAX", default_value_t = 300)]
    pub backoff_max: u64,

    /// Log as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Parameters {
    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period)
    }

    pub fn installer_timeout(&self) -> Duration {
        Duration::from_secs(self.installer_timeout)
    }

    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_secs(self.backoff_initial),
            max_delay: Duration::from_secs(self.backoff_max.max(self.backoff_initial)),
            ..BackoffConfig::default()
        }
    }

    /// Watched namespace, `None` for the whole cluster
    pub fn watch_namespace(&self) -> Option<&str> {
        Some(self.namespace.as_str()).filter(|ns| !ns.is_empty())
    }
}
