//! Cluster creation and the blocking waits around it.
//!
//! Waits poll `describe` at a fixed interval. There is no timeout unless one
//! is configured; a wait that has been pending for a while is reported with a
//! periodic warning so operators can act on it.

use std::time::{Duration, Instant};

use dwh_core::WaitSettings;
use tracing::{debug, info, warn};

use crate::api::{ClusterDescriptor, ClusterSpec, ClusterStatus, WarehouseApi};
use crate::error::CloudApiError;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_ALERT_EVERY: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// How often a still-pending wait logs a warning.
    pub alert_every: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            alert_every: DEFAULT_ALERT_EVERY,
        }
    }
}

impl WaitPolicy {
    pub fn from_settings(s: &WaitSettings) -> Self {
        Self {
            interval: s.poll_interval(),
            timeout: s.wait_timeout(),
            ..Self::default()
        }
    }

    /// Poll without sleeping.
    pub fn immediate() -> Self {
        Self {
            interval: Duration::ZERO,
            timeout: None,
            alert_every: DEFAULT_ALERT_EVERY,
        }
    }
}

pub struct ClusterProvisioner<'a> {
    api: &'a dyn WarehouseApi,
    wait: WaitPolicy,
}

impl<'a> ClusterProvisioner<'a> {
    pub fn new(api: &'a dyn WarehouseApi, wait: WaitPolicy) -> Self {
        Self { api, wait }
    }

    /// Validate `spec` and submit the creation request. Does not wait.
    pub async fn create_cluster(
        &self,
        spec: &ClusterSpec,
        role_arn: &str,
    ) -> Result<ClusterDescriptor, CloudApiError> {
        spec.validate()?;
        info!(identifier = %spec.identifier, node_type = %spec.node_type, nodes = spec.node_count, "Creating Redshift cluster");
        let descriptor = self.api.create_cluster(spec, role_arn).await?;
        info!(identifier = %spec.identifier, status = %descriptor.status, "Redshift cluster requested");
        Ok(descriptor)
    }

    pub async fn describe(&self, identifier: &str) -> Result<ClusterDescriptor, CloudApiError> {
        self.api.describe_cluster(identifier).await
    }

    /// Block until the cluster is `available` and return its descriptor.
    ///
    /// A cluster that is not visible yet counts as pending. Fails fast when the
    /// cluster starts deleting or lands in a failure status.
    pub async fn wait_until_available(
        &self,
        identifier: &str,
    ) -> Result<ClusterDescriptor, CloudApiError> {
        info!(identifier = %identifier, "Waiting for cluster to become available");
        let started = Instant::now();
        let mut last_alert = started;

        loop {
            let descriptor = match self.api.describe_cluster(identifier).await {
                Ok(d) => d,
                // Describe can lag a fresh CreateCluster.
                Err(e) if e.is_not_found() => {
                    debug!(identifier = %identifier, "Cluster not visible yet");
                    self.pause(identifier, "available", started, &mut last_alert)
                        .await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            debug!(identifier = %identifier, status = %descriptor.status, "Polling cluster status");

            match &descriptor.status {
                ClusterStatus::Available => {
                    info!(
                        identifier = %identifier,
                        waited_secs = started.elapsed().as_secs(),
                        "Redshift cluster available"
                    );
                    return Ok(descriptor);
                }
                ClusterStatus::Deleting | ClusterStatus::Failed(_) => {
                    return Err(CloudApiError::WaitFailed {
                        identifier: identifier.to_string(),
                        status: descriptor.status.to_string(),
                    });
                }
                _ => {}
            }

            self.pause(identifier, "available", started, &mut last_alert)
                .await?;
        }
    }

    /// Block until `describe` reports the cluster gone.
    pub async fn wait_until_deleted(&self, identifier: &str) -> Result<(), CloudApiError> {
        info!(identifier = %identifier, "Waiting for cluster deletion");
        let started = Instant::now();
        let mut last_alert = started;

        loop {
            match self.api.describe_cluster(identifier).await {
                Err(e) if e.is_not_found() => {
                    info!(identifier = %identifier, "Redshift cluster deleted");
                    return Ok(());
                }
                Err(e) => return Err(e),
                Ok(d) => {
                    debug!(identifier = %identifier, status = %d.status, "Polling cluster status");
                    if matches!(d.status, ClusterStatus::Creating | ClusterStatus::Modifying) {
                        return Err(CloudApiError::WaitFailed {
                            identifier: identifier.to_string(),
                            status: d.status.to_string(),
                        });
                    }
                }
            }

            self.pause(identifier, "deleted", started, &mut last_alert)
                .await?;
        }
    }

    async fn pause(
        &self,
        identifier: &str,
        target: &str,
        started: Instant,
        last_alert: &mut Instant,
    ) -> Result<(), CloudApiError> {
        let waited = started.elapsed();

        if let Some(timeout) = self.wait.timeout {
            if waited >= timeout {
                warn!(identifier = %identifier, waiting_for = target, waited_secs = waited.as_secs(), "Cluster wait timed out");
                return Err(CloudApiError::WaitTimeout {
                    identifier: identifier.to_string(),
                    waited_secs: waited.as_secs(),
                });
            }
        }

        if last_alert.elapsed() >= self.wait.alert_every {
            warn!(
                identifier = %identifier,
                waiting_for = target,
                waited_secs = waited.as_secs(),
                "Cluster is still pending"
            );
            *last_alert = Instant::now();
        }

        tokio::time::sleep(self.wait.interval).await;
        Ok(())
    }
}
