//! Best-effort removal of everything provisioning creates.
//!
//! The cluster phase and the role phase run independently: a failure in one
//! is recorded in the [`TeardownReport`] and never prevents the other.
//! Resources that are already gone count as removed, so teardown can run
//! repeatedly or after a provisioning attempt that failed at any step.

use std::fmt;

use dwh_core::settings::{ARN_KEY, CLUSTER, HOST_KEY, IAM_ROLE};
use dwh_core::{ConfigFile, IamRoleSettings};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::api::{IdentityApi, WarehouseApi};
use crate::cluster::{ClusterProvisioner, WaitPolicy};
use crate::error::{CloudApiError, ProvisionError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PhaseOutcome {
    Completed,
    /// Nothing to remove.
    AlreadyAbsent,
    Failed(String),
}

impl PhaseOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for PhaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::AlreadyAbsent => f.write_str("already absent"),
            Self::Failed(msg) => write!(f, "failed: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub cluster: PhaseOutcome,
    pub role: PhaseOutcome,
}

impl TeardownReport {
    /// Both phases left nothing behind.
    pub fn is_clean(&self) -> bool {
        !self.cluster.is_failed() && !self.role.is_failed()
    }
}

pub struct Teardown<'a> {
    identity: &'a dyn IdentityApi,
    warehouse: &'a dyn WarehouseApi,
    wait: WaitPolicy,
}

impl<'a> Teardown<'a> {
    pub fn new(
        identity: &'a dyn IdentityApi,
        warehouse: &'a dyn WarehouseApi,
        wait: WaitPolicy,
    ) -> Self {
        Self {
            identity,
            warehouse,
            wait,
        }
    }

    /// Delete the cluster (no final snapshot), wait for it to disappear,
    /// then detach `policy_arn` and delete the role.
    pub async fn teardown(&self, identifier: &str, role_name: &str, policy_arn: &str) -> TeardownReport {
        let cluster = self.remove_cluster(identifier).await;
        if let PhaseOutcome::Failed(msg) = &cluster {
            error!(identifier = %identifier, error = %msg, "Cluster teardown failed");
        }

        let role = self.remove_role(role_name, policy_arn).await;
        if let PhaseOutcome::Failed(msg) = &role {
            error!(role = %role_name, error = %msg, "Role teardown failed");
        }

        let report = TeardownReport { cluster, role };
        info!(cluster = %report.cluster, role = %report.role, "Teardown finished");
        report
    }

    /// Tear down the resources named in `config`, then strip the
    /// provisioned endpoint and role ARN from it and persist the file.
    pub async fn run(&self, config: &mut ConfigFile) -> Result<TeardownReport, ProvisionError> {
        let identifier = config.get(CLUSTER, "cluster_identifier")?;
        let role = IamRoleSettings::from_config(config)?;

        let report = self
            .teardown(&identifier, &role.role_name, &role.policy_arn)
            .await;
        forget_provisioned(config)?;
        Ok(report)
    }

    async fn remove_cluster(&self, identifier: &str) -> PhaseOutcome {
        info!(identifier = %identifier, "Deleting Redshift cluster");
        match self.warehouse.delete_cluster(identifier, true).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!(identifier = %identifier, "Cluster does not exist");
                return PhaseOutcome::AlreadyAbsent;
            }
            // Already deleting: fall through to the wait.
            Err(CloudApiError::InvalidState { message, .. }) => {
                warn!(identifier = %identifier, reason = %message, "Cluster cannot be deleted in its current state, waiting");
            }
            Err(e) => return PhaseOutcome::Failed(e.to_string()),
        }

        let clusters = ClusterProvisioner::new(self.warehouse, self.wait);
        match clusters.wait_until_deleted(identifier).await {
            Ok(()) => PhaseOutcome::Completed,
            Err(e) => PhaseOutcome::Failed(e.to_string()),
        }
    }

    async fn remove_role(&self, role_name: &str, policy_arn: &str) -> PhaseOutcome {
        info!(role = %role_name, policy = %policy_arn, "Detaching policy");
        let mut absent = false;
        match self.identity.detach_policy(role_name, policy_arn).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!(role = %role_name, "Policy not attached");
                absent = true;
            }
            Err(e) => return PhaseOutcome::Failed(e.to_string()),
        }

        info!(role = %role_name, "Deleting IAM role");
        match self.identity.delete_role(role_name).await {
            Ok(()) => PhaseOutcome::Completed,
            Err(e) if e.is_not_found() => {
                info!(role = %role_name, "Role does not exist");
                if absent {
                    PhaseOutcome::AlreadyAbsent
                } else {
                    PhaseOutcome::Completed
                }
            }
            Err(e) => PhaseOutcome::Failed(e.to_string()),
        }
    }
}

/// Remove `[CLUSTER] host` and `[IAM_ROLE] arn` and save the file.
pub fn forget_provisioned(config: &mut ConfigFile) -> Result<(), ProvisionError> {
    let host = config.remove(CLUSTER, HOST_KEY);
    let arn = config.remove(IAM_ROLE, ARN_KEY);
    config.save()?;
    info!(host_removed = host, arn_removed = arn, "Provisioned fields cleared from config");
    Ok(())
}
