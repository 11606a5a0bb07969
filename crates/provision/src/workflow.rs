//! End-to-end provisioning with compensation.
//!
//! role -> policy -> role ARN -> cluster -> wait until available -> record
//! endpoint and ARN in the config file. Any failure after the first remote
//! call tears down everything once, then returns the original error.

use dwh_core::settings::{ARN_KEY, CLUSTER, HOST_KEY, IAM_ROLE};
use dwh_core::{ClusterSettings, ConfigFile, IamRoleSettings};
use tracing::{error, info, warn};

use crate::api::{ClusterDescriptor, ClusterSpec, IdentityApi, WarehouseApi};
use crate::cluster::{ClusterProvisioner, WaitPolicy};
use crate::error::ProvisionError;
use crate::role::RoleProvisioner;
use crate::teardown::Teardown;

pub struct Provisioner<'a> {
    identity: &'a dyn IdentityApi,
    warehouse: &'a dyn WarehouseApi,
    /// Overrides the policy derived from `[CLUSTER]` settings.
    wait: Option<WaitPolicy>,
}

impl<'a> Provisioner<'a> {
    pub fn new(identity: &'a dyn IdentityApi, warehouse: &'a dyn WarehouseApi) -> Self {
        Self {
            identity,
            warehouse,
            wait: None,
        }
    }

    pub fn with_wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.wait = Some(wait);
        self
    }

    /// Provision the role and cluster described by `config` and persist
    /// `[CLUSTER] host` and `[IAM_ROLE] arn` back to it.
    pub async fn provision(&self, config: &mut ConfigFile) -> Result<ClusterDescriptor, ProvisionError> {
        let cluster = ClusterSettings::from_config(config)?;
        let role = IamRoleSettings::from_config(config)?;
        let spec = ClusterSpec::from_settings(&cluster);
        spec.validate()?;
        cluster.log_summary();

        let wait = self.wait.unwrap_or_else(|| WaitPolicy::from_settings(&cluster.wait));

        match self.run_steps(config, &spec, &role, wait).await {
            Ok(descriptor) => Ok(descriptor),
            Err(e) => {
                error!(error = %e, "Provisioning failed, tearing down");
                self.compensate(config, wait).await;
                Err(e)
            }
        }
    }

    async fn run_steps(
        &self,
        config: &mut ConfigFile,
        spec: &ClusterSpec,
        role: &IamRoleSettings,
        wait: WaitPolicy,
    ) -> Result<ClusterDescriptor, ProvisionError> {
        let roles = RoleProvisioner::new(self.identity);
        let handle = roles.create_role(&role.role_name).await?;
        roles.attach_policy(&handle, &role.policy_arn).await?;
        let role_arn = roles.resolve_role_arn(&handle).await?;

        let clusters = ClusterProvisioner::new(self.warehouse, wait);
        clusters.create_cluster(spec, &role_arn).await?;
        let descriptor = clusters.wait_until_available(&spec.identifier).await?;
        let host = descriptor.endpoint_address()?.to_string();

        let arn = descriptor
            .role_arns
            .first()
            .cloned()
            .unwrap_or(role_arn);
        config.set(CLUSTER, HOST_KEY, host.as_str());
        config.set(IAM_ROLE, ARN_KEY, arn.as_str());
        config.save()?;
        info!(host = %host, arn = %arn, "Endpoint and role ARN saved to config");

        Ok(descriptor)
    }

    async fn compensate(&self, config: &mut ConfigFile, wait: WaitPolicy) {
        let teardown = Teardown::new(self.identity, self.warehouse, wait);
        match teardown.run(config).await {
            Ok(report) if report.is_clean() => info!("Compensating teardown completed"),
            Ok(report) => warn!(
                cluster = %report.cluster,
                role = %report.role,
                "Compensating teardown left resources behind"
            ),
            Err(e) => error!(error = %e, "Compensating teardown could not update config"),
        }
    }
}
