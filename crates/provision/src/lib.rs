pub mod api;
pub mod aws;
pub mod cluster;
pub mod error;
pub mod role;
pub mod teardown;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use api::{ClusterDescriptor, ClusterSpec, ClusterStatus, Endpoint, IdentityApi, RoleHandle, WarehouseApi};
pub use aws::{load_sdk_config, AwsIdentity, AwsWarehouse};
pub use cluster::{ClusterProvisioner, WaitPolicy};
pub use error::{CloudApiError, ProvisionError};
pub use role::RoleProvisioner;
pub use teardown::{PhaseOutcome, Teardown, TeardownReport};
pub use workflow::Provisioner;
