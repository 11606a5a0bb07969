//! AWS adapters for the cloud API seams: IAM for roles, Redshift for clusters.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_iam::config::Credentials;
use aws_sdk_redshift::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use dwh_core::{AwsSettings, ClusterType};
use tracing::{debug, info};

use crate::api::{
    ClusterDescriptor, ClusterSpec, ClusterStatus, Endpoint, IdentityApi, RoleHandle,
    WarehouseApi,
};
use crate::error::CloudApiError;

/// Build the shared SDK config: region from settings, static credentials when
/// the config file carries them, the default provider chain otherwise.
pub async fn load_sdk_config(settings: &AwsSettings) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(settings.region.clone()));

    if let (Some(key), Some(secret)) = (&settings.access_key_id, &settings.secret_access_key) {
        loader = loader.credentials_provider(Credentials::new(
            key.clone(),
            secret.clone(),
            None,
            None,
            "dwh-config",
        ));
    }

    let cfg = loader.load().await;
    info!(
        region = %settings.region,
        static_credentials = settings.has_static_credentials(),
        "AWS SDK config loaded"
    );
    cfg
}

fn service_error<E, R>(operation: &'static str, err: &SdkError<E, R>) -> CloudApiError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    CloudApiError::Service {
        operation,
        message: DisplayErrorContext(err).to_string(),
    }
}

fn not_found(resource: &'static str, name: &str) -> CloudApiError {
    CloudApiError::NotFound {
        resource,
        name: name.to_string(),
    }
}

fn node_count_param(nodes: u32) -> Result<i32, CloudApiError> {
    i32::try_from(nodes)
        .map_err(|_| CloudApiError::InvalidSpec(format!("node count {nodes} is out of range")))
}

// ---------------------------------------------------------------------------
// IAM
// ---------------------------------------------------------------------------

pub struct AwsIdentity {
    client: aws_sdk_iam::Client,
}

impl AwsIdentity {
    pub fn new(cfg: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_iam::Client::new(cfg),
        }
    }
}

#[async_trait]
impl IdentityApi for AwsIdentity {
    async fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
        description: &str,
    ) -> Result<RoleHandle, CloudApiError> {
        let resp = self
            .client
            .create_role()
            .path("/")
            .role_name(name)
            .description(description)
            .assume_role_policy_document(trust_policy)
            .send()
            .await;

        match resp {
            Ok(out) => Ok(RoleHandle {
                name: name.to_string(),
                role_id: out.role().map(|r| r.role_id().to_string()),
            }),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_entity_already_exists_exception())
                {
                    return Err(CloudApiError::AlreadyExists {
                        resource: "role",
                        name: name.to_string(),
                    });
                }
                Err(service_error("CreateRole", &err))
            }
        }
    }

    async fn attach_policy(&self, role: &str, policy_arn: &str) -> Result<(), CloudApiError> {
        self.client
            .attach_role_policy()
            .role_name(role)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_entity_exception())
                {
                    not_found("role", role)
                } else {
                    service_error("AttachRolePolicy", &err)
                }
            })?;
        Ok(())
    }

    async fn role_arn(&self, role: &str) -> Result<String, CloudApiError> {
        let out = self
            .client
            .get_role()
            .role_name(role)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_entity_exception())
                {
                    not_found("role", role)
                } else {
                    service_error("GetRole", &err)
                }
            })?;

        out.role()
            .map(|r| r.arn().to_string())
            .ok_or_else(|| not_found("role", role))
    }

    async fn detach_policy(&self, role: &str, policy_arn: &str) -> Result<(), CloudApiError> {
        self.client
            .detach_role_policy()
            .role_name(role)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_entity_exception())
                {
                    not_found("role policy attachment", role)
                } else {
                    service_error("DetachRolePolicy", &err)
                }
            })?;
        Ok(())
    }

    async fn delete_role(&self, role: &str) -> Result<(), CloudApiError> {
        self.client
            .delete_role()
            .role_name(role)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_entity_exception())
                {
                    not_found("role", role)
                } else {
                    service_error("DeleteRole", &err)
                }
            })?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Redshift
// ---------------------------------------------------------------------------

pub struct AwsWarehouse {
    client: aws_sdk_redshift::Client,
}

impl AwsWarehouse {
    pub fn new(cfg: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_redshift::Client::new(cfg),
        }
    }
}

fn descriptor_from(c: &aws_sdk_redshift::types::Cluster) -> ClusterDescriptor {
    ClusterDescriptor {
        identifier: c.cluster_identifier().unwrap_or_default().to_string(),
        status: ClusterStatus::parse(c.cluster_status().unwrap_or("unknown")),
        node_type: c.node_type().map(str::to_string),
        master_username: c.master_username().map(str::to_string),
        db_name: c.db_name().map(str::to_string),
        endpoint: c.endpoint().and_then(|e| {
            e.address().map(|address| Endpoint {
                address: address.to_string(),
                port: e.port(),
            })
        }),
        node_count: c.number_of_nodes(),
        vpc_id: c.vpc_id().map(str::to_string),
        role_arns: c
            .iam_roles()
            .iter()
            .filter_map(|r| r.iam_role_arn().map(str::to_string))
            .collect(),
    }
}

#[async_trait]
impl WarehouseApi for AwsWarehouse {
    async fn create_cluster(
        &self,
        spec: &ClusterSpec,
        role_arn: &str,
    ) -> Result<ClusterDescriptor, CloudApiError> {
        let mut req = self
            .client
            .create_cluster()
            .cluster_identifier(&spec.identifier)
            .cluster_type(spec.cluster_type.as_str())
            .node_type(&spec.node_type)
            .db_name(&spec.db_name)
            .master_username(&spec.master_username)
            .master_user_password(&spec.master_password)
            .port(i32::from(spec.port))
            .iam_roles(role_arn)
            .automated_snapshot_retention_period(0);

        // The service rejects a node count on single-node clusters.
        if spec.cluster_type == ClusterType::MultiNode {
            req = req.number_of_nodes(node_count_param(spec.node_count)?);
        }

        debug!(spec = ?spec, "CreateCluster request");

        match req.send().await {
            Ok(out) => out.cluster().map(descriptor_from).ok_or_else(|| {
                CloudApiError::IncompleteDescriptor {
                    identifier: spec.identifier.clone(),
                    field: "cluster",
                }
            }),
            Err(err) => {
                if let Some(se) = err.as_service_error() {
                    if se.is_cluster_already_exists_fault() {
                        return Err(CloudApiError::AlreadyExists {
                            resource: "cluster",
                            name: spec.identifier.clone(),
                        });
                    }
                    if se.code().is_some_and(|c| c.starts_with("InvalidParameter")) {
                        return Err(CloudApiError::InvalidSpec(
                            se.message().unwrap_or("rejected by service").to_string(),
                        ));
                    }
                }
                Err(service_error("CreateCluster", &err))
            }
        }
    }

    async fn describe_cluster(&self, identifier: &str) -> Result<ClusterDescriptor, CloudApiError> {
        let out = self
            .client
            .describe_clusters()
            .cluster_identifier(identifier)
            .send()
            .await
            .map_err(|err| {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_cluster_not_found_fault())
                {
                    not_found("cluster", identifier)
                } else {
                    service_error("DescribeClusters", &err)
                }
            })?;

        out.clusters()
            .first()
            .map(descriptor_from)
            .ok_or_else(|| not_found("cluster", identifier))
    }

    async fn delete_cluster(
        &self,
        identifier: &str,
        skip_final_snapshot: bool,
    ) -> Result<(), CloudApiError> {
        self.client
            .delete_cluster()
            .cluster_identifier(identifier)
            .skip_final_cluster_snapshot(skip_final_snapshot)
            .send()
            .await
            .map_err(|err| match err.as_service_error() {
                Some(e) if e.is_cluster_not_found_fault() => not_found("cluster", identifier),
                Some(e) if e.is_invalid_cluster_state_fault() => CloudApiError::InvalidState {
                    resource: "cluster",
                    name: identifier.to_string(),
                    message: e.message().unwrap_or("invalid cluster state").to_string(),
                },
                _ => service_error("DeleteCluster", &err),
            })?;
        Ok(())
    }
}
