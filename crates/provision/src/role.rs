use serde_json::json;
use tracing::info;

use crate::api::{IdentityApi, RoleHandle};
use crate::error::CloudApiError;

pub const ROLE_DESCRIPTION: &str = "Allows Redshift clusters to call AWS services on your behalf.";

/// Trust policy letting the Redshift service assume the role.
pub fn trust_policy_document() -> String {
    json!({
        "Statement": [{
            "Action": "sts:AssumeRole",
            "Effect": "Allow",
            "Principal": { "Service": "redshift.amazonaws.com" }
        }],
        "Version": "2012-10-17"
    })
    .to_string()
}

/// Creates the warehouse role, attaches its read policy, and resolves its ARN.
pub struct RoleProvisioner<'a> {
    api: &'a dyn IdentityApi,
}

impl<'a> RoleProvisioner<'a> {
    pub fn new(api: &'a dyn IdentityApi) -> Self {
        Self { api }
    }

    pub async fn create_role(&self, name: &str) -> Result<RoleHandle, CloudApiError> {
        info!(role = %name, "Creating IAM role");
        let handle = self
            .api
            .create_role(name, &trust_policy_document(), ROLE_DESCRIPTION)
            .await?;
        info!(role = %name, role_id = ?handle.role_id, "IAM role created");
        Ok(handle)
    }

    pub async fn attach_policy(&self, role: &RoleHandle, policy_arn: &str) -> Result<(), CloudApiError> {
        info!(role = %role.name, policy = %policy_arn, "Attaching policy");
        self.api.attach_policy(&role.name, policy_arn).await?;
        info!(role = %role.name, "Policy attached");
        Ok(())
    }

    pub async fn resolve_role_arn(&self, role: &RoleHandle) -> Result<String, CloudApiError> {
        let arn = self.api.role_arn(&role.name).await?;
        info!(role = %role.name, arn = %arn, "Resolved IAM role ARN");
        Ok(arn)
    }
}
