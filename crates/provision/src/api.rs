//! Cloud API seams.
//!
//! [`IdentityApi`] covers role and policy management, [`WarehouseApi`] the
//! cluster lifecycle. Production code uses the AWS adapters in
//! [`crate::aws`]; tests substitute in-memory fakes.

use std::fmt;

use async_trait::async_trait;
use dwh_core::{ClusterSettings, ClusterType};
use serde::Serialize;

use crate::error::CloudApiError;

// ── Identity ──────────────────────────────────────────────────

/// A role created by [`IdentityApi::create_role`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleHandle {
    pub name: String,
    /// Unique identifier assigned by the service, when reported.
    pub role_id: Option<String>,
}

#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// Create a role assumable under `trust_policy`.
    ///
    /// Fails with [`CloudApiError::AlreadyExists`] if the name is taken.
    async fn create_role(
        &self,
        name: &str,
        trust_policy: &str,
        description: &str,
    ) -> Result<RoleHandle, CloudApiError>;

    /// Attach a managed policy. Re-attaching is not an error.
    async fn attach_policy(&self, role: &str, policy_arn: &str) -> Result<(), CloudApiError>;

    /// Look up the role's ARN.
    async fn role_arn(&self, role: &str) -> Result<String, CloudApiError>;

    async fn detach_policy(&self, role: &str, policy_arn: &str) -> Result<(), CloudApiError>;

    async fn delete_role(&self, role: &str) -> Result<(), CloudApiError>;
}

// ── Warehouse ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ClusterStatus {
    Creating,
    Available,
    Modifying,
    Deleting,
    /// `incompatible-*` and `storage-full`: the cluster will not recover unaided.
    Failed(String),
    Other(String),
}

impl ClusterStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "creating" => Self::Creating,
            "available" => Self::Available,
            "modifying" => Self::Modifying,
            "deleting" => Self::Deleting,
            s if s.starts_with("incompatible-") || s == "storage-full" => {
                Self::Failed(s.to_string())
            }
            s => Self::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Creating => "creating",
            Self::Available => "available",
            Self::Modifying => "modifying",
            Self::Deleting => "deleting",
            Self::Failed(s) | Self::Other(s) => s,
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub address: String,
    pub port: Option<i32>,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.address, port),
            None => f.write_str(&self.address),
        }
    }
}

/// Everything `describe` reports about a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterDescriptor {
    pub identifier: String,
    pub status: ClusterStatus,
    pub node_type: Option<String>,
    pub master_username: Option<String>,
    pub db_name: Option<String>,
    pub endpoint: Option<Endpoint>,
    pub node_count: Option<i32>,
    pub vpc_id: Option<String>,
    pub role_arns: Vec<String>,
}

impl ClusterDescriptor {
    /// Properties shown once a cluster is up, in display order.
    pub fn properties(&self) -> Vec<(&'static str, String)> {
        fn or_dash<T: ToString>(v: Option<T>) -> String {
            v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
        }
        vec![
            ("ClusterIdentifier", self.identifier.clone()),
            ("NodeType", or_dash(self.node_type.as_deref())),
            ("ClusterStatus", self.status.to_string()),
            ("MasterUsername", or_dash(self.master_username.as_deref())),
            ("DBName", or_dash(self.db_name.as_deref())),
            ("Endpoint", or_dash(self.endpoint.as_ref())),
            ("NumberOfNodes", or_dash(self.node_count)),
            ("VpcId", or_dash(self.vpc_id.as_deref())),
        ]
    }

    pub fn endpoint_address(&self) -> Result<&str, CloudApiError> {
        self.endpoint
            .as_ref()
            .map(|e| e.address.as_str())
            .ok_or_else(|| CloudApiError::IncompleteDescriptor {
                identifier: self.identifier.clone(),
                field: "endpoint",
            })
    }
}

/// Shape and credentials of a cluster to create.
#[derive(Clone)]
pub struct ClusterSpec {
    pub identifier: String,
    pub cluster_type: ClusterType,
    pub node_type: String,
    pub node_count: u32,
    pub db_name: String,
    pub master_username: String,
    pub master_password: String,
    pub port: u16,
}

impl fmt::Debug for ClusterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSpec")
            .field("identifier", &self.identifier)
            .field("cluster_type", &self.cluster_type)
            .field("node_type", &self.node_type)
            .field("node_count", &self.node_count)
            .field("db_name", &self.db_name)
            .field("master_username", &self.master_username)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

const PASSWORD_FORBIDDEN: &[char] = &['\'', '"', '\\', '/', '@', ' '];

impl ClusterSpec {
    pub fn from_settings(s: &ClusterSettings) -> Self {
        Self {
            identifier: s.cluster_identifier.clone(),
            cluster_type: s.cluster_type,
            node_type: s.node_type.clone(),
            node_count: s.num_nodes,
            db_name: s.db_name.clone(),
            master_username: s.db_user.clone(),
            master_password: s.db_password.clone(),
            port: s.db_port,
        }
    }

    /// Reject shapes and credentials the service would refuse.
    pub fn validate(&self) -> Result<(), CloudApiError> {
        let invalid = |msg: String| Err(CloudApiError::InvalidSpec(msg));

        match self.cluster_type {
            ClusterType::SingleNode if self.node_count != 1 => {
                return invalid(format!(
                    "single-node cluster cannot have {} nodes",
                    self.node_count
                ));
            }
            ClusterType::MultiNode if self.node_count < 2 => {
                return invalid(format!(
                    "multi-node cluster needs at least 2 nodes, got {}",
                    self.node_count
                ));
            }
            _ => {}
        }

        // The service stores identifiers lower-cased, so case is not checked.
        let id = &self.identifier;
        let id_ok = (1..=63).contains(&id.len())
            && id.starts_with(|c: char| c.is_ascii_alphabetic())
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !id.ends_with('-')
            && !id.contains("--");
        if !id_ok {
            return invalid(format!(
                "identifier '{id}' must be 1-63 letters, digits or single hyphens, starting with a letter"
            ));
        }

        if self.node_type.trim().is_empty() {
            return invalid("node type is empty".into());
        }
        if self.master_username.trim().is_empty() {
            return invalid("master username is empty".into());
        }

        let pw = &self.master_password;
        let pw_ok = (8..=64).contains(&pw.len())
            && pw.chars().all(|c| c.is_ascii_graphic() || c == ' ')
            && !pw.contains(PASSWORD_FORBIDDEN)
            && pw.chars().any(|c| c.is_ascii_uppercase())
            && pw.chars().any(|c| c.is_ascii_lowercase())
            && pw.chars().any(|c| c.is_ascii_digit());
        if !pw_ok {
            return invalid(
                "master password must be 8-64 printable characters with upper case, lower case and a digit, and no quotes, slashes, '@' or spaces".into(),
            );
        }

        Ok(())
    }
}

#[async_trait]
pub trait WarehouseApi: Send + Sync {
    /// Submit a cluster creation request bound to `role_arn`.
    ///
    /// Fails with [`CloudApiError::AlreadyExists`] for a duplicate identifier
    /// and [`CloudApiError::InvalidSpec`] when the service rejects the shape.
    async fn create_cluster(
        &self,
        spec: &ClusterSpec,
        role_arn: &str,
    ) -> Result<ClusterDescriptor, CloudApiError>;

    /// Fails with [`CloudApiError::NotFound`] once the cluster is gone.
    async fn describe_cluster(&self, identifier: &str) -> Result<ClusterDescriptor, CloudApiError>;

    async fn delete_cluster(
        &self,
        identifier: &str,
        skip_final_snapshot: bool,
    ) -> Result<(), CloudApiError>;
}
