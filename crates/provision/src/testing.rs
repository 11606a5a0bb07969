//! In-memory stand-ins for the IAM and Redshift APIs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use dwh_core::{ClusterType, ConfigFile};

use crate::api::{
    ClusterDescriptor, ClusterSpec, ClusterStatus, Endpoint, IdentityApi, RoleHandle,
    WarehouseApi,
};
use crate::error::CloudApiError;

pub const SAMPLE_CONFIG: &str = r#"
[AWS]
key = "AKIAEXAMPLE"
secret = "shh"
region = "us-west-2"

[CLUSTER]
cluster_type = "multi-node"
node_type = "dc2.large"
num_nodes = 4
db_name = "dwh"
db_user = "dwhuser"
db_password = "Passw0rd"
db_port = 5439
cluster_identifier = "dwh-cluster"
poll_interval_secs = 0

[IAM_ROLE]
role_name = "dwhRole"

[S3]
log_jsonpath = "s3://udacity-dend/log_json_path.json"
"#;

pub fn sample_spec() -> ClusterSpec {
    ClusterSpec {
        identifier: "dwh-cluster".into(),
        cluster_type: ClusterType::MultiNode,
        node_type: "dc2.large".into(),
        node_count: 4,
        db_name: "dwh".into(),
        master_username: "dwhuser".into(),
        master_password: "Passw0rd".into(),
        port: 5439,
    }
}

/// Write `contents` to a fresh temp file and load it.
pub fn temp_config(name: &str, contents: &str) -> (ConfigFile, PathBuf) {
    let path = std::env::temp_dir().join(format!(
        "dwh-provision-{}-{}.toml",
        name,
        std::process::id()
    ));
    std::fs::write(&path, contents).unwrap();
    (ConfigFile::load(&path).unwrap(), path)
}

struct FakeRole {
    arn: String,
    policies: Vec<String>,
}

struct FakeCluster {
    status: ClusterStatus,
    polls_left: u32,
    role_arns: Vec<String>,
}

#[derive(Default)]
struct State {
    roles: HashMap<String, FakeRole>,
    clusters: HashMap<String, FakeCluster>,
    calls: Vec<&'static str>,
    failures: HashMap<&'static str, CloudApiError>,
    describe_lag: u32,
}

/// Fake cloud implementing both APIs over shared state.
///
/// A creating or deleting cluster reports its pending status for
/// `pending_polls` describes, then turns available or disappears.
#[derive(Default)]
pub struct FakeCloud {
    state: Mutex<State>,
    pending_polls: u32,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    pub fn with_role(self, name: &str, policies: &[&str]) -> Self {
        self.state.lock().unwrap().roles.insert(
            name.to_string(),
            FakeRole {
                arn: role_arn_for(name),
                policies: policies.iter().map(|p| p.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_cluster(self, identifier: &str, status: ClusterStatus) -> Self {
        self.state.lock().unwrap().clusters.insert(
            identifier.to_string(),
            FakeCluster {
                status,
                polls_left: 0,
                role_arns: Vec::new(),
            },
        );
        self
    }

    /// Make every call to `operation` fail with `err`.
    pub fn failing(self, operation: &'static str, err: CloudApiError) -> Self {
        self.state.lock().unwrap().failures.insert(operation, err);
        self
    }

    /// The next `describes` calls report the cluster as not found.
    pub fn with_describe_lag(self, describes: u32) -> Self {
        self.state.lock().unwrap().describe_lag = describes;
        self
    }

    pub fn seed_creating(&self, identifier: &str) {
        self.state.lock().unwrap().clusters.insert(
            identifier.to_string(),
            FakeCluster {
                status: ClusterStatus::Creating,
                polls_left: self.pending_polls,
                role_arns: Vec::new(),
            },
        );
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.calls().iter().filter(|c| **c == operation).count()
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.state.lock().unwrap().roles.contains_key(name)
    }

    pub fn has_cluster(&self, identifier: &str) -> bool {
        self.state.lock().unwrap().clusters.contains_key(identifier)
    }

    pub fn policies_of(&self, role: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .roles
            .get(role)
            .map(|r| r.policies.clone())
            .unwrap_or_default()
    }

    /// Record the call and return the injected failure, if any.
    fn enter(&self, operation: &'static str) -> Result<std::sync::MutexGuard<'_, State>, CloudApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(operation);
        if let Some(err) = state.failures.get(operation).cloned() {
            return Err(err);
        }
        Ok(state)
    }
}

fn role_arn_for(name: &str) -> String {
    format!("arn:aws:iam::123456789012:role/{name}")
}

fn not_found(resource: &'static str, name: &str) -> CloudApiError {
    CloudApiError::NotFound {
        resource,
        name: name.to_string(),
    }
}

fn descriptor(identifier: &str, cluster: &FakeCluster) -> ClusterDescriptor {
    let available = cluster.status == ClusterStatus::Available;
    ClusterDescriptor {
        identifier: identifier.to_string(),
        status: cluster.status.clone(),
        node_type: Some("dc2.large".into()),
        master_username: Some("dwhuser".into()),
        db_name: Some("dwh".into()),
        endpoint: available.then(|| Endpoint {
            address: format!("{identifier}.fake.us-west-2.redshift.amazonaws.com"),
            port: Some(5439),
        }),
        node_count: Some(4),
        vpc_id: Some("vpc-0fake".into()),
        role_arns: cluster.role_arns.clone(),
    }
}

#[async_trait]
impl IdentityApi for FakeCloud {
    async fn create_role(
        &self,
        name: &str,
        _trust_policy: &str,
        _description: &str,
    ) -> Result<RoleHandle, CloudApiError> {
        let mut state = self.enter("create_role")?;
        if state.roles.contains_key(name) {
            return Err(CloudApiError::AlreadyExists {
                resource: "role",
                name: name.to_string(),
            });
        }
        state.roles.insert(
            name.to_string(),
            FakeRole {
                arn: role_arn_for(name),
                policies: Vec::new(),
            },
        );
        Ok(RoleHandle {
            name: name.to_string(),
            role_id: Some(format!("AROA{}", name.to_uppercase())),
        })
    }

    async fn attach_policy(&self, role: &str, policy_arn: &str) -> Result<(), CloudApiError> {
        let mut state = self.enter("attach_policy")?;
        let r = state.roles.get_mut(role).ok_or_else(|| not_found("role", role))?;
        if !r.policies.iter().any(|p| p == policy_arn) {
            r.policies.push(policy_arn.to_string());
        }
        Ok(())
    }

    async fn role_arn(&self, role: &str) -> Result<String, CloudApiError> {
        let state = self.enter("role_arn")?;
        state
            .roles
            .get(role)
            .map(|r| r.arn.clone())
            .ok_or_else(|| not_found("role", role))
    }

    async fn detach_policy(&self, role: &str, policy_arn: &str) -> Result<(), CloudApiError> {
        let mut state = self.enter("detach_policy")?;
        let r = state.roles.get_mut(role).ok_or_else(|| not_found("role", role))?;
        let before = r.policies.len();
        r.policies.retain(|p| p != policy_arn);
        if r.policies.len() == before {
            return Err(not_found("role policy attachment", role));
        }
        Ok(())
    }

    async fn delete_role(&self, role: &str) -> Result<(), CloudApiError> {
        let mut state = self.enter("delete_role")?;
        match state.roles.get(role) {
            None => Err(not_found("role", role)),
            Some(r) if !r.policies.is_empty() => Err(CloudApiError::Service {
                operation: "DeleteRole",
                message: "DeleteConflict: role has attached policies".into(),
            }),
            Some(_) => {
                state.roles.remove(role);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl WarehouseApi for FakeCloud {
    async fn create_cluster(
        &self,
        spec: &ClusterSpec,
        role_arn: &str,
    ) -> Result<ClusterDescriptor, CloudApiError> {
        let mut state = self.enter("create_cluster")?;
        if state.clusters.contains_key(&spec.identifier) {
            return Err(CloudApiError::AlreadyExists {
                resource: "cluster",
                name: spec.identifier.clone(),
            });
        }
        let cluster = FakeCluster {
            status: ClusterStatus::Creating,
            polls_left: self.pending_polls,
            role_arns: vec![role_arn.to_string()],
        };
        let d = descriptor(&spec.identifier, &cluster);
        state.clusters.insert(spec.identifier.clone(), cluster);
        Ok(d)
    }

    async fn describe_cluster(&self, identifier: &str) -> Result<ClusterDescriptor, CloudApiError> {
        let mut state = self.enter("describe_cluster")?;
        if state.describe_lag > 0 {
            state.describe_lag -= 1;
            return Err(not_found("cluster", identifier));
        }
        let cluster = state
            .clusters
            .get_mut(identifier)
            .ok_or_else(|| not_found("cluster", identifier))?;

        let pending = matches!(cluster.status, ClusterStatus::Creating | ClusterStatus::Deleting);
        if pending && cluster.polls_left > 0 {
            cluster.polls_left -= 1;
            return Ok(descriptor(identifier, cluster));
        }
        let status = cluster.status.clone();
        match status {
            ClusterStatus::Creating => {
                cluster.status = ClusterStatus::Available;
                Ok(descriptor(identifier, cluster))
            }
            ClusterStatus::Deleting => {
                state.clusters.remove(identifier);
                Err(not_found("cluster", identifier))
            }
            _ => Ok(descriptor(identifier, cluster)),
        }
    }

    async fn delete_cluster(
        &self,
        identifier: &str,
        _skip_final_snapshot: bool,
    ) -> Result<(), CloudApiError> {
        let mut state = self.enter("delete_cluster")?;
        let cluster = state
            .clusters
            .get_mut(identifier)
            .ok_or_else(|| not_found("cluster", identifier))?;
        cluster.status = ClusterStatus::Deleting;
        cluster.polls_left = self.pending_polls;
        Ok(())
    }
}
