//! Typed views over [`ConfigFile`] sections.
//!
//! Each settings struct is read on demand from the sections it needs, so a
//! binary that only talks to the database never requires cloud credentials
//! and vice versa.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigFile;
use crate::error::ConfigError;

pub const AWS: &str = "AWS";
pub const CLUSTER: &str = "CLUSTER";
pub const IAM_ROLE: &str = "IAM_ROLE";
pub const S3: &str = "S3";

/// Key written by provisioning and removed by teardown.
pub const HOST_KEY: &str = "host";
/// Key written by provisioning and removed by teardown.
pub const ARN_KEY: &str = "arn";

pub const DEFAULT_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess";
const DEFAULT_LOG_DATA: &str = "s3://udacity-dend/log_data";
const DEFAULT_SONG_DATA: &str = "s3://udacity-dend/song_data";
const DEFAULT_SOURCE_REGION: &str = "us-west-2";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

fn parse_key<T>(cfg: &ConfigFile, section: &str, key: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = cfg.get(section, key)?;
    parse_value(section, key, &raw)
}

fn parse_value<T>(section: &str, key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        section: section.to_string(),
        key: key.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

/// Strip one pair of matching surrounding quotes, as hand-written values often carry them.
fn unquote(value: &str) -> String {
    let v = value.trim();
    for q in ['\'', '"'] {
        if v.len() >= 2 && v.starts_with(q) && v.ends_with(q) {
            return v[1..v.len() - 1].to_string();
        }
    }
    v.to_string()
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        "(empty)".into()
    } else {
        "********".into()
    }
}

// ── AWS ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsSettings {
    /// When `None` the SDK default credential chain is used.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: String,
}

impl AwsSettings {
    pub fn from_config(cfg: &ConfigFile) -> Result<Self, ConfigError> {
        let access_key_id = cfg.get_opt(AWS, "key")?.filter(|s| !s.is_empty());
        let secret_access_key = cfg.get_opt(AWS, "secret")?.filter(|s| !s.is_empty());
        match (&access_key_id, &secret_access_key) {
            (Some(_), None) => return Err(ConfigError::missing(AWS, "secret")),
            (None, Some(_)) => return Err(ConfigError::missing(AWS, "key")),
            _ => {}
        }
        Ok(Self {
            access_key_id,
            secret_access_key,
            region: cfg.get(AWS, "region")?,
        })
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

// ── Cluster ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterType {
    SingleNode,
    MultiNode,
}

impl ClusterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleNode => "single-node",
            Self::MultiNode => "multi-node",
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single-node" => Ok(Self::SingleNode),
            "multi-node" => Ok(Self::MultiNode),
            other => Err(format!(
                "unknown cluster type '{other}': must be single-node or multi-node"
            )),
        }
    }
}

/// Polling for cluster waits. Read on its own so teardown does not need the
/// creation keys of `[CLUSTER]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitSettings {
    pub poll_interval_secs: u64,
    /// `None` waits indefinitely.
    pub wait_timeout_secs: Option<u64>,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            wait_timeout_secs: None,
        }
    }
}

impl WaitSettings {
    pub fn from_config(cfg: &ConfigFile) -> Result<Self, ConfigError> {
        let poll_interval_secs = match cfg.get_opt(CLUSTER, "poll_interval_secs")? {
            Some(raw) => parse_value::<u64>(CLUSTER, "poll_interval_secs", &raw)?,
            None => DEFAULT_POLL_INTERVAL_SECS,
        };
        let wait_timeout_secs = match cfg.get_opt(CLUSTER, "wait_timeout_secs")? {
            Some(raw) => Some(parse_value::<u64>(CLUSTER, "wait_timeout_secs", &raw)?),
            None => None,
        };
        Ok(Self {
            poll_interval_secs,
            wait_timeout_secs,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ClusterSettings {
    pub cluster_type: ClusterType,
    pub node_type: String,
    pub num_nodes: u32,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub db_port: u16,
    pub cluster_identifier: String,
    #[serde(flatten)]
    pub wait: WaitSettings,
}

impl ClusterSettings {
    pub fn from_config(cfg: &ConfigFile) -> Result<Self, ConfigError> {
        Ok(Self {
            cluster_type: parse_key(cfg, CLUSTER, "cluster_type")?,
            node_type: cfg.get(CLUSTER, "node_type")?,
            num_nodes: parse_key(cfg, CLUSTER, "num_nodes")?,
            db_name: cfg.get(CLUSTER, "db_name")?,
            db_user: cfg.get(CLUSTER, "db_user")?,
            db_password: cfg.get(CLUSTER, "db_password")?,
            db_port: parse_key(cfg, CLUSTER, "db_port")?,
            cluster_identifier: cfg.get(CLUSTER, "cluster_identifier")?,
            wait: WaitSettings::from_config(cfg)?,
        })
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            identifier = %self.cluster_identifier,
            cluster_type = %self.cluster_type,
            node_type = %self.node_type,
            num_nodes = self.num_nodes,
            db = %self.db_name,
            user = %self.db_user,
            port = self.db_port,
            "Cluster settings"
        );
    }
}

impl fmt::Debug for ClusterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSettings")
            .field("cluster_type", &self.cluster_type)
            .field("node_type", &self.node_type)
            .field("num_nodes", &self.num_nodes)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &redact(&self.db_password))
            .field("db_port", &self.db_port)
            .field("cluster_identifier", &self.cluster_identifier)
            .field("wait", &self.wait)
            .finish()
    }
}

// ── Database connection ───────────────────────────────────────

/// Connection parameters for the provisioned cluster. Requires `[CLUSTER] host`.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl DatabaseSettings {
    pub fn from_config(cfg: &ConfigFile) -> Result<Self, ConfigError> {
        Ok(Self {
            host: cfg.get(CLUSTER, HOST_KEY)?,
            port: parse_key(cfg, CLUSTER, "db_port")?,
            name: cfg.get(CLUSTER, "db_name")?,
            user: cfg.get(CLUSTER, "db_user")?,
            password: cfg.get(CLUSTER, "db_password")?,
        })
    }
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .finish()
    }
}

// ── IAM role ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IamRoleSettings {
    pub role_name: String,
    pub policy_arn: String,
    /// Present once provisioning has resolved the role.
    pub arn: Option<String>,
}

impl IamRoleSettings {
    pub fn from_config(cfg: &ConfigFile) -> Result<Self, ConfigError> {
        Ok(Self {
            role_name: cfg.get(IAM_ROLE, "role_name")?,
            policy_arn: cfg
                .get_opt(IAM_ROLE, "policy_arn")?
                .unwrap_or_else(|| DEFAULT_POLICY_ARN.to_string()),
            arn: cfg.get_opt(IAM_ROLE, ARN_KEY)?.filter(|s| !s.is_empty()),
        })
    }

    /// The resolved role ARN, failing with `MissingKey` before provisioning.
    pub fn require_arn(&self) -> Result<&str, ConfigError> {
        self.arn
            .as_deref()
            .ok_or_else(|| ConfigError::missing(IAM_ROLE, ARN_KEY))
    }
}

// ── S3 sources ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Settings {
    pub log_data: String,
    pub song_data: String,
    /// JSONPaths document mapping event log fields to staging columns.
    pub log_jsonpath: String,
    /// Region of the source bucket.
    pub region: String,
}

impl S3Settings {
    pub fn from_config(cfg: &ConfigFile) -> Result<Self, ConfigError> {
        let or_default = |key: &str, default: &str| -> Result<String, ConfigError> {
            Ok(cfg
                .get_opt(S3, key)?
                .map(|v| unquote(&v))
                .unwrap_or_else(|| default.to_string()))
        };
        Ok(Self {
            log_data: or_default("log_data", DEFAULT_LOG_DATA)?,
            song_data: or_default("song_data", DEFAULT_SONG_DATA)?,
            log_jsonpath: unquote(&cfg.get(S3, "log_jsonpath")?),
            region: or_default("region", DEFAULT_SOURCE_REGION)?,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
