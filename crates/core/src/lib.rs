pub mod config;
pub mod error;
pub mod settings;

pub use config::{load_dotenv, ConfigFile};
pub use error::ConfigError;
pub use settings::{
    AwsSettings, ClusterSettings, ClusterType, DatabaseSettings, IamRoleSettings, S3Settings,
    WaitSettings,
};
