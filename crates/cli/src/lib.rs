//! Start-up plumbing shared by the four binaries.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use dwh_core::{AwsSettings, ConfigFile};
use dwh_provision::{load_sdk_config, AwsIdentity, AwsWarehouse};
use tracing::info;

/// `--config` flag common to every binary.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to the TOML config file.
    #[arg(long, env = "DWH_CONFIG", default_value = "dwh.toml")]
    pub config: PathBuf,
}

/// Initialise `tracing` with `RUST_LOG`, defaulting to `info`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

/// Load `.env`, then the config file with environment overrides enabled.
pub fn load_config(path: &Path) -> Result<ConfigFile> {
    dwh_core::load_dotenv();
    let config = ConfigFile::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?
        .with_env_overrides();
    info!(path = %path.display(), "Config loaded");
    Ok(config)
}

/// IAM and Redshift clients sharing one SDK config.
pub async fn aws_clients(config: &ConfigFile) -> Result<(AwsIdentity, AwsWarehouse)> {
    let aws = AwsSettings::from_config(config).context("invalid [AWS] settings")?;
    let sdk = load_sdk_config(&aws).await;
    Ok((AwsIdentity::new(&sdk), AwsWarehouse::new(&sdk)))
}
