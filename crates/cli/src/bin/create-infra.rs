//! create-infra: IAM role, policy and Redshift cluster, recorded in the config file.
//!
//! Any failure after the first AWS call tears everything down again.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use dwh_cli::{aws_clients, init_logging, load_config, ConfigArgs};
use dwh_provision::Provisioner;

#[derive(Parser, Debug)]
#[command(name = "create-infra", version, about)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = load_config(&cli.config.config)?;
    let (identity, warehouse) = aws_clients(&config).await?;

    let descriptor = Provisioner::new(&identity, &warehouse)
        .provision(&mut config)
        .await
        .context("provisioning failed")?;

    for (key, value) in descriptor.properties() {
        info!("{key}: {value}");
    }
    info!(path = %cli.config.config.display(), "Infrastructure ready");
    Ok(())
}
