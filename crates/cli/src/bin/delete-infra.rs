//! delete-infra: remove the cluster and IAM role, then clear `host` and `arn`
//! from the config file.

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use dwh_cli::{aws_clients, init_logging, load_config, ConfigArgs};
use dwh_core::WaitSettings;
use dwh_provision::{Teardown, WaitPolicy};

#[derive(Parser, Debug)]
#[command(name = "delete-infra", version, about)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = load_config(&cli.config.config)?;
    let wait = WaitSettings::from_config(&config).context("invalid [CLUSTER] polling settings")?;
    let (identity, warehouse) = aws_clients(&config).await?;

    let report = Teardown::new(&identity, &warehouse, WaitPolicy::from_settings(&wait))
        .run(&mut config)
        .await
        .context("teardown failed")?;

    if !report.is_clean() {
        bail!(
            "teardown incomplete: cluster {}, role {}",
            report.cluster,
            report.role
        );
    }
    info!(cluster = %report.cluster, role = %report.role, "Infrastructure deleted");
    Ok(())
}
