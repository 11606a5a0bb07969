//! create-tables: drop and recreate the staging and star schema tables.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use dwh_cli::{init_logging, load_config, ConfigArgs};
use dwh_core::DatabaseSettings;
use dwh_etl::{Dialect, PgExecutor, SchemaManager};

#[derive(Parser, Debug)]
#[command(name = "create-tables", version, about)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// SQL dialect of the target database: redshift or postgres.
    #[arg(long, default_value = "redshift")]
    dialect: Dialect,

    /// Only drop the tables.
    #[arg(long)]
    drop_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = load_config(&cli.config.config)?;
    let db = DatabaseSettings::from_config(&config).context("invalid database settings")?;
    let mut executor = PgExecutor::connect(&db).await?;

    let mut schema = SchemaManager::new(&mut executor, cli.dialect);
    let result = if cli.drop_only {
        schema.drop_all().await
    } else {
        schema.reset().await
    };
    executor.close().await?;

    let summary = result.context("schema update failed")?;
    info!(
        statements = summary.statements,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Schema ready"
    );
    Ok(())
}
