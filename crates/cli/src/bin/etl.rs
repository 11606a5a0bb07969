//! etl: load the staging tables from S3, then populate the star schema.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::info;

use dwh_cli::{init_logging, load_config, ConfigArgs};
use dwh_core::DatabaseSettings;
use dwh_etl::{Dialect, EtlPipeline, PgExecutor, StagingSources};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Stage {
    /// COPY from S3 into the staging tables.
    Staging,
    /// INSERT from staging into the analytics tables.
    Transform,
    All,
}

#[derive(Parser, Debug)]
#[command(name = "etl", version, about)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// SQL dialect of the target database: redshift or postgres.
    #[arg(long, default_value = "redshift")]
    dialect: Dialect,

    #[arg(long, value_enum, default_value_t = Stage::All)]
    stage: Stage,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = load_config(&cli.config.config)?;
    let db = DatabaseSettings::from_config(&config).context("invalid database settings")?;
    let sources = match cli.stage {
        Stage::Transform => None,
        Stage::Staging | Stage::All => Some(
            StagingSources::from_config(&config).context("invalid staging source settings")?,
        ),
    };

    let mut executor = PgExecutor::connect(&db).await?;
    let mut pipeline = EtlPipeline::new(&mut executor, cli.dialect);
    let result = match (&sources, cli.stage) {
        (Some(src), Stage::Staging) => pipeline.load_staging(src).await,
        (Some(src), _) => pipeline.run(src).await,
        (None, _) => pipeline.transform_insert().await,
    };
    executor.close().await?;

    let summary = result.context("ETL failed")?;
    info!(
        statements = summary.statements,
        rows = summary.rows_affected,
        started_at = %summary.started_at,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "ETL finished"
    );
    Ok(())
}
