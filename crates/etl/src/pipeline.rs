//! Two-stage load: S3 into the staging tables, then staging into the
//! analytics tables.

use tracing::info;

use crate::catalog::{Dialect, QueryCatalog, StagingSources};
use crate::error::EtlError;
use crate::executor::{run_statements, RunSummary, SqlExecutor};

pub struct EtlPipeline<'a> {
    executor: &'a mut dyn SqlExecutor,
    catalog: QueryCatalog,
}

impl<'a> EtlPipeline<'a> {
    pub fn new(executor: &'a mut dyn SqlExecutor, dialect: Dialect) -> Self {
        Self {
            executor,
            catalog: QueryCatalog::new(dialect),
        }
    }

    /// Copy event logs and song metadata into the staging tables.
    ///
    /// Fails with [`EtlError::Unsupported`] before touching the database
    /// when the dialect cannot read from S3.
    pub async fn load_staging(&mut self, sources: &StagingSources) -> Result<RunSummary, EtlError> {
        let copies = self.catalog.copy_statements(sources)?;
        info!(log_data = %sources.log_data, song_data = %sources.song_data, "Loading staging tables");
        let summary = run_statements(&mut *self.executor, &copies).await?;
        info!(tables = summary.statements, elapsed_ms = summary.elapsed.as_millis() as u64, "Staging tables loaded");
        Ok(summary)
    }

    /// Populate the fact and dimension tables from staging.
    ///
    /// Events whose song title and artist name do not exactly match a
    /// staged song produce no songplay row.
    pub async fn transform_insert(&mut self) -> Result<RunSummary, EtlError> {
        let summary = run_statements(&mut *self.executor, &self.catalog.insert_statements()).await?;
        info!(
            tables = summary.statements,
            rows = summary.rows_affected,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Analytics tables inserted"
        );
        Ok(summary)
    }

    pub async fn run(&mut self, sources: &StagingSources) -> Result<RunSummary, EtlError> {
        let staged = self.load_staging(sources).await?;
        let inserted = self.transform_insert().await?;
        Ok(staged.merge(inserted))
    }
}
