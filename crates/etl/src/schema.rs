use tracing::info;

use crate::catalog::{Dialect, QueryCatalog};
use crate::error::EtlError;
use crate::executor::{run_statements, RunSummary, SqlExecutor};

/// Drops and creates the seven star schema tables.
pub struct SchemaManager<'a> {
    executor: &'a mut dyn SqlExecutor,
    catalog: QueryCatalog,
}

impl<'a> SchemaManager<'a> {
    pub fn new(executor: &'a mut dyn SqlExecutor, dialect: Dialect) -> Self {
        Self {
            executor,
            catalog: QueryCatalog::new(dialect),
        }
    }

    pub async fn drop_all(&mut self) -> Result<RunSummary, EtlError> {
        let summary = run_statements(&mut *self.executor, &self.catalog.drop_statements()).await?;
        info!(tables = summary.statements, "Tables dropped");
        Ok(summary)
    }

    pub async fn create_all(&mut self) -> Result<RunSummary, EtlError> {
        let summary = run_statements(&mut *self.executor, &self.catalog.create_statements()).await?;
        info!(
            tables = summary.statements,
            dialect = %self.catalog.dialect(),
            "Tables created"
        );
        Ok(summary)
    }

    /// Drop every table, then create them all empty.
    pub async fn reset(&mut self) -> Result<RunSummary, EtlError> {
        let dropped = self.drop_all().await?;
        let created = self.create_all().await?;
        Ok(dropped.merge(created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::recording::RecordingExecutor;

    #[tokio::test]
    async fn reset_drops_then_creates() {
        let mut exec = RecordingExecutor::default();
        let summary = SchemaManager::new(&mut exec, Dialect::Redshift)
            .reset()
            .await
            .unwrap();

        assert_eq!(summary.statements, 14);
        assert_eq!(exec.executed.len(), 14);
        assert!(exec.executed[..7].iter().all(|s| s.starts_with("DROP TABLE IF EXISTS")));
        assert!(exec.executed[7..]
            .iter()
            .all(|s| s.starts_with("CREATE TABLE IF NOT EXISTS")));
        assert_eq!(exec.executed[0], "DROP TABLE IF EXISTS staging_events;");
        assert_eq!(exec.executed[6], "DROP TABLE IF EXISTS time;");
    }

    #[tokio::test]
    async fn failed_drop_keeps_earlier_drops_and_skips_creates() {
        let mut exec = RecordingExecutor::failing_at(2);
        let err = SchemaManager::new(&mut exec, Dialect::Redshift)
            .reset()
            .await
            .unwrap_err();

        assert!(matches!(err, EtlError::Execution { ref statement, .. } if statement == "drop songplays"));
        assert_eq!(
            exec.executed,
            [
                "DROP TABLE IF EXISTS staging_events;",
                "DROP TABLE IF EXISTS staging_songs;"
            ]
        );
    }

    #[tokio::test]
    async fn create_all_twice_reissues_idempotent_ddl() {
        let mut exec = RecordingExecutor::default();
        let mut schema = SchemaManager::new(&mut exec, Dialect::Postgres);
        schema.create_all().await.unwrap();
        schema.create_all().await.unwrap();
        drop(schema);

        assert_eq!(exec.executed.len(), 14);
        assert_eq!(exec.executed[..7], exec.executed[7..]);
    }
}
