//! Statement execution against the warehouse.
//!
//! Every statement runs in its own transaction and is committed before the
//! next one starts. A failure aborts the remaining statements and leaves the
//! earlier ones committed.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dwh_core::DatabaseSettings;
use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tracing::{debug, error, info};

use crate::catalog::Statement;
use crate::error::EtlError;

#[async_trait]
pub trait SqlExecutor: Send {
    /// Execute `sql` in its own transaction and commit it.
    /// Returns the number of rows affected.
    async fn execute_committed(&mut self, sql: &str) -> Result<u64, sqlx::Error>;
}

/// Executor over a single PostgreSQL wire-protocol connection.
pub struct PgExecutor {
    conn: PgConnection,
}

impl PgExecutor {
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, EtlError> {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .database(&settings.name)
            .username(&settings.user)
            .password(&settings.password);

        let conn = PgConnection::connect_with(&options)
            .await
            .map_err(EtlError::Connect)?;
        info!(host = %settings.host, port = settings.port, db = %settings.name, "Connected to warehouse");
        Ok(Self { conn })
    }

    pub fn new(conn: PgConnection) -> Self {
        Self { conn }
    }

    /// The underlying connection, for ad-hoc queries.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    pub async fn close(self) -> Result<(), EtlError> {
        self.conn.close().await.map_err(EtlError::Connect)?;
        debug!("Warehouse connection closed");
        Ok(())
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn execute_committed(&mut self, sql: &str) -> Result<u64, sqlx::Error> {
        let mut tx = self.conn.begin().await?;
        let result = sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(sql)).await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

// ── Runs ─────────────────────────────────────────────────────────────

/// Outcome of a sequence of committed statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub statements: usize,
    pub rows_affected: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl RunSummary {
    fn start() -> Self {
        Self {
            statements: 0,
            rows_affected: 0,
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    /// Fold a later run into this one.
    pub fn merge(mut self, later: RunSummary) -> Self {
        self.statements += later.statements;
        self.rows_affected += later.rows_affected;
        self.elapsed += later.elapsed;
        self
    }
}

/// Run `statements` in order, committing each, and stop at the first failure.
pub async fn run_statements(
    executor: &mut dyn SqlExecutor,
    statements: &[Statement],
) -> Result<RunSummary, EtlError> {
    let mut summary = RunSummary::start();
    let clock = Instant::now();

    for stmt in statements {
        info!(statement = %stmt.label, "Executing");
        debug!(statement = %stmt.label, sql = %stmt.sql, "SQL");

        match executor.execute_committed(&stmt.sql).await {
            Ok(rows) => {
                summary.statements += 1;
                summary.rows_affected += rows;
                info!(statement = %stmt.label, rows, "Committed");
            }
            Err(source) => {
                error!(statement = %stmt.label, error = %source, "Statement failed");
                return Err(EtlError::Execution {
                    statement: stmt.label.clone(),
                    source,
                });
            }
        }
    }

    summary.elapsed = clock.elapsed();
    Ok(summary)
}

// ── Test double ──────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::recording::RecordingExecutor;
    use super::*;

    fn statements(n: usize) -> Vec<Statement> {
        (0..n)
            .map(|i| Statement {
                label: format!("stmt {i}"),
                sql: format!("SELECT {i};"),
            })
            .collect()
    }

    #[tokio::test]
    async fn runs_every_statement_in_order() {
        let mut exec = RecordingExecutor::default();
        let summary = run_statements(&mut exec, &statements(3)).await.unwrap();

        assert_eq!(summary.statements, 3);
        assert_eq!(summary.rows_affected, 3);
        assert_eq!(exec.executed, ["SELECT 0;", "SELECT 1;", "SELECT 2;"]);
    }

    #[tokio::test]
    async fn failure_stops_the_run_and_names_the_statement() {
        let mut exec = RecordingExecutor::failing_at(1);
        let err = run_statements(&mut exec, &statements(3)).await.unwrap_err();

        match err {
            EtlError::Execution { statement, .. } => assert_eq!(statement, "stmt 1"),
            other => panic!("unexpected error: {other}"),
        }
        // The first statement stays committed, the third never runs.
        assert_eq!(exec.executed, ["SELECT 0;"]);
    }

    #[test]
    fn merge_adds_counts() {
        let a = RunSummary {
            statements: 7,
            rows_affected: 0,
            started_at: Utc::now(),
            elapsed: Duration::from_millis(10),
        };
        let b = RunSummary {
            statements: 5,
            rows_affected: 42,
            started_at: Utc::now(),
            elapsed: Duration::from_millis(5),
        };
        let started = a.started_at;
        let merged = a.merge(b);
        assert_eq!(merged.statements, 12);
        assert_eq!(merged.rows_affected, 42);
        assert_eq!(merged.started_at, started);
        assert_eq!(merged.elapsed, Duration::from_millis(15));
    }
}
