use dwh_core::ConfigError;

use crate::catalog::Dialect;

#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    #[error("failed to connect to the warehouse: {0}")]
    Connect(#[source] sqlx::Error),

    /// A statement failed. Statements before it stay committed.
    #[error("statement '{statement}' failed: {source}")]
    Execution {
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{operation} is not supported by the {dialect} dialect")]
    Unsupported {
        operation: &'static str,
        dialect: Dialect,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
