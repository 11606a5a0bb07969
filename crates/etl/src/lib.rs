pub mod catalog;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod schema;

pub use catalog::{Dialect, QueryCatalog, StagingSources, Statement, TableDef, TABLES};
pub use error::EtlError;
pub use executor::{run_statements, PgExecutor, RunSummary, SqlExecutor};
pub use pipeline::EtlPipeline;
pub use schema::SchemaManager;
