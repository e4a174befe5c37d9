pub mod config;
pub mod pool;
pub mod postgres;
pub mod scripted;

use crate::core::{Result, Row, SqlError, Value};
use async_trait::async_trait;
use config::DatabaseConfig;

/// A single driver connection.
///
/// Statements arrive in positional form (`$1`, `$2`, ...) with one value per
/// placeholder. Errors keep the server's SQLSTATE and constraint name so the
/// constraint validator can map them back onto model fields.
#[async_trait]
pub trait SqlConnection: Send {
    async fn query(&mut self, sql: &str, params: &[Value]) -> std::result::Result<Vec<Row>, SqlError>;

    /// Returns the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> std::result::Result<u64, SqlError>;

    /// Runs parameterless statements (transaction control, migration scripts).
    async fn batch_execute(&mut self, sql: &str) -> std::result::Result<(), SqlError>;

    fn is_closed(&self) -> bool {
        false
    }
}

/// Opens driver connections for the pool.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &DatabaseConfig) -> Result<Box<dyn SqlConnection>>;
}
