//! Warehouse abstraction layer.
//!
//! Provides a trait-based interface for the warehouse connection, so the
//! execution engine runs the same against Snowflake and the in-memory mock.

mod keypair;
mod mock;
mod retry;
mod snowflake;
mod types;

pub use mock::MockWarehouse;
pub use retry::{RetryPolicy, RetryingWarehouse};
pub use snowflake::SnowflakeClient;
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::config::WorkspaceConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Creates a Snowflake client for the given workspace, wrapped in the retry
/// decorator when the policy allows more than one attempt.
pub async fn connect(
    config: &WorkspaceConfig,
    policy: RetryPolicy,
) -> Result<Box<dyn Warehouse>> {
    let client = SnowflakeClient::connect(config).await?;
    if policy.max_attempts > 1 {
        Ok(Box::new(RetryingWarehouse::new(client, policy)))
    } else {
        Ok(Box::new(client))
    }
}

/// Trait defining the interface for warehouse connections.
///
/// A connection owns exactly one warehouse session; session variables set by
/// one statement are visible to the next.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Executes a single SQL statement and returns its result rows.
    async fn execute(&self, sql: &str) -> Result<QueryResult>;

    /// Liveness probe.
    async fn ping(&self) -> Result<()> {
        self.execute("SELECT 1").await.map(|_| ())
    }

    /// Discards the current session and opens a new one.
    async fn reconnect(&self) -> Result<()>;

    /// Closes the warehouse session.
    async fn close(&self) -> Result<()>;
}

/// Quotes an identifier for Snowflake (`"name"`, embedded quotes doubled).
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a string literal for Snowflake (`'value'`, backslash-escaped).
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
