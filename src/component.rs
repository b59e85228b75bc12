//! Transformation run orchestration.
//!
//! Ties configuration, the warehouse session, block execution and manifest
//! generation together for one run.

use crate::config::Config;
use crate::db::{self, RetryPolicy, Warehouse};
use crate::error::Result;
use crate::manifest::{build, ManifestWriter, TableIntrospector};
use crate::transformation::{BlockExecutor, RunEnvironment, SessionConfig};
use tracing::{info, warn};

/// One transformation run.
pub struct Component {
    config: Config,
    environment: RunEnvironment,
}

impl Component {
    pub fn new(config: Config, environment: RunEnvironment) -> Self {
        Self {
            config,
            environment,
        }
    }

    /// Connects to the configured Snowflake workspace and runs.
    pub async fn run(&self, policy: RetryPolicy, writer: &dyn ManifestWriter) -> Result<()> {
        let workspace = self.config.workspace()?;
        info!(
            "Connecting to Snowflake workspace {}.{} at {}",
            workspace.database, workspace.schema, workspace.host
        );
        let warehouse = db::connect(workspace, policy).await?;
        self.run_with_warehouse(warehouse.as_ref(), writer).await
    }

    /// Runs against an open warehouse session and closes it afterwards.
    ///
    /// After a failed run the manifests of write-always tables are still
    /// produced. If that fails too, the run error is returned.
    pub async fn run_with_warehouse(
        &self,
        warehouse: &dyn Warehouse,
        writer: &dyn ManifestWriter,
    ) -> Result<()> {
        let schema = self.config.workspace()?.schema.clone();

        let outcome = self.transform(warehouse, &schema, writer).await;

        if let Err(e) = warehouse.close().await {
            warn!("Failed to close the warehouse session: {}", e);
        }
        outcome
    }

    async fn transform(
        &self,
        warehouse: &dyn Warehouse,
        schema: &str,
        writer: &dyn ManifestWriter,
    ) -> Result<()> {
        let mut executor = BlockExecutor::new(warehouse);
        let session = SessionConfig::new(self.environment.run_id(), self.config.query_timeout());

        let run = self.execute(&mut executor, &session).await;
        let failed = run.is_err() || executor.transformation_failed();

        let manifests = self.write_manifests(warehouse, schema, failed, writer).await;

        match (run, manifests) {
            (Ok(()), manifests) => manifests,
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(manifest_error)) => {
                warn!(
                    "Manifests of write-always tables could not be created: {}",
                    manifest_error
                );
                Err(e)
            }
        }
    }

    async fn execute(&self, executor: &mut BlockExecutor<'_>, session: &SessionConfig) -> Result<()> {
        executor.set_session(session).await?;
        executor.export_environment(&self.environment).await?;
        executor.run(&self.config.blocks()).await
    }

    async fn write_manifests(
        &self,
        warehouse: &dyn Warehouse,
        schema: &str,
        transformation_failed: bool,
        writer: &dyn ManifestWriter,
    ) -> Result<()> {
        let expected = self.config.expected_output_tables();
        let tables = TableIntrospector::new(warehouse, schema)
            .introspect(expected, transformation_failed)
            .await?;

        for table in &tables {
            let destination = expected
                .iter()
                .find(|t| t.source == table.name)
                .map(|t| t.destination.as_str())
                .unwrap_or_default();
            writer.write(&table.name, &build(table, destination))?;
        }
        Ok(())
    }
}
