//! Block/code executor and the abort signal check.

use super::preprocess::{excerpt, preprocess};
use super::session::{RunEnvironment, SessionConfig};
use super::{Block, ExecutionMode};
use crate::db::{quote_literal, Warehouse};
use crate::error::{Result, TransformationError};
use tracing::{debug, info};

/// Session variable user SQL sets to stop the run.
pub const ABORT_VARIABLE: &str = "ABORT_TRANSFORMATION";

/// Reads the abort variable from the warehouse session.
pub struct AbortSignal<'a> {
    warehouse: &'a dyn Warehouse,
    variable: String,
}

impl<'a> AbortSignal<'a> {
    /// Watches [`ABORT_VARIABLE`].
    pub fn new(warehouse: &'a dyn Warehouse) -> Self {
        Self::with_variable(warehouse, ABORT_VARIABLE)
    }

    pub fn with_variable(warehouse: &'a dyn Warehouse, variable: impl Into<String>) -> Self {
        Self {
            warehouse,
            variable: variable.into(),
        }
    }

    /// Returns the abort message when the variable holds a non-empty value.
    pub async fn check(&self) -> Result<Option<String>> {
        info!("Checking user termination");
        let sql = format!("SHOW VARIABLES LIKE {}", quote_literal(&self.variable));
        let result = self.warehouse.execute(&sql).await?;

        if result.is_empty() {
            return Ok(None);
        }
        Ok(result.text(0, "value").filter(|value| !value.is_empty()))
    }
}

/// Indices of the statement being executed, all zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub block: usize,
    pub code: usize,
    pub statement: usize,
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running(Position),
    Completed,
    Aborted,
    Failed,
}

/// Runs blocks against one warehouse session.
///
/// Every statement goes through the same path: preprocessing, logging,
/// execution and the abort check. The first failure stops the run.
pub struct BlockExecutor<'a> {
    warehouse: &'a dyn Warehouse,
    abort: AbortSignal<'a>,
    state: RunState,
}

impl<'a> BlockExecutor<'a> {
    pub fn new(warehouse: &'a dyn Warehouse) -> Self {
        Self {
            warehouse,
            abort: AbortSignal::new(warehouse),
            state: RunState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// True once a statement failed or the run was aborted.
    pub fn transformation_failed(&self) -> bool {
        matches!(self.state, RunState::Failed | RunState::Aborted)
    }

    /// Applies the query tag and statement timeout.
    pub async fn set_session(&mut self, session: &SessionConfig) -> Result<()> {
        self.execute_queries("alter session", &[session.directive()])
            .await
    }

    /// Exports the run context as session variables; no-op without values.
    pub async fn export_environment(&mut self, environment: &RunEnvironment) -> Result<()> {
        match environment.set_statement() {
            Some(statement) => self.execute_queries("set variables", &[statement]).await,
            None => {
                debug!("No run context to export");
                Ok(())
            }
        }
    }

    /// Executes statements outside of any block under `name`.
    pub async fn execute_queries(&mut self, name: &str, queries: &[String]) -> Result<()> {
        for query in queries {
            let outcome = self.execute_statement(name, query).await;
            self.track(outcome)?;
        }
        Ok(())
    }

    /// Runs every block, code and statement in order.
    pub async fn run(&mut self, blocks: &[Block]) -> Result<()> {
        for (block_index, block) in blocks.iter().enumerate() {
            info!("Processing block \"{}\".", block.name);
            if block.execution == ExecutionMode::Parallel {
                info!(
                    "Block \"{}\" is marked {}, its codes run sequentially.",
                    block.name, block.execution
                );
            }

            for (code_index, code) in block.codes.iter().enumerate() {
                info!("Processing code \"{}\".", code.name);

                for (statement_index, statement) in code.script.iter().enumerate() {
                    self.state = RunState::Running(Position {
                        block: block_index,
                        code: code_index,
                        statement: statement_index,
                    });
                    let outcome = self.execute_statement(&code.name, statement).await;
                    self.track(outcome)?;
                }
            }
        }

        self.state = RunState::Completed;
        Ok(())
    }

    async fn execute_statement(&self, name: &str, raw: &str) -> Result<()> {
        let prepared = preprocess(raw);
        if !prepared.should_execute {
            debug!("Skipping statement in \"{}\": {:?}", name, prepared.text);
            return Ok(());
        }

        let shown = excerpt(&prepared.text);
        info!("Running query \"{}\".", shown);

        let wrap = |e: TransformationError| TransformationError::statement(shown.as_str(), name, &e);
        self.warehouse
            .execute(&prepared.text)
            .await
            .map_err(wrap)?;

        match self.abort.check().await.map_err(wrap)? {
            Some(message) => Err(TransformationError::Aborted(message)),
            None => Ok(()),
        }
    }

    fn track(&mut self, outcome: Result<()>) -> Result<()> {
        if let Err(e) = &outcome {
            self.state = match e {
                TransformationError::Aborted(_) => RunState::Aborted,
                _ => RunState::Failed,
            };
        }
        outcome
    }
}
