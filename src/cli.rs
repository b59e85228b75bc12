//! Command-line argument parsing.
//!
//! The platform starts the component without arguments and passes everything
//! through environment variables, so every option has an env fallback.

use crate::db::RetryPolicy;
use crate::transformation::RunEnvironment;
use clap::Parser;
use std::path::PathBuf;

/// Runs a Snowflake SQL transformation in a Keboola data directory.
#[derive(Parser, Debug)]
#[command(name = "snowflake-transformation")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Data directory containing config.json
    #[arg(long, env = "KBC_DATADIR", value_name = "PATH", default_value = "/data")]
    pub data_dir: PathBuf,

    /// Attempts per statement on connection failures (1 disables retries)
    #[arg(long, env = "SNOWFLAKE_MAX_ATTEMPTS", value_name = "N", default_value_t = 1)]
    pub max_attempts: u32,

    /// Run against the in-memory warehouse instead of Snowflake
    #[arg(long)]
    pub mock_warehouse: bool,

    #[arg(long, env = "KBC_RUNID", hide = true)]
    pub run_id: Option<String>,

    #[arg(long, env = "KBC_PROJECTID", hide = true)]
    pub project_id: Option<String>,

    #[arg(long, env = "KBC_STACKID", hide = true)]
    pub stack_id: Option<String>,

    #[arg(long, env = "KBC_CONFIGID", hide = true)]
    pub config_id: Option<String>,

    #[arg(long, env = "KBC_COMPONENTID", hide = true)]
    pub component_id: Option<String>,

    #[arg(long, env = "KBC_CONFIGROWID", hide = true)]
    pub config_row_id: Option<String>,

    #[arg(long, env = "KBC_BRANCHID", hide = true)]
    pub branch_id: Option<String>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Run context to export into the warehouse session.
    pub fn environment(&self) -> RunEnvironment {
        RunEnvironment {
            run_id: self.run_id.clone(),
            project_id: self.project_id.clone(),
            stack_id: self.stack_id.clone(),
            config_id: self.config_id.clone(),
            component_id: self.component_id.clone(),
            config_row_id: self.config_row_id.clone(),
            branch_id: self.branch_id.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fail_fast().with_attempts(self.max_attempts)
    }
}
