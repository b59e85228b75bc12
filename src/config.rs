//! Configuration management.
//!
//! Handles loading the component configuration (`config.json` in the data
//! directory): workspace authorization, the blocks to run and the output
//! tables to describe.

use crate::error::{Result, TransformationError};
use crate::manifest::ExpectedOutputTable;
use crate::transformation::{Block, Code, ExecutionMode};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Statement timeout applied when the configuration does not set one.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 7200;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Credentials provided by the platform.
    #[serde(default)]
    pub authorization: Option<Authorization>,

    /// User parameters.
    pub parameters: Parameters,

    /// Input/output mapping.
    #[serde(default)]
    pub storage: Storage,
}

/// Authorization section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Authorization {
    /// Snowflake workspace credentials.
    pub workspace: Option<WorkspaceConfig>,
}

/// Snowflake workspace connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkspaceConfig {
    /// Account host, e.g. `acct.eu-central-1.snowflakecomputing.com`.
    pub host: String,

    /// HTTPS port, 443 when absent.
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,

    /// Login name.
    pub user: String,

    /// Password, empty when key-pair authentication is used.
    #[serde(default)]
    pub password: Option<String>,

    /// PEM private key for key-pair authentication.
    #[serde(default, rename = "privateKey")]
    pub private_key: Option<String>,

    /// Virtual warehouse to run statements on.
    #[serde(default)]
    pub warehouse: Option<String>,

    /// Workspace database.
    pub database: String,

    /// Workspace schema; output tables are looked up here.
    pub schema: String,

    /// Account name, derived from the host when absent.
    #[serde(default)]
    pub account: Option<String>,
}

/// User parameters of the transformation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Parameters {
    /// Blocks of codes to run.
    #[serde(default)]
    pub blocks: Option<Vec<Block>>,

    /// Older layout: steps of blocks with scripts.
    #[serde(default)]
    pub steps: Option<Vec<Step>>,

    /// Statement timeout in seconds.
    #[serde(default = "default_query_timeout")]
    pub query_timeout: u64,
}

fn default_query_timeout() -> u64 {
    DEFAULT_QUERY_TIMEOUT_SECS
}

/// A step in the older configuration layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub execution: ExecutionMode,
    pub blocks: Vec<StepBlock>,
}

/// A block inside a step; it carries its script directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepBlock {
    pub name: String,
    pub script: Vec<String>,
}

/// Storage mapping section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Storage {
    #[serde(default)]
    pub output: OutputMapping,
}

/// Output mapping.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputMapping {
    #[serde(default)]
    pub tables: Vec<ExpectedOutputTable>,
}

/// Ports arrive as numbers or, when filled from environment variables, as strings.
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Port::Number(port)) => Ok(Some(port)),
        Some(Port::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Port::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid port '{text}'"))),
    }
}

impl Config {
    /// Returns the config file path inside a data directory.
    pub fn path_in(data_dir: &Path) -> PathBuf {
        data_dir.join("config.json")
    }

    /// Loads configuration from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TransformationError::config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        Self::parse_json(&content)
    }

    /// Parses and validates configuration from a JSON string.
    pub fn parse_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| TransformationError::config(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.parameters.blocks.is_none() && self.parameters.steps.is_none() {
            return Err(TransformationError::config(
                "The child node \"blocks\" at path \"root.parameters\" must be configured.",
            ));
        }
        Ok(())
    }

    /// Returns the workspace credentials.
    pub fn workspace(&self) -> Result<&WorkspaceConfig> {
        self.authorization
            .as_ref()
            .and_then(|a| a.workspace.as_ref())
            .ok_or_else(|| TransformationError::config("Missing authorization for workspace"))
    }

    /// Blocks to execute, with the older step layout normalized into blocks.
    pub fn blocks(&self) -> Vec<Block> {
        if let Some(blocks) = &self.parameters.blocks {
            return blocks.clone();
        }

        self.parameters
            .steps
            .iter()
            .flatten()
            .map(|step| Block {
                name: step.name.clone(),
                execution: step.execution,
                codes: step
                    .blocks
                    .iter()
                    .map(|b| Code {
                        name: b.name.clone(),
                        script: b.script.clone(),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Statement timeout, `None` when disabled with zero.
    pub fn query_timeout(&self) -> Option<u64> {
        Some(self.parameters.query_timeout).filter(|t| *t > 0)
    }

    /// Output tables the transformation is expected to create.
    pub fn expected_output_tables(&self) -> &[ExpectedOutputTable] {
        &self.storage.output.tables
    }
}
