//! Block/code execution engine.
//!
//! Runs the configured SQL scripts in order inside one warehouse session:
//! session setup first, then every block's codes' statements, checking the
//! abort variable after each executed statement.

mod executor;
mod preprocess;
mod session;

pub use executor::{AbortSignal, BlockExecutor, Position, RunState, ABORT_VARIABLE};
pub use preprocess::{excerpt, preprocess, strip_comments, Prepared};
pub use session::{RunEnvironment, SessionConfig};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named, ordered group of codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,

    /// Declared execution mode; both modes run sequentially.
    #[serde(default)]
    pub execution: ExecutionMode,

    pub codes: Vec<Code>,
}

impl Block {
    /// Creates a serial block.
    pub fn new(name: impl Into<String>, codes: Vec<Code>) -> Self {
        Self {
            name: name.into(),
            execution: ExecutionMode::Serial,
            codes,
        }
    }
}

/// A named, ordered group of SQL statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Code {
    pub name: String,
    pub script: Vec<String>,
}

impl Code {
    /// Creates a code from its statements.
    pub fn new<S: Into<String>>(name: impl Into<String>, script: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            script: script.into_iter().map(Into::into).collect(),
        }
    }
}

/// Execution mode accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Serial,
    Parallel,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Parallel => write!(f, "parallel"),
        }
    }
}
