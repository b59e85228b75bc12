//! Error types for the transformation component.
//!
//! Defines the main error enum used throughout the application and the
//! user/application classification the entry point maps to exit codes.

use thiserror::Error;

/// Main error type for transformation operations.
#[derive(Error, Debug)]
pub enum TransformationError {
    /// Required configuration is missing or invalid (no workspace authorization, bad config file).
    #[error("{0}")]
    Config(String),

    /// Warehouse connection errors (host unreachable, session expired, transport failure).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query errors reported by the warehouse (syntax errors, timeouts, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// The warehouse reported that the referenced object does not exist.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// A user statement failed inside a block/code.
    #[error("Query \"{query}\" in \"{name}\" failed with error: \"{message}\"")]
    Statement {
        query: String,
        name: String,
        message: String,
    },

    /// The user SQL set the abort variable.
    #[error("Transformation aborted with message \"{0}\"")]
    Aborted(String),

    /// Expected output tables were not created by the transformation.
    #[error(
        "Tables \"{}\" specified in output were not created by the transformation.",
        .0.join("\", \"")
    )]
    MissingTables(Vec<String>),

    /// Manifest files could not be written.
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// A state the component should never reach.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Who is expected to fix a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The transformation itself failed (bad SQL, abort, missing outputs).
    User,
    /// The component could not run (missing authorization, broken setup).
    Application,
}

impl FailureKind {
    /// Process exit code for this kind of failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::User => 1,
            Self::Application => 2,
        }
    }
}

impl TransformationError {
    // Shorthand constructors for the message-only variants.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wraps a failed statement with the block/code context it ran in.
    pub fn statement(
        query: impl Into<String>,
        name: impl Into<String>,
        cause: &TransformationError,
    ) -> Self {
        Self::Statement {
            query: query.into(),
            name: name.into(),
            message: cause.detail(),
        }
    }

    /// Returns the message without the category prefix.
    ///
    /// Adapter errors are embedded into statement errors verbatim, so the
    /// warehouse text must not carry our own "Query error:" prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Config(msg)
            | Self::Connection(msg)
            | Self::Query(msg)
            | Self::NotFound(msg)
            | Self::Manifest(msg)
            | Self::Internal(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// Returns true for connection-level failures that may succeed on a new attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Classifies the error for exit code mapping.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Config(_) | Self::Manifest(_) | Self::Internal(_) => FailureKind::Application,
            _ => FailureKind::User,
        }
    }

    /// Short label printed before the message in the failure log line.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "Configuration Error",
            Self::Connection(_) => "Connection Error",
            Self::Query(_) | Self::NotFound(_) | Self::Statement { .. } => "Query Error",
            Self::Aborted(_) => "Aborted",
            Self::MissingTables(_) => "Output Error",
            Self::Manifest(_) => "Manifest Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

pub type Result<T> = std::result::Result<T, TransformationError>;
