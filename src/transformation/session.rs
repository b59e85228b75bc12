//! Session setup directives.

use crate::db::quote_literal;
use serde_json::json;

/// Values applied to the warehouse session before any block runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    /// Statement timeout in seconds; `None` or zero leaves the warehouse default.
    pub query_timeout_seconds: Option<u64>,
    /// Platform run id, recorded in the query tag.
    pub run_id: String,
}

impl SessionConfig {
    pub fn new(run_id: impl Into<String>, query_timeout_seconds: Option<u64>) -> Self {
        Self {
            query_timeout_seconds,
            run_id: run_id.into(),
        }
    }

    /// Builds the `ALTER SESSION` directive.
    ///
    /// The output depends only on the run id and the timeout, so running it
    /// twice applies the same settings.
    pub fn directive(&self) -> String {
        let tag = json!({ "runId": self.run_id }).to_string();
        let mut settings = vec![format!("QUERY_TAG={}", quote_literal(&tag))];

        if let Some(timeout) = self.query_timeout_seconds.filter(|t| *t > 0) {
            settings.push(format!("STATEMENT_TIMEOUT_IN_SECONDS={timeout}"));
        }

        format!("ALTER SESSION SET {};", settings.join(","))
    }
}

/// Run context exported as session variables, so user SQL can read e.g.
/// `$KBC_RUNID`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunEnvironment {
    pub run_id: Option<String>,
    pub project_id: Option<String>,
    pub stack_id: Option<String>,
    pub config_id: Option<String>,
    pub component_id: Option<String>,
    pub config_row_id: Option<String>,
    pub branch_id: Option<String>,
}

impl RunEnvironment {
    /// Variables that have a value, in a fixed order.
    pub fn variables(&self) -> Vec<(&'static str, &str)> {
        [
            ("KBC_RUNID", &self.run_id),
            ("KBC_PROJECTID", &self.project_id),
            ("KBC_STACKID", &self.stack_id),
            ("KBC_CONFIGID", &self.config_id),
            ("KBC_COMPONENTID", &self.component_id),
            ("KBC_CONFIGROWID", &self.config_row_id),
            ("KBC_BRANCHID", &self.branch_id),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }

    /// Builds one `SET (..) = (..);` statement, `None` when nothing is set.
    pub fn set_statement(&self) -> Option<String> {
        let variables = self.variables();
        if variables.is_empty() {
            return None;
        }

        let names: Vec<&str> = variables.iter().map(|(name, _)| *name).collect();
        let values: Vec<String> = variables.iter().map(|(_, value)| quote_literal(value)).collect();
        Some(format!("SET ({}) = ({});", names.join(", "), values.join(", ")))
    }

    /// Run id for the query tag, empty when the platform did not provide one.
    pub fn run_id(&self) -> &str {
        self.run_id.as_deref().unwrap_or_default()
    }
}
