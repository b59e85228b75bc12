//! Mock warehouse for testing.
//!
//! Provides an in-memory warehouse that understands the handful of statements
//! the transformation protocol relies on: session variables, table creation,
//! table description. Everything else succeeds without effect. Every
//! statement is recorded so tests can assert on exactly what was sent.

use super::{ColumnInfo, QueryResult, Value, Warehouse};
use crate::error::{Result, TransformationError};
use async_trait::async_trait;
use sqlparser::ast::{
    ColumnDef, ColumnOption, CreateTable, Expr, Ident, ObjectName, ObjectType,
    OneOrManyWithParens, Statement, Value as SqlValue,
};
use sqlparser::dialect::{Dialect, GenericDialect, SnowflakeDialect};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Word};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Default Snowflake reports for an `AUTOINCREMENT` column.
const IDENTITY_DEFAULT: &str = "IDENTITY START 1 INCREMENT 1";

/// A column of a mock table, stored the way Snowflake reports it.
#[derive(Debug, Clone)]
struct MockColumn {
    name: String,
    data_type: String,
    nullable: bool,
    default: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    statements: Vec<String>,
    variables: HashMap<String, String>,
    tables: HashMap<String, Vec<MockColumn>>,
    failures: Vec<(String, String)>,
    connection_failures: usize,
    reconnects: usize,
    closed: bool,
}

/// In-memory warehouse with a single session.
#[derive(Debug, Default)]
pub struct MockWarehouse {
    state: Mutex<MockState>,
}

impl MockWarehouse {
    /// Creates an empty mock warehouse.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table, columns given as `(name, type)` in SQL syntax.
    pub fn with_table(self, name: &str, columns: &[(&str, &str)]) -> Self {
        let columns = columns
            .iter()
            .map(|(column, data_type)| MockColumn {
                name: column.to_string(),
                data_type: normalize_type(data_type),
                nullable: true,
                default: None,
            })
            .collect();
        self.lock().tables.insert(name.to_string(), columns);
        self
    }

    /// Sets a session variable before the run starts.
    pub fn with_variable(self, name: &str, value: &str) -> Self {
        self.lock()
            .variables
            .insert(name.to_uppercase(), value.to_string());
        self
    }

    /// Makes every statement containing `fragment` fail with `message`.
    pub fn fail_when_contains(self, fragment: &str, message: &str) -> Self {
        self.lock()
            .failures
            .push((fragment.to_string(), message.to_string()));
        self
    }

    /// Makes the next `times` statements fail with a connection error.
    pub fn fail_connection(self, times: usize) -> Self {
        self.lock().connection_failures = times;
        self
    }

    /// All statements received so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    /// Statements other than abort checks and liveness probes.
    pub fn user_statements(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|s| !s.starts_with("SHOW VARIABLES") && s != "SELECT 1")
            .collect()
    }

    /// Number of reconnects performed.
    pub fn reconnects(&self) -> usize {
        self.lock().reconnects
    }

    /// Returns true once the session was closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Returns true if a table with this exact (case-sensitive) name exists.
    pub fn has_table(&self, name: &str) -> bool {
        self.lock().tables.contains_key(name)
    }

    /// Current value of a session variable.
    pub fn variable(&self, name: &str) -> Option<String> {
        self.lock().variables.get(&name.to_uppercase()).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the assertions.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let mut state = self.lock();
        state.statements.push(sql.to_string());

        if state.closed {
            return Err(TransformationError::connection("Session is closed"));
        }
        if state.connection_failures > 0 {
            state.connection_failures -= 1;
            return Err(TransformationError::connection("Connection reset by peer"));
        }
        if let Some((_, message)) = state.failures.iter().find(|(f, _)| sql.contains(f.as_str())) {
            return Err(TransformationError::query(message.clone()));
        }

        state.apply(sql.trim())
    }

    async fn reconnect(&self) -> Result<()> {
        let mut state = self.lock();
        state.reconnects += 1;
        state.closed = false;
        state.variables.clear();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}

impl MockState {
    fn apply(&mut self, sql: &str) -> Result<QueryResult> {
        if sql.eq_ignore_ascii_case("SELECT 1") {
            return Ok(QueryResult::from_rowset(
                vec![ColumnInfo::new("1")],
                vec![vec![Value::Int(1)]],
            ));
        }

        match session_command(sql) {
            Some(SessionCommand::Show(name)) => return Ok(self.show_variable(&name)),
            Some(SessionCommand::Unset(name)) => {
                self.variables.remove(&name);
                return Ok(QueryResult::default());
            }
            None => {}
        }

        // Anything the parser cannot read succeeds without effect.
        let Some(statement) = parse_statement(sql) else {
            return Ok(QueryResult::default());
        };

        match statement {
            Statement::SetVariable {
                variables, value, ..
            } => self.set_variables(variables, value),
            Statement::CreateTable(create) => self.create_table(create),
            Statement::Drop {
                object_type: ObjectType::Table,
                if_exists,
                names,
                ..
            } => self.drop_tables(&names, if_exists),
            Statement::ExplainTable { table_name, .. } => {
                let name = object_key(&table_name);
                let columns = self.tables.get(&name).ok_or_else(|| missing_table(&name))?;
                Ok(describe(columns))
            }
            _ => Ok(QueryResult::default()),
        }
    }

    fn show_variable(&self, name: &str) -> QueryResult {
        let rows = self
            .variables
            .get(name)
            .map(|value| {
                vec![vec![
                    Value::from(name),
                    Value::from(value.as_str()),
                    Value::from("TEXT"),
                ]]
            })
            .unwrap_or_default();
        QueryResult::from_rowset(
            vec![
                ColumnInfo::new("name"),
                ColumnInfo::new("value"),
                ColumnInfo::new("type"),
            ],
            rows,
        )
    }

    fn set_variables(
        &mut self,
        variables: OneOrManyWithParens<ObjectName>,
        values: Vec<Expr>,
    ) -> Result<QueryResult> {
        let names = match variables {
            OneOrManyWithParens::One(name) => vec![name],
            OneOrManyWithParens::Many(names) => names,
        };
        if names.len() != values.len() {
            return Err(TransformationError::query(
                "SQL compilation error: number of variables and values differ",
            ));
        }
        for (name, value) in names.iter().zip(values) {
            self.variables
                .insert(object_key(name).to_uppercase(), literal_text(value));
        }
        Ok(QueryResult::default())
    }

    fn create_table(&mut self, create: CreateTable) -> Result<QueryResult> {
        let name = object_key(&create.name);
        if !create.or_replace && self.tables.contains_key(&name) {
            if create.if_not_exists {
                return Ok(QueryResult::default());
            }
            return Err(TransformationError::query(format!(
                "SQL compilation error:\nObject '{name}' already exists."
            )));
        }
        let columns = create.columns.iter().map(mock_column).collect();
        self.tables.insert(name, columns);
        Ok(QueryResult::default())
    }

    fn drop_tables(&mut self, names: &[ObjectName], if_exists: bool) -> Result<QueryResult> {
        for name in names {
            let name = object_key(name);
            if self.tables.remove(&name).is_none() && !if_exists {
                return Err(missing_table(&name));
            }
        }
        Ok(QueryResult::default())
    }
}

/// Builds the `DESC TABLE` result the way Snowflake lays it out.
fn describe(columns: &[MockColumn]) -> QueryResult {
    let header = ["name", "type", "kind", "null?", "default", "primary key", "unique key"]
        .into_iter()
        .map(ColumnInfo::new)
        .collect();
    let rows = columns
        .iter()
        .map(|c| {
            vec![
                Value::from(c.name.as_str()),
                Value::from(c.data_type.as_str()),
                Value::from("COLUMN"),
                Value::from(if c.nullable { "Y" } else { "N" }),
                Value::from(c.default.clone()),
                Value::from("N"),
                Value::from("N"),
            ]
        })
        .collect();
    QueryResult::from_rowset(header, rows)
}

/// Session statements the Snowflake grammar of the parser does not model.
#[derive(Debug, PartialEq)]
enum SessionCommand {
    Show(String),
    Unset(String),
}

fn session_command(sql: &str) -> Option<SessionCommand> {
    let tokens: Vec<Token> = Tokenizer::new(&SnowflakeDialect {}, sql)
        .tokenize()
        .ok()?
        .into_iter()
        .filter(|t| !matches!(t, Token::Whitespace(_) | Token::SemiColon))
        .collect();

    match tokens.as_slice() {
        [Token::Word(show), Token::Word(variables), Token::Word(like), Token::SingleQuotedString(pattern)]
            if is_word(show, "SHOW") && is_word(variables, "VARIABLES") && is_word(like, "LIKE") =>
        {
            Some(SessionCommand::Show(pattern.to_uppercase()))
        }
        [Token::Word(unset), Token::Word(name)] if is_word(unset, "UNSET") => {
            Some(SessionCommand::Unset(name.value.to_uppercase()))
        }
        _ => None,
    }
}

fn is_word(word: &Word, expected: &str) -> bool {
    word.quote_style.is_none() && word.value.eq_ignore_ascii_case(expected)
}

/// Parses with the Snowflake grammar first. The generic grammar covers
/// column options it lacks, such as `AUTOINCREMENT`.
fn parse_statement(sql: &str) -> Option<Statement> {
    let dialects: [&dyn Dialect; 2] = [&SnowflakeDialect {}, &GenericDialect {}];
    dialects
        .into_iter()
        .find_map(|dialect| Parser::parse_sql(dialect, sql).ok()?.into_iter().next())
}

/// Name the way Snowflake resolves it: quoted verbatim, bare upper-cased.
fn ident_key(ident: &Ident) -> String {
    match ident.quote_style {
        Some(_) => ident.value.clone(),
        None => ident.value.to_uppercase(),
    }
}

/// Only the last part of a qualified name is kept.
fn object_key(name: &ObjectName) -> String {
    name.0.last().map(ident_key).unwrap_or_default()
}

fn literal_text(value: Expr) -> String {
    match value {
        Expr::Value(SqlValue::SingleQuotedString(text)) => text,
        other => other.to_string(),
    }
}

fn missing_table(name: &str) -> TransformationError {
    TransformationError::not_found(format!(
        "SQL compilation error:\nTable '{name}' does not exist or not authorized."
    ))
}

fn mock_column(definition: &ColumnDef) -> MockColumn {
    let mut column = MockColumn {
        name: ident_key(&definition.name),
        data_type: normalize_type(&definition.data_type.to_string()),
        nullable: true,
        default: None,
    };
    for option in &definition.options {
        match &option.option {
            ColumnOption::NotNull | ColumnOption::Unique { is_primary: true, .. } => {
                column.nullable = false
            }
            ColumnOption::Default(expr) => column.default = Some(expr.to_string()),
            ColumnOption::DialectSpecific(tokens)
                if tokens
                    .iter()
                    .any(|t| matches!(t, Token::Word(w) if w.value.eq_ignore_ascii_case("AUTOINCREMENT"))) =>
            {
                column.default = Some(IDENTITY_DEFAULT.to_string())
            }
            _ => {}
        }
    }
    column
}

/// Rewrites a declared type into the form `DESC TABLE` reports.
fn normalize_type(declared: &str) -> String {
    let declared = declared.trim().to_uppercase();
    let (base, args) = match declared.split_once('(') {
        Some((base, rest)) => (
            base.trim().to_string(),
            Some(
                rest.trim_end_matches(')')
                    .split(',')
                    .map(|a| a.trim().to_string())
                    .collect::<Vec<_>>(),
            ),
        ),
        None => (declared.clone(), None),
    };

    match (base.as_str(), args.as_deref()) {
        ("INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "BYTEINT", _) => {
            "NUMBER(38,0)".to_string()
        }
        ("NUMBER" | "DECIMAL" | "NUMERIC", None) => "NUMBER(38,0)".to_string(),
        ("NUMBER" | "DECIMAL" | "NUMERIC", Some([precision])) => format!("NUMBER({precision},0)"),
        ("NUMBER" | "DECIMAL" | "NUMERIC", Some([precision, scale])) => {
            format!("NUMBER({precision},{scale})")
        }
        ("VARCHAR" | "STRING" | "TEXT", None) => "VARCHAR(16777216)".to_string(),
        ("CHAR" | "CHARACTER", None) => "VARCHAR(1)".to_string(),
        ("VARCHAR" | "STRING" | "TEXT" | "CHAR" | "CHARACTER", Some([length])) => {
            format!("VARCHAR({length})")
        }
        ("FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "REAL", _) => "FLOAT".to_string(),
        ("DATETIME" | "TIMESTAMP", _) => "TIMESTAMP_NTZ(9)".to_string(),
        _ => declared,
    }
}
