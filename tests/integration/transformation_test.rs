//! Block execution integration tests.
//!
//! Runs whole block lists through the executor against the mock warehouse.

use pretty_assertions::assert_eq;
use snowflake_transformation::db::{MockWarehouse, RetryPolicy, RetryingWarehouse};
use snowflake_transformation::error::TransformationError;
use snowflake_transformation::transformation::{
    excerpt, Block, BlockExecutor, Code, RunEnvironment, RunState, SessionConfig,
};
use std::time::Duration;

#[tokio::test]
async fn test_comment_and_select_only_scripts_issue_no_writes() {
    let warehouse = MockWarehouse::new();
    let mut executor = BlockExecutor::new(&warehouse);

    let blocks = vec![
        Block::new(
            "comments",
            vec![Code::new(
                "only comments",
                ["-- first\n-- second", "/* multi\nline */", "// slash comment", ""],
            )],
        ),
        Block::new(
            "reads",
            vec![Code::new(
                "selects",
                ["SELECT * FROM \"input\"", "  select count(*) from \"input\"", "/* c */ SELECT 1"],
            )],
        ),
    ];

    executor.run(&blocks).await.unwrap();

    assert!(warehouse.statements().is_empty());
    assert_eq!(executor.state(), RunState::Completed);
}

#[tokio::test]
async fn test_statement_failure_message() {
    let warehouse = MockWarehouse::new().fail_when_contains(
        "test invalid query",
        "SQL compilation error:\nsyntax error line 1 at position 0 unexpected 'test'.",
    );
    let mut executor = BlockExecutor::new(&warehouse);

    let blocks = vec![Block::new(
        "first block",
        vec![Code::new("first code", ["test invalid query;"])],
    )];
    let err = executor.run(&blocks).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "Query \"test invalid query;\" in \"first code\" failed with error: \
         \"SQL compilation error:\nsyntax error line 1 at position 0 unexpected 'test'.\""
    );
    assert!(matches!(err, TransformationError::Statement { .. }));
    assert_eq!(err.kind().exit_code(), 1);
}

#[tokio::test]
async fn test_no_statement_runs_after_a_failure() {
    let warehouse = MockWarehouse::new().fail_when_contains("broken", "failed");
    let mut executor = BlockExecutor::new(&warehouse);

    let blocks = vec![
        Block::new("one", vec![Code::new("a", ["CREATE TABLE \"t1\" (\"a\" INT)", "broken"])]),
        Block::new("two", vec![Code::new("b", ["CREATE TABLE \"t2\" (\"a\" INT)"])]),
    ];
    assert!(executor.run(&blocks).await.is_err());

    assert!(warehouse.has_table("t1"));
    assert!(!warehouse.has_table("t2"));
    assert!(executor.transformation_failed());
}

#[tokio::test]
async fn test_session_directive_is_idempotent() {
    let session = SessionConfig::new("1234", Some(7200));
    let warehouse = MockWarehouse::new();
    let mut executor = BlockExecutor::new(&warehouse);

    executor.set_session(&session).await.unwrap();
    executor.set_session(&session).await.unwrap();

    let statements = warehouse.user_statements();
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0], statements[1]);
    assert_eq!(statements[0], session.directive());
}

#[tokio::test]
async fn test_abort_with_message() {
    let warehouse = MockWarehouse::new();
    let mut executor = BlockExecutor::new(&warehouse);

    let blocks = vec![Block::new(
        "block",
        vec![
            Code::new(
                "check",
                [
                    "CREATE TABLE \"before\" (\"a\" INT)",
                    "SET ABORT_TRANSFORMATION = 'stop now';",
                    "CREATE TABLE \"after\" (\"a\" INT)",
                ],
            ),
            Code::new("next", ["CREATE TABLE \"next\" (\"a\" INT)"]),
        ],
    )];
    let err = executor.run(&blocks).await.unwrap_err();

    assert_eq!(err.to_string(), "Transformation aborted with message \"stop now\"");
    assert_eq!(executor.state(), RunState::Aborted);
    assert!(warehouse.has_table("before"));
    assert!(!warehouse.has_table("after"));
    assert!(!warehouse.has_table("next"));
}

#[tokio::test]
async fn test_run_context_is_exported_as_variables() {
    let warehouse = MockWarehouse::new();
    let mut executor = BlockExecutor::new(&warehouse);
    executor
        .export_environment(&RunEnvironment {
            run_id: Some("77".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(warehouse.variable("KBC_RUNID"), Some("77".to_string()));
}

#[test]
fn test_two_thousand_character_excerpt() {
    let query: String = (0..2000)
        .map(|i| char::from(b'a' + (i % 26) as u8))
        .collect();
    let chars: Vec<char> = query.chars().collect();

    let expected = format!(
        "{}\n...\n{}",
        chars[..500].iter().collect::<String>(),
        chars[1500..].iter().collect::<String>()
    );
    assert_eq!(excerpt(&query), expected);
}

#[tokio::test]
async fn test_connection_failure_is_retried_under_retry_policy() {
    let warehouse = RetryingWarehouse::new(
        MockWarehouse::new().fail_connection(1),
        RetryPolicy::fail_fast()
            .with_attempts(3)
            .with_base_delay(Duration::ZERO),
    );
    let mut executor = BlockExecutor::new(&warehouse);

    executor
        .run(&[Block::new("b", vec![Code::new("c", ["CREATE TABLE \"t\" (\"a\" INT)"])])])
        .await
        .unwrap();

    assert!(warehouse.inner().has_table("t"));
}

#[tokio::test]
async fn test_query_errors_are_not_retried_under_retry_policy() {
    let warehouse = RetryingWarehouse::new(
        MockWarehouse::new().fail_when_contains("bad", "syntax error"),
        RetryPolicy::fail_fast()
            .with_attempts(5)
            .with_base_delay(Duration::ZERO),
    );
    let mut executor = BlockExecutor::new(&warehouse);

    let err = executor
        .run(&[Block::new("b", vec![Code::new("c", ["bad statement"])])])
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Query \"bad statement\" in \"c\" failed with error: \"syntax error\""
    );
    assert_eq!(warehouse.inner().statements(), vec!["bad statement"]);
}

#[tokio::test]
async fn test_exhausted_connection_retries_become_statement_errors() {
    let warehouse = RetryingWarehouse::new(
        MockWarehouse::new().fail_connection(100),
        RetryPolicy::fail_fast()
            .with_attempts(2)
            .with_base_delay(Duration::ZERO),
    );
    let mut executor = BlockExecutor::new(&warehouse);

    let err = executor
        .run(&[Block::new("b", vec![Code::new("c", ["CREATE TABLE \"t\" (\"a\" INT)"])])])
        .await
        .unwrap_err();

    assert!(matches!(err, TransformationError::Statement { .. }));
    assert!(err.to_string().contains("Connection reset by peer"));
}
