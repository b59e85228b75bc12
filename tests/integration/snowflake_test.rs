//! Snowflake integration tests.
//!
//! These tests need a Snowflake workspace. Set SNOWFLAKE_HOST, SNOWFLAKE_USER,
//! SNOWFLAKE_PASSWORD, SNOWFLAKE_WAREHOUSE, SNOWFLAKE_DATABASE and
//! SNOWFLAKE_SCHEMA to run them.

use snowflake_transformation::config::WorkspaceConfig;
use snowflake_transformation::db::{SnowflakeClient, Warehouse};
use snowflake_transformation::manifest::{BaseType, ExpectedOutputTable, TableIntrospector};
use snowflake_transformation::transformation::{
    AbortSignal, Block, BlockExecutor, Code, SessionConfig,
};

/// Helper to read the workspace from the environment.
fn get_test_workspace() -> Option<WorkspaceConfig> {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
    Some(WorkspaceConfig {
        host: var("SNOWFLAKE_HOST")?,
        port: var("SNOWFLAKE_PORT").and_then(|p| p.parse().ok()),
        user: var("SNOWFLAKE_USER")?,
        password: var("SNOWFLAKE_PASSWORD"),
        private_key: None,
        warehouse: var("SNOWFLAKE_WAREHOUSE"),
        database: var("SNOWFLAKE_DATABASE")?,
        schema: var("SNOWFLAKE_SCHEMA")?,
        account: var("SNOWFLAKE_ACCOUNT"),
    })
}

/// Helper to create a test client.
async fn get_test_client() -> Option<(SnowflakeClient, String)> {
    let workspace = get_test_workspace()?;
    let client = SnowflakeClient::connect(&workspace).await.ok()?;
    Some((client, workspace.schema))
}

#[tokio::test]
async fn test_ping() {
    let Some((client, _)) = get_test_client().await else {
        eprintln!("Skipping test: SNOWFLAKE_HOST not set");
        return;
    };

    client.ping().await.unwrap();
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_run_and_describe() {
    let Some((client, schema)) = get_test_client().await else {
        eprintln!("Skipping test: SNOWFLAKE_HOST not set");
        return;
    };

    let mut executor = BlockExecutor::new(&client);
    executor
        .set_session(&SessionConfig::new("integration-test", Some(60)))
        .await
        .unwrap();
    executor
        .run(&[Block::new(
            "setup",
            vec![Code::new(
                "create",
                [
                    "CREATE OR REPLACE TABLE \"it_output\" (\"id\" INT, \"name\" VARCHAR(200))",
                    "INSERT INTO \"it_output\" VALUES (1, 'one')",
                ],
            )],
        )])
        .await
        .unwrap();

    let tables = TableIntrospector::new(&client, schema)
        .introspect(&[ExpectedOutputTable::new("it_output", "")], false)
        .await
        .unwrap();
    let columns = &tables[0].columns;
    assert_eq!(columns.len(), 2);
    assert_eq!(columns[0].datatype().base_type(), Some(BaseType::Numeric));
    assert_eq!(columns[1].datatype().base_type(), Some(BaseType::String));

    client.execute("DROP TABLE \"it_output\"").await.unwrap();
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_table_is_reported() {
    let Some((client, schema)) = get_test_client().await else {
        eprintln!("Skipping test: SNOWFLAKE_HOST not set");
        return;
    };

    let err = TableIntrospector::new(&client, schema)
        .introspect(&[ExpectedOutputTable::new("it_does_not_exist", "")], false)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("\"it_does_not_exist\""));

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_abort_signal() {
    let Some((client, _)) = get_test_client().await else {
        eprintln!("Skipping test: SNOWFLAKE_HOST not set");
        return;
    };

    client
        .execute("SET ABORT_TRANSFORMATION = 'stop now'")
        .await
        .unwrap();
    let message = AbortSignal::new(&client).check().await.unwrap();
    assert_eq!(message.as_deref(), Some("stop now"));

    client.close().await.unwrap();
}
