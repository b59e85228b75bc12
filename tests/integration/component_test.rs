//! Whole-run integration tests.
//!
//! Builds a data directory with a config.json, runs the component against
//! the mock warehouse and inspects the manifests it leaves behind.

use pretty_assertions::assert_eq;
use serde_json::json;
use snowflake_transformation::component::Component;
use snowflake_transformation::config::Config;
use snowflake_transformation::db::MockWarehouse;
use snowflake_transformation::manifest::FileManifestWriter;
use snowflake_transformation::transformation::RunEnvironment;
use std::path::Path;
use tempfile::TempDir;

fn workspace() -> serde_json::Value {
    json!({
        "workspace": {
            "host": "acct.eu-central-1.snowflakecomputing.com",
            "port": 443,
            "warehouse": "WH",
            "database": "KEBOOLA_1",
            "schema": "WORKSPACE_1",
            "user": "user",
            "password": "secret"
        }
    })
}

fn write_config(dir: &Path, config: &serde_json::Value) -> Config {
    let path = Config::path_in(dir);
    std::fs::write(&path, serde_json::to_string_pretty(config).unwrap()).unwrap();
    Config::load_from_file(&path).unwrap()
}

fn read_manifest(dir: &Path, name: &str) -> serde_json::Value {
    let path = dir.join("out").join("tables").join(format!("{name}.manifest"));
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_full_run_writes_manifests() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        &json!({
            "authorization": workspace(),
            "parameters": {
                "blocks": [{
                    "name": "first block",
                    "codes": [{
                        "name": "first code",
                        "script": [
                            "-- create output\nCREATE TABLE \"output\" (\"name\" VARCHAR(200), \"city\" VARCHAR(200));",
                            "INSERT INTO \"output\" VALUES ('ondra', 'liberec'), ('odin', 'brno');",
                            "SELECT * FROM \"output\";"
                        ]
                    }]
                }]
            },
            "storage": {"output": {"tables": [
                {"source": "output", "destination": "out.c-main.output"}
            ]}}
        }),
    );

    let component = Component::new(
        config,
        RunEnvironment {
            run_id: Some("1001".to_string()),
            project_id: Some("7".to_string()),
            ..Default::default()
        },
    );
    let warehouse = MockWarehouse::new();
    let writer = FileManifestWriter::for_data_dir(dir.path());

    component.run_with_warehouse(&warehouse, &writer).await.unwrap();

    assert_eq!(
        warehouse.user_statements(),
        vec![
            r#"ALTER SESSION SET QUERY_TAG='{"runId":"1001"}',STATEMENT_TIMEOUT_IN_SECONDS=7200;"#,
            "SET (KBC_RUNID, KBC_PROJECTID) = ('1001', '7');",
            "CREATE TABLE \"output\" (\"name\" VARCHAR(200), \"city\" VARCHAR(200));",
            "INSERT INTO \"output\" VALUES ('ondra', 'liberec'), ('odin', 'brno');",
            "DESC TABLE \"WORKSPACE_1\".\"output\"",
        ]
    );

    let manifest = read_manifest(dir.path(), "output");
    assert_eq!(manifest["destination"], "out.c-main.output");
    assert_eq!(manifest["columns"], json!(["name", "city"]));
    assert_eq!(
        manifest["column_metadata"]["city"][2],
        json!({"key": "KBC.datatype.basetype", "value": "STRING"})
    );
    assert!(warehouse.is_closed());
}

#[tokio::test]
async fn test_legacy_steps_config_runs() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        &json!({
            "authorization": workspace(),
            "parameters": {
                "query_timeout": 0,
                "steps": [{
                    "name": "step",
                    "execution": "parallel",
                    "blocks": [
                        {"name": "one", "script": ["CREATE TABLE \"a\" (\"x\" INT)"]},
                        {"name": "two", "script": ["CREATE TABLE \"b\" (\"x\" INT)"]}
                    ]
                }]
            }
        }),
    );

    let component = Component::new(config, RunEnvironment::default());
    let warehouse = MockWarehouse::new();
    let writer = FileManifestWriter::for_data_dir(dir.path());

    component.run_with_warehouse(&warehouse, &writer).await.unwrap();

    assert_eq!(
        warehouse.user_statements(),
        vec![
            r#"ALTER SESSION SET QUERY_TAG='{"runId":""}';"#,
            "CREATE TABLE \"a\" (\"x\" INT)",
            "CREATE TABLE \"b\" (\"x\" INT)",
        ]
    );
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn test_failed_run_keeps_write_always_manifest() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        &json!({
            "authorization": workspace(),
            "parameters": {
                "blocks": [{
                    "name": "block",
                    "codes": [{
                        "name": "failing code",
                        "script": [
                            "CREATE TABLE \"log\" (\"message\" VARCHAR(1000))",
                            "CREATE TABLE \"result\" (\"id\" INT)",
                            "SET ABORT_TRANSFORMATION = 'input is empty'"
                        ]
                    }]
                }]
            },
            "storage": {"output": {"tables": [
                {"source": "log", "destination": "out.c-main.log", "write_always": true},
                {"source": "result", "destination": "out.c-main.result"}
            ]}}
        }),
    );

    let component = Component::new(config, RunEnvironment::default());
    let warehouse = MockWarehouse::new();
    let writer = FileManifestWriter::for_data_dir(dir.path());

    let err = component
        .run_with_warehouse(&warehouse, &writer)
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Transformation aborted with message \"input is empty\""
    );
    assert_eq!(err.kind().exit_code(), 1);
    assert_eq!(read_manifest(dir.path(), "log")["destination"], "out.c-main.log");
    assert!(!dir.path().join("out/tables/result.manifest").exists());
}

#[tokio::test]
async fn test_missing_authorization() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &json!({"parameters": {"blocks": []}}));

    let component = Component::new(config, RunEnvironment::default());
    let warehouse = MockWarehouse::new();
    let writer = FileManifestWriter::for_data_dir(dir.path());

    let err = component
        .run_with_warehouse(&warehouse, &writer)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Missing authorization for workspace");
    assert_eq!(err.kind().exit_code(), 2);
    assert!(warehouse.statements().is_empty());
}

#[test]
fn test_missing_config_file_is_an_application_error() {
    let dir = TempDir::new().unwrap();
    let err = Config::load_from_file(&Config::path_in(dir.path())).unwrap_err();
    assert_eq!(err.kind().exit_code(), 2);
}
