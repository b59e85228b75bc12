//! Introspection and manifest integration tests.
//!
//! Tables are created through the executor, then described and turned into
//! manifest files like at the end of a run.

use pretty_assertions::assert_eq;
use serde_json::json;
use snowflake_transformation::db::MockWarehouse;
use snowflake_transformation::manifest::{
    build, BaseType, ExpectedOutputTable, FileManifestWriter, ManifestWriter, TableIntrospector,
};
use snowflake_transformation::transformation::{Block, BlockExecutor, Code};
use tempfile::TempDir;

async fn run_script(warehouse: &MockWarehouse, script: &[&str]) {
    let mut executor = BlockExecutor::new(warehouse);
    executor
        .run(&[Block::new("setup", vec![Code::new("create", script.iter().copied())])])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_created_table_round_trip() {
    let warehouse = MockWarehouse::new();
    run_script(&warehouse, &["CREATE TABLE \"t1\" (id INT, name VARCHAR(200))"]).await;

    let tables = TableIntrospector::new(&warehouse, "WORKSPACE")
        .introspect(&[ExpectedOutputTable::new("t1", "out.c-main.t1")], false)
        .await
        .unwrap();

    let columns = &tables[0].columns;
    assert_eq!(columns.len(), 2);
    assert_eq!(
        columns
            .iter()
            .map(|c| (c.name.as_str(), c.datatype().base_type(), c.ordinal_position))
            .collect::<Vec<_>>(),
        vec![
            ("ID", Some(BaseType::Numeric), Some(1)),
            ("NAME", Some(BaseType::String), Some(2)),
        ]
    );
}

#[tokio::test]
async fn test_missing_table_fails_and_names_it() {
    let warehouse = MockWarehouse::new();

    let err = TableIntrospector::new(&warehouse, "WORKSPACE")
        .introspect(&[ExpectedOutputTable::new("t1", "d1")], false)
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Tables \"t1\" specified in output were not created by the transformation."
    );
    assert_eq!(err.kind().exit_code(), 1);
}

#[tokio::test]
async fn test_failed_run_skips_regular_tables_entirely() {
    let warehouse = MockWarehouse::new();
    run_script(
        &warehouse,
        &["CREATE TABLE \"a\" (\"x\" INT)", "CREATE TABLE \"b\" (\"x\" INT)"],
    )
    .await;
    let before = warehouse.statements().len();

    let tables = TableIntrospector::new(&warehouse, "WORKSPACE")
        .introspect(
            &[
                ExpectedOutputTable::new("a", "").write_always(),
                ExpectedOutputTable::new("b", ""),
            ],
            true,
        )
        .await
        .unwrap();

    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "a");
    assert_eq!(
        warehouse.statements()[before..].to_vec(),
        vec!["DESC TABLE \"WORKSPACE\".\"a\"".to_string()]
    );
}

#[tokio::test]
async fn test_manifest_file_contents() {
    let warehouse = MockWarehouse::new();
    run_script(
        &warehouse,
        &[r#"CREATE TABLE "output" ("id" INT AUTOINCREMENT NOT NULL, "price" NUMBER(10,2) DEFAULT 0, "doc" VARIANT)"#],
    )
    .await;

    let tables = TableIntrospector::new(&warehouse, "WORKSPACE")
        .introspect(&[ExpectedOutputTable::new("output", "out.c-main.output")], false)
        .await
        .unwrap();

    let dir = TempDir::new().unwrap();
    let writer = FileManifestWriter::for_data_dir(dir.path());
    writer
        .write(&tables[0].name, &build(&tables[0], "out.c-main.output"))
        .unwrap();

    let content = std::fs::read_to_string(dir.path().join("out/tables/output.manifest")).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&content).unwrap();

    assert_eq!(
        manifest,
        json!({
            "destination": "out.c-main.output",
            "columns": ["id", "price", "doc"],
            "metadata": [
                {"key": "KBC.name", "value": "output"},
                {"key": "KBC.datatype.backend", "value": "snowflake"}
            ],
            "column_metadata": {
                "id": [
                    {"key": "KBC.datatype.type", "value": "NUMBER"},
                    {"key": "KBC.datatype.nullable", "value": false},
                    {"key": "KBC.datatype.basetype", "value": "NUMERIC"},
                    {"key": "KBC.datatype.length", "value": "38,0"},
                    {"key": "KBC.datatype.default", "value": "IDENTITY START 1 INCREMENT 1"}
                ],
                "price": [
                    {"key": "KBC.datatype.type", "value": "NUMBER"},
                    {"key": "KBC.datatype.nullable", "value": true},
                    {"key": "KBC.datatype.basetype", "value": "NUMERIC"},
                    {"key": "KBC.datatype.length", "value": "10,2"},
                    {"key": "KBC.datatype.default", "value": "0"}
                ],
                "doc": [
                    {"key": "KBC.datatype.type", "value": "VARIANT"},
                    {"key": "KBC.datatype.nullable", "value": true},
                    {"key": "KBC.datatype.basetype", "value": "STRING"}
                ]
            }
        })
    );
}
