//! Output table introspection.

use super::datatype::split_type;
use super::{ColumnDescriptor, ExpectedOutputTable, TableDescriptor};
use crate::db::{quote_identifier, QueryResult, Warehouse};
use crate::error::{Result, TransformationError};
use tracing::{debug, info};

/// Describes output tables in the workspace schema.
pub struct TableIntrospector<'a> {
    warehouse: &'a dyn Warehouse,
    schema: String,
}

impl<'a> TableIntrospector<'a> {
    pub fn new(warehouse: &'a dyn Warehouse, schema: impl Into<String>) -> Self {
        Self {
            warehouse,
            schema: schema.into(),
        }
    }

    /// Describes the expected tables, only the write-always ones after a
    /// failed run.
    ///
    /// Every table is tried before giving up, so the error lists all missing
    /// tables at once.
    pub async fn introspect(
        &self,
        expected: &[ExpectedOutputTable],
        transformation_failed: bool,
    ) -> Result<Vec<TableDescriptor>> {
        let tables: Vec<&ExpectedOutputTable> = expected
            .iter()
            .filter(|table| !transformation_failed || table.write_always)
            .collect();

        if tables.is_empty() {
            debug!("No output tables to describe");
            return Ok(Vec::new());
        }

        let mut described = Vec::with_capacity(tables.len());
        let mut missing = Vec::new();

        for table in tables {
            match self.describe(&table.source).await {
                Ok(descriptor) => described.push(descriptor),
                Err(TransformationError::NotFound(message)) => {
                    debug!("Output table \"{}\" is missing: {}", table.source, message);
                    missing.push(table.source.clone());
                }
                Err(e) => return Err(e),
            }
        }

        if !missing.is_empty() {
            return Err(TransformationError::MissingTables(missing));
        }
        Ok(described)
    }

    /// Describes one table of the schema.
    pub async fn describe(&self, table: &str) -> Result<TableDescriptor> {
        info!("Describing output table \"{}\"", table);
        let sql = format!(
            "DESC TABLE {}.{}",
            quote_identifier(&self.schema),
            quote_identifier(table)
        );
        let result = self.warehouse.execute(&sql).await?;

        Ok(TableDescriptor {
            schema: self.schema.clone(),
            name: table.to_string(),
            columns: columns_of(&result)?,
        })
    }
}

fn columns_of(result: &QueryResult) -> Result<Vec<ColumnDescriptor>> {
    let mut columns = Vec::new();

    for row in 0..result.row_count() {
        // Virtual columns and the like are reported with a different kind.
        let kind = result.text(row, "kind");
        if kind.is_some_and(|k| !k.eq_ignore_ascii_case("COLUMN")) {
            continue;
        }

        let name = result.text(row, "name").ok_or_else(|| {
            TransformationError::internal("DESC TABLE returned a column without a name")
        })?;
        let reported = result.text(row, "type").unwrap_or_default();
        let (warehouse_type, length) = split_type(&reported);

        columns.push(ColumnDescriptor {
            name,
            warehouse_type,
            length,
            nullable: result
                .text(row, "null?")
                .map_or(true, |n| n.eq_ignore_ascii_case("Y")),
            default: result.text(row, "default"),
            ordinal_position: Some(columns.len() as u32 + 1),
        });
    }

    Ok(columns)
}
