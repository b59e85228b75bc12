//! Manifest data for one output table.
//!
//! The manifest uses the key/value metadata layout: table metadata and each
//! column's metadata are lists of `{"key", "value"}` pairs.

use super::TableDescriptor;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// Marks the backend the table lives in.
pub const BACKEND: &str = "snowflake";

/// A single metadata pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: serde_json::Value,
}

impl MetadataEntry {
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Manifest of one output table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableManifest {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub destination: String,

    /// Column names in table order.
    pub columns: Vec<String>,

    pub metadata: Vec<MetadataEntry>,

    /// Metadata per column, in table order.
    #[serde(serialize_with = "serialize_in_order")]
    pub column_metadata: Vec<(String, Vec<MetadataEntry>)>,
}

impl TableManifest {
    /// Metadata of a column by name.
    pub fn column(&self, name: &str) -> Option<&[MetadataEntry]> {
        self.column_metadata
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, entries)| entries.as_slice())
    }
}

/// Writes the pairs as a JSON object, keeping column order.
fn serialize_in_order<S>(
    columns: &[(String, Vec<MetadataEntry>)],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(columns.len()))?;
    for (name, entries) in columns {
        map.serialize_entry(name, entries)?;
    }
    map.end()
}

/// Builds the manifest of a described table.
pub fn build(table: &TableDescriptor, destination: &str) -> TableManifest {
    let column_metadata = table
        .columns
        .iter()
        .map(|column| (column.name.clone(), column.datatype().to_metadata()))
        .collect();

    TableManifest {
        destination: destination.to_string(),
        columns: table.column_names(),
        metadata: vec![
            MetadataEntry::new("KBC.name", table.name.as_str()),
            MetadataEntry::new("KBC.datatype.backend", BACKEND),
        ],
        column_metadata,
    }
}
