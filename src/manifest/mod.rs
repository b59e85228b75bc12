//! Output table introspection and manifest generation.
//!
//! After the blocks ran, every expected output table is described from the
//! live warehouse and turned into a manifest the platform reads when it
//! unloads the table.

mod builder;
mod datatype;
mod introspect;
mod writer;

pub use builder::{build, MetadataEntry, TableManifest, BACKEND};
pub use datatype::{
    classify, split_type, BaseType, Datatype, GenericDatatype, SnowflakeDatatype,
};
pub use introspect::TableIntrospector;
pub use writer::{FileManifestWriter, ManifestWriter};

use serde::{Deserialize, Serialize};

/// An output table the transformation must create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedOutputTable {
    /// Table name in the workspace schema.
    pub source: String,

    /// Platform table id, e.g. `out.c-main.result`.
    #[serde(default)]
    pub destination: String,

    /// Describe the table even when the transformation failed.
    #[serde(default)]
    pub write_always: bool,
}

impl ExpectedOutputTable {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            write_always: false,
        }
    }

    pub fn write_always(mut self) -> Self {
        self.write_always = true;
        self
    }
}

/// One column as the warehouse reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Type name without its length, e.g. `NUMBER`.
    pub warehouse_type: String,
    /// `precision,scale` for numbers, a single integer for character types.
    pub length: Option<String>,
    pub nullable: bool,
    pub default: Option<String>,
    /// 1-based position in the table.
    pub ordinal_position: Option<u32>,
}

impl ColumnDescriptor {
    pub fn datatype(&self) -> Datatype {
        classify(self)
    }
}

/// A described table; built fresh for every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}
