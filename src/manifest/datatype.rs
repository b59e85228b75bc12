//! Snowflake datatype classification.
//!
//! Maps the type string `DESC TABLE` reports for a column to the datatype
//! metadata the platform stores. Types we know get a normalized base type;
//! anything else, including known types with a length Snowflake would not
//! accept, is kept as a generic datatype.

use super::builder::MetadataEntry;
use super::ColumnDescriptor;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

const MAX_CHARACTER_LENGTH: u64 = 16_777_216;
const MAX_BINARY_LENGTH: u64 = 8_388_608;
const MAX_NUMBER_PRECISION: u32 = 38;
const MAX_FRACTIONAL_PRECISION: u64 = 9;

/// Platform base type of a recognized column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Integer,
    Numeric,
    Float,
    String,
    Boolean,
    Date,
    Timestamp,
}

impl BaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Numeric => "NUMERIC",
            Self::Float => "FLOAT",
            Self::String => "STRING",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column type Snowflake defines, with a valid length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnowflakeDatatype {
    pub type_name: String,
    pub base_type: BaseType,
    pub nullable: bool,
    pub length: Option<String>,
    pub default: Option<String>,
}

/// Any other column type; no base type is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericDatatype {
    pub type_name: String,
    pub nullable: bool,
    pub length: Option<String>,
    pub default: Option<String>,
}

/// Classification result for one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datatype {
    Recognized(SnowflakeDatatype),
    Generic(GenericDatatype),
}

/// Length a type accepts.
#[derive(Debug, Clone, Copy)]
enum LengthRule {
    /// The type takes no length.
    Forbidden,
    /// `precision` or `precision,scale`.
    Number,
    /// A single integer from 1 up to the limit.
    Size(u64),
    /// Fractional seconds precision, 0 to 9.
    Fraction,
}

impl LengthRule {
    fn accepts(self, length: &str) -> bool {
        match self {
            Self::Forbidden => false,
            Self::Number => valid_number_length(length),
            Self::Size(max) => length.parse::<u64>().is_ok_and(|n| (1..=max).contains(&n)),
            Self::Fraction => length
                .parse::<u64>()
                .is_ok_and(|n| n <= MAX_FRACTIONAL_PRECISION),
        }
    }
}

fn valid_number_length(length: &str) -> bool {
    let mut parts = length.split(',');
    let precision = parts.next().and_then(|p| p.trim().parse::<u32>().ok());
    let scale = match parts.next() {
        Some(s) => s.trim().parse::<u32>().ok(),
        None => Some(0),
    };
    if parts.next().is_some() {
        return false;
    }

    matches!(
        (precision, scale),
        (Some(p), Some(s)) if (1..=MAX_NUMBER_PRECISION).contains(&p) && s <= p
    )
}

fn rule_for(type_name: &str) -> Option<(BaseType, LengthRule)> {
    let rule = match type_name {
        "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "BYTEINT" => {
            (BaseType::Integer, LengthRule::Forbidden)
        }
        "NUMBER" | "DECIMAL" | "DEC" | "NUMERIC" => (BaseType::Numeric, LengthRule::Number),
        "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION" | "REAL" => {
            (BaseType::Float, LengthRule::Forbidden)
        }
        "VARCHAR" | "CHAR" | "CHARACTER" | "STRING" | "TEXT" => {
            (BaseType::String, LengthRule::Size(MAX_CHARACTER_LENGTH))
        }
        "BINARY" | "VARBINARY" => (BaseType::String, LengthRule::Size(MAX_BINARY_LENGTH)),
        "VARIANT" | "OBJECT" | "ARRAY" | "GEOGRAPHY" | "GEOMETRY" => {
            (BaseType::String, LengthRule::Forbidden)
        }
        "TIME" => (BaseType::String, LengthRule::Fraction),
        "BOOLEAN" => (BaseType::Boolean, LengthRule::Forbidden),
        "DATE" => (BaseType::Date, LengthRule::Forbidden),
        "DATETIME" | "TIMESTAMP" | "TIMESTAMP_NTZ" | "TIMESTAMP_LTZ" | "TIMESTAMP_TZ" => {
            (BaseType::Timestamp, LengthRule::Fraction)
        }
        _ => return None,
    };
    Some(rule)
}

fn type_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r"(?s)^\s*([^(]+?)\s*(?:\((.*)\))?\s*$").expect("type pattern is valid")
    })
}

/// Splits a reported type such as `NUMBER(38,0)` into `("NUMBER", Some("38,0"))`.
pub fn split_type(reported: &str) -> (String, Option<String>) {
    match type_pattern().captures(reported) {
        Some(caps) => {
            let type_name = caps[1].to_uppercase();
            let length = caps
                .get(2)
                .map(|m| m.as_str().chars().filter(|c| !c.is_whitespace()).collect::<String>())
                .filter(|l| !l.is_empty());
            (type_name, length)
        }
        None => (reported.trim().to_uppercase(), None),
    }
}

/// Classifies an introspected column.
pub fn classify(column: &ColumnDescriptor) -> Datatype {
    let type_name = column.warehouse_type.trim().to_uppercase();
    let length = column.length.clone().filter(|l| !l.is_empty());

    let recognized = rule_for(&type_name).filter(|(_, rule)| {
        length.as_deref().map_or(true, |l| rule.accepts(l))
    });

    match recognized {
        Some((base_type, _)) => Datatype::Recognized(SnowflakeDatatype {
            type_name,
            base_type,
            nullable: column.nullable,
            length,
            default: column.default.clone(),
        }),
        None => Datatype::Generic(GenericDatatype {
            type_name,
            nullable: column.nullable,
            length,
            default: column.default.clone(),
        }),
    }
}

impl Datatype {
    pub fn type_name(&self) -> &str {
        match self {
            Self::Recognized(d) => &d.type_name,
            Self::Generic(d) => &d.type_name,
        }
    }

    pub fn base_type(&self) -> Option<BaseType> {
        match self {
            Self::Recognized(d) => Some(d.base_type),
            Self::Generic(_) => None,
        }
    }

    pub fn nullable(&self) -> bool {
        match self {
            Self::Recognized(d) => d.nullable,
            Self::Generic(d) => d.nullable,
        }
    }

    pub fn length(&self) -> Option<&str> {
        match self {
            Self::Recognized(d) => d.length.as_deref(),
            Self::Generic(d) => d.length.as_deref(),
        }
    }

    pub fn default(&self) -> Option<&str> {
        match self {
            Self::Recognized(d) => d.default.as_deref(),
            Self::Generic(d) => d.default.as_deref(),
        }
    }

    /// Column metadata entries, in the order the platform lists them.
    pub fn to_metadata(&self) -> Vec<MetadataEntry> {
        let mut entries = vec![
            MetadataEntry::new("KBC.datatype.type", self.type_name()),
            MetadataEntry::new("KBC.datatype.nullable", self.nullable()),
        ];
        if let Some(base_type) = self.base_type() {
            entries.push(MetadataEntry::new("KBC.datatype.basetype", base_type.as_str()));
        }
        if let Some(length) = self.length() {
            entries.push(MetadataEntry::new("KBC.datatype.length", length));
        }
        if let Some(default) = self.default() {
            entries.push(MetadataEntry::new("KBC.datatype.default", default));
        }
        entries
    }
}
