//! Field type vocabulary used by collection schemas.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The BSON-level type a schema field is declared with.
///
/// Type names are matched case-insensitively, so `objectId`, `objectid` and
/// `ObjectId` all resolve to [`FieldType::ObjectId`]. Anything unrecognised is
/// kept as [`FieldType::Unknown`]; such fields generate `null` values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    #[default]
    String,
    Int,
    Double,
    Bool,
    Date,
    ObjectId,
    Array,
    Object,
    Timestamp,
    Long,
    Decimal,
    Unknown(String),
}

impl FieldType {
    /// Numeric types get range predicates and `$inc` updates.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Int | FieldType::Long | FieldType::Double | FieldType::Decimal
        )
    }

    /// Canonical name as written in schema files.
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Double => "double",
            FieldType::Bool => "bool",
            FieldType::Date => "date",
            FieldType::ObjectId => "objectId",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Timestamp => "timestamp",
            FieldType::Long => "long",
            FieldType::Decimal => "decimal",
            FieldType::Unknown(name) => name.as_str(),
        }
    }
}

impl From<&str> for FieldType {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => FieldType::String,
            "int" | "int32" => FieldType::Int,
            "double" => FieldType::Double,
            "bool" | "boolean" => FieldType::Bool,
            "date" => FieldType::Date,
            "objectid" => FieldType::ObjectId,
            "array" => FieldType::Array,
            "object" => FieldType::Object,
            "timestamp" => FieldType::Timestamp,
            "long" | "int64" => FieldType::Long,
            "decimal" | "decimal128" => FieldType::Decimal,
            _ => FieldType::Unknown(s.to_string()),
        }
    }
}

impl From<String> for FieldType {
    fn from(s: String) -> Self {
        FieldType::from(s.as_str())
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
