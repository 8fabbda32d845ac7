//! Collection schema definitions.
//!
//! A schema file describes one or more collections: which database they live
//! in, the fields a generated document carries, an optional shard key and the
//! secondary indexes to create. Files are JSON or YAML; a file may hold a
//! single definition or a list of them, and a directory loads every schema
//! file inside it.
//!
//! ## Field names
//!
//! Both the snake_case names used in this crate and the camelCase names used
//! by existing workload definition files are accepted:
//!
//! | canonical      | alias            |
//! |----------------|------------------|
//! | `database`     | `databaseName`   |
//! | `collection`   | `collectionName` |
//! | `fields`       | `fieldName`      |
//! | `shard_config` | `shardConfig`    |
//! | `generator`    | `provider`       |

use crate::ordered::OrderedMap;
use crate::types::FieldType;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::warn;

/// Field name MongoDB assigns when a document carries no explicit key.
pub const DEFAULT_PRIMARY_KEY: &str = "_id";

// ============================================================================
// Error Types
// ============================================================================

/// Error type for schema operations.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Error reading schema file
    #[error("Failed to read schema file: {0}")]
    IoError(#[from] std::io::Error),

    /// Error parsing YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Error parsing JSON
    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Definition is structurally valid but unusable
    #[error("Invalid collection definition in '{source_name}': {reason}")]
    InvalidDefinition { source_name: String, reason: String },

    /// Path is neither a schema file nor a directory holding some
    #[error("No collection definitions found at {0}")]
    NoDefinitions(PathBuf),

    /// Date bound in a field definition could not be parsed
    #[error("Invalid date bound '{value}' on field '{field}'")]
    InvalidDate { field: String, value: String },
}

// ============================================================================
// Field Definitions
// ============================================================================

/// Definition of a single document field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    /// Declared BSON type
    #[serde(rename = "type", alias = "bsonType", default)]
    pub field_type: FieldType,

    /// Named generator overriding the type-based default
    #[serde(alias = "provider", default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,

    /// Explicit primary key marker
    #[serde(alias = "isPrimaryKey", default)]
    pub is_primary_key: bool,

    /// Unique marker; also makes the field a primary key candidate
    #[serde(default)]
    pub unique: bool,

    /// Lower date bound (`date` fields only)
    #[serde(alias = "startDate", default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,

    /// Upper date bound (`date` fields only)
    #[serde(alias = "endDate", default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            ..Default::default()
        }
    }

    pub fn with_generator(mut self, name: impl Into<String>) -> Self {
        self.generator = Some(name.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_date_range(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_date = Some(start.into());
        self.end_date = Some(end.into());
        self
    }

    /// Resolve the configured date bounds relative to `now`.
    ///
    /// Returns `Ok(None)` unless both bounds are present. Bounds are absolute
    /// (`2024-01-31`, RFC 3339), `now`/`today`, or signed offsets such as
    /// `-30d`, `+2w`, `-1y`, `-12h`, `-30m`, `-45s`.
    pub fn date_range(
        &self,
        field: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, SchemaError> {
        let (Some(start), Some(end)) = (&self.start_date, &self.end_date) else {
            return Ok(None);
        };
        let start = parse_date_bound(start, now).ok_or_else(|| SchemaError::InvalidDate {
            field: field.to_string(),
            value: start.clone(),
        })?;
        let end = parse_date_bound(end, now).ok_or_else(|| SchemaError::InvalidDate {
            field: field.to_string(),
            value: end.clone(),
        })?;
        if start <= end {
            Ok(Some((start, end)))
        } else {
            Ok(Some((end, start)))
        }
    }
}

/// Parse one date bound. See [`FieldSpec::date_range`] for accepted forms.
pub fn parse_date_bound(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    match s {
        "now" => return Some(now),
        "today" => return now.date_naive().and_hms_opt(0, 0, 0).map(|d| Utc.from_utc_datetime(&d)),
        _ => {}
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|d| Utc.from_utc_datetime(&d));
    }

    let (sign, rest) = match s.chars().next()? {
        '-' => (-1, &s[1..]),
        '+' => (1, &s[1..]),
        _ => return None,
    };
    let unit = rest.chars().last()?;
    let amount: i64 = rest[..rest.len() - unit.len_utf8()].parse().ok()?;
    let offset = match unit {
        'y' => Duration::days(amount * 365),
        'w' => Duration::weeks(amount),
        'd' => Duration::days(amount),
        'h' => Duration::hours(amount),
        'm' => Duration::minutes(amount),
        's' => Duration::seconds(amount),
        _ => return None,
    };
    Some(now + offset * sign)
}

// ============================================================================
// Collection Definitions
// ============================================================================

/// Shard key configuration.
///
/// Key values are sort directions (`1`, `-1`) or `"hashed"`, kept as raw JSON
/// so they can be handed to the server unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ShardConfig {
    pub key: OrderedMap<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
}

/// Secondary index definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexSpec {
    pub keys: OrderedMap<serde_json::Value>,

    /// Index options in server form (`unique`, `name`, `sparse`, ...)
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// Definition of one collection: identity, fields, sharding and indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSchema {
    #[serde(alias = "databaseName")]
    pub database: String,

    #[serde(alias = "collectionName")]
    pub collection: String,

    #[serde(alias = "fieldName", default)]
    pub fields: OrderedMap<FieldSpec>,

    #[serde(alias = "shardConfig", default, skip_serializing_if = "Option::is_none")]
    pub shard_config: Option<ShardConfig>,

    #[serde(default)]
    pub indexes: Vec<IndexSpec>,

    #[serde(skip)]
    primary_key: OnceLock<String>,
}

impl CollectionSchema {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            fields: OrderedMap::new(),
            shard_config: None,
            indexes: Vec::new(),
            primary_key: OnceLock::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name, spec);
        self.primary_key = OnceLock::new();
        self
    }

    pub fn with_shard_key(mut self, field: impl Into<String>, direction: serde_json::Value) -> Self {
        self.shard_config
            .get_or_insert_with(ShardConfig::default)
            .key
            .insert(field, direction);
        self.primary_key = OnceLock::new();
        self
    }

    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// `database.collection`
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.collection)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Shard key fields in configured order; empty when unsharded.
    pub fn shard_key_fields(&self) -> Vec<String> {
        self.shard_config
            .as_ref()
            .map(|c| c.key.keys().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn is_sharded(&self) -> bool {
        self.shard_config.as_ref().is_some_and(|c| !c.key.is_empty())
    }

    /// The field that identifies a document for targeted operations.
    ///
    /// Resolution order: the first shard key field that is also a declared
    /// field; otherwise the first field marked `is_primary_key` or `unique`;
    /// otherwise `_id`. Resolved once and cached.
    pub fn primary_key(&self) -> &str {
        self.primary_key.get_or_init(|| self.resolve_primary_key())
    }

    /// Declared type of the primary key. `_id` is an ObjectId.
    pub fn primary_key_type(&self) -> FieldType {
        let pk = self.primary_key();
        if pk == DEFAULT_PRIMARY_KEY {
            return self
                .fields
                .get(pk)
                .map(|f| f.field_type.clone())
                .unwrap_or(FieldType::ObjectId);
        }
        self.fields
            .get(pk)
            .map(|f| f.field_type.clone())
            .unwrap_or_default()
    }

    fn resolve_primary_key(&self) -> String {
        if let Some(shard) = &self.shard_config {
            for key_field in shard.key.keys() {
                if self.fields.contains_key(key_field) {
                    return key_field.to_string();
                }
                warn!(
                    "Shard key '{}' of {} not found in fields",
                    key_field,
                    self.namespace()
                );
            }
        }

        self.fields
            .iter()
            .find(|(_, spec)| spec.is_primary_key || spec.unique)
            .map(|(name, _)| name.to_string())
            .unwrap_or_else(|| DEFAULT_PRIMARY_KEY.to_string())
    }

    /// Check identity fields and date bounds.
    pub fn validate(&self, source_name: &str) -> Result<(), SchemaError> {
        if self.database.trim().is_empty() || self.collection.trim().is_empty() {
            return Err(SchemaError::InvalidDefinition {
                source_name: source_name.to_string(),
                reason: "missing database or collection name".to_string(),
            });
        }
        let now = Utc::now();
        for (name, spec) in self.fields.iter() {
            spec.date_range(name, now)?;
        }
        Ok(())
    }
}

// ============================================================================
// Schema Set
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Box<CollectionSchema>),
    Many(Vec<CollectionSchema>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<CollectionSchema> {
        match self {
            OneOrMany::One(s) => vec![*s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// All collection definitions of a run.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    collections: Vec<CollectionSchema>,
}

impl SchemaSet {
    /// Build from definitions, validating each.
    pub fn new(collections: Vec<CollectionSchema>) -> Result<Self, SchemaError> {
        for schema in &collections {
            schema.validate("<inline>")?;
        }
        Ok(Self { collections })
    }

    /// Load from a schema file or a directory of schema files.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let files = if path.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_schema_file(p))
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        let mut collections = Vec::new();
        for file in &files {
            let content = fs::read_to_string(file)?;
            let loaded = if is_yaml(file) {
                serde_yaml::from_str::<OneOrMany>(&content)?.into_vec()
            } else {
                serde_json::from_str::<OneOrMany>(&content)?.into_vec()
            };
            let source_name = file.display().to_string();
            for schema in &loaded {
                schema.validate(&source_name)?;
            }
            tracing::info!(
                "Loaded {} collection definition(s) from {}",
                loaded.len(),
                source_name
            );
            collections.extend(loaded);
        }

        if collections.is_empty() {
            return Err(SchemaError::NoDefinitions(path.to_path_buf()));
        }
        Ok(Self { collections })
    }

    /// Parse JSON holding one definition or a list of them.
    pub fn from_json(content: &str) -> Result<Self, SchemaError> {
        let parsed: OneOrMany = serde_json::from_str(content)?;
        Self::new(parsed.into_vec())
    }

    /// Parse YAML holding one definition or a list of them.
    pub fn from_yaml(content: &str) -> Result<Self, SchemaError> {
        let parsed: OneOrMany = serde_yaml::from_str(content)?;
        Self::new(parsed.into_vec())
    }

    pub fn find(&self, database: &str, collection: &str) -> Option<&CollectionSchema> {
        self.collections
            .iter()
            .find(|s| s.database == database && s.collection == collection)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectionSchema> {
        self.collections.iter()
    }

    pub fn collections(&self) -> &[CollectionSchema] {
        &self.collections
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Whether any collection declares a shard key.
    pub fn any_sharded(&self) -> bool {
        self.collections.iter().any(CollectionSchema::is_sharded)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn is_schema_file(path: &Path) -> bool {
    is_yaml(path) || path.extension().and_then(|e| e.to_str()) == Some("json")
}
