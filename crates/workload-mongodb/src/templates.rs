//! Query template engine.
//!
//! For every collection the engine derives, per operation and query mode, a
//! list of filter / update / projection skeletons. Skeletons are built once,
//! cached, and filled with fresh random values on every call.
//!
//! ## Shapes
//!
//! **Select**, optimized: `{pk: PK}`, then for every non-key field a predicate
//! anchored on the key:
//!
//! | field type                        | predicates                                  |
//! |-----------------------------------|---------------------------------------------|
//! | int, long, double, decimal        | `V`, `{$gt: V}`, `{$lt: V}`, `{$gte: V, $lte: HIGH}` |
//! | string                            | `V`, `{$regex: V}`                          |
//! | bool, date, timestamp, objectId   | `V`                                         |
//! | array                             | `{$in: V}`                                  |
//! | anything else                     | `V`                                         |
//!
//! Select, ineffective: `{pk: {$exists: true}}`, then the same predicates
//! without the key anchor. Every select template carries a projection
//! limited to the key and the predicate field.
//!
//! **Delete** follows select with a shorter numeric list (`V`, `{$gt: V}`);
//! its ineffective list starts with the empty filter.
//!
//! **Update** never touches the key or any shard key field. Update documents
//! per field: numeric `$set`/`$inc`, bool `$set` value/negation, array
//! `$set`/`$push $each`, others `$set`. The optimized filter is `{pk: PK}`;
//! ineffective filters are single-field equalities on another non-key field,
//! or `{}` when the collection has none.

use crate::operation::{OperationKind, QueryMode};
use bson::{doc, Bson, Document};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use workload_core::{CollectionSchema, FieldSpec, FieldType, DEFAULT_PRIMARY_KEY};
use workload_generator::{decimal_to_f64, decimal_value, DocumentGenerator};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// A placeholder had no value in the value map
    #[error("No value bound for placeholder {0}")]
    UnboundPlaceholder(Placeholder),

    /// A filter or update skeleton did not fill to a document
    #[error("Template did not produce a document")]
    NotADocument,
}

// ============================================================================
// Skeletons
// ============================================================================

/// A typed hole in a template, resolved at fill time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// The sampled primary key value.
    PrimaryKey,
    /// A random value for the field.
    Value(String),
    /// Upper bound of a range predicate: the field's value plus an offset.
    High(String),
    /// Amount for `$inc`.
    Increment(String),
    /// The logical negation of the field's boolean value.
    Negated(String),
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::PrimaryKey => write!(f, "{{pk_value}}"),
            Placeholder::Value(field) => write!(f, "{{{field}_value}}"),
            Placeholder::High(field) => write!(f, "{{{field}_high_value}}"),
            Placeholder::Increment(field) => write!(f, "{{{field}_increment}}"),
            Placeholder::Negated(field) => write!(f, "{{{field}_not_value}}"),
        }
    }
}

/// Immutable skeleton node. Placeholders are their own variant, so no string
/// in real data can ever be mistaken for one.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    Literal(Bson),
    Slot(Placeholder),
    Document(Vec<(String, TemplateNode)>),
    Array(Vec<TemplateNode>),
}

impl TemplateNode {
    fn doc<K: Into<String>>(entries: impl IntoIterator<Item = (K, TemplateNode)>) -> Self {
        TemplateNode::Document(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    fn op(operator: &str, operand: TemplateNode) -> Self {
        TemplateNode::doc([(operator, operand)])
    }

    fn value(field: &str) -> Self {
        TemplateNode::Slot(Placeholder::Value(field.to_string()))
    }

    /// Build a new value with every placeholder substituted. The skeleton
    /// itself is never modified.
    pub fn fill(&self, values: &ValueMap) -> Result<Bson, TemplateError> {
        match self {
            TemplateNode::Literal(b) => Ok(b.clone()),
            TemplateNode::Slot(p) => values
                .get(p)
                .cloned()
                .ok_or_else(|| TemplateError::UnboundPlaceholder(p.clone())),
            TemplateNode::Document(entries) => {
                let mut out = Document::new();
                for (key, node) in entries {
                    out.insert(key.clone(), node.fill(values)?);
                }
                Ok(Bson::Document(out))
            }
            TemplateNode::Array(items) => Ok(Bson::Array(
                items
                    .iter()
                    .map(|n| n.fill(values))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
        }
    }

    pub fn fill_document(&self, values: &ValueMap) -> Result<Document, TemplateError> {
        match self.fill(values)? {
            Bson::Document(d) => Ok(d),
            _ => Err(TemplateError::NotADocument),
        }
    }

    fn collect_placeholders(&self, out: &mut Vec<Placeholder>) {
        match self {
            TemplateNode::Literal(_) => {}
            TemplateNode::Slot(p) => {
                if !out.contains(p) {
                    out.push(p.clone());
                }
            }
            TemplateNode::Document(entries) => {
                for (_, node) in entries {
                    node.collect_placeholders(out);
                }
            }
            TemplateNode::Array(items) => {
                for node in items {
                    node.collect_placeholders(out);
                }
            }
        }
    }

    /// Top-level keys of a document node.
    fn top_level_keys(&self) -> Vec<String> {
        match self {
            TemplateNode::Document(entries) => entries.iter().map(|(k, _)| k.clone()).collect(),
            _ => Vec::new(),
        }
    }
}

pub type ValueMap = HashMap<Placeholder, Bson>;

/// One cached query shape.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTemplate {
    pub filter: TemplateNode,
    pub update: Option<TemplateNode>,
    pub projection: Option<Document>,
    /// Whether the filter is anchored on `{pk: PK}`.
    pub anchored: bool,
    placeholders: Vec<Placeholder>,
    filter_fields: Vec<String>,
    modified_fields: Vec<String>,
}

/// A template filled with concrete values.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub filter: Document,
    pub update: Option<Document>,
    pub projection: Option<Document>,
}

impl QueryTemplate {
    fn new(
        filter: TemplateNode,
        update: Option<TemplateNode>,
        projection: Option<Document>,
        anchored: bool,
    ) -> Self {
        let mut placeholders = Vec::new();
        filter.collect_placeholders(&mut placeholders);
        let mut modified_fields = Vec::new();
        if let Some(update) = &update {
            update.collect_placeholders(&mut placeholders);
            if let TemplateNode::Document(ops) = update {
                for (_, fields) in ops {
                    for field in fields.top_level_keys() {
                        if !modified_fields.contains(&field) {
                            modified_fields.push(field);
                        }
                    }
                }
            }
        }
        let filter_fields = filter.top_level_keys();
        Self {
            filter,
            update,
            projection,
            anchored,
            placeholders,
            filter_fields,
            modified_fields,
        }
    }

    /// Placeholders this template needs, in first-appearance order.
    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    /// Top-level field names of the filter.
    pub fn filter_fields(&self) -> &[String] {
        &self.filter_fields
    }

    /// Fields written by the update document.
    pub fn modified_fields(&self) -> &[String] {
        &self.modified_fields
    }

    pub fn render(&self, values: &ValueMap) -> Result<RenderedQuery, TemplateError> {
        Ok(RenderedQuery {
            filter: self.filter.fill_document(values)?,
            update: self
                .update
                .as_ref()
                .map(|u| u.fill_document(values))
                .transpose()?,
            projection: self.projection.clone(),
        })
    }
}

// ============================================================================
// Template construction
// ============================================================================

/// Everything template construction depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateInput {
    pub primary_key: String,
    /// Fields in declaration order.
    pub fields: Vec<(String, FieldType)>,
    /// Fields never written by updates.
    pub shard_keys: Vec<String>,
}

impl TemplateInput {
    /// Inputs for a schema. `extra_shard_keys` adds keys discovered on the
    /// server to the configured ones.
    pub fn from_schema(schema: &CollectionSchema, extra_shard_keys: &[String]) -> Self {
        let mut shard_keys = schema.shard_key_fields();
        for key in extra_shard_keys {
            if !shard_keys.contains(key) {
                shard_keys.push(key.clone());
            }
        }
        Self {
            primary_key: schema.primary_key().to_string(),
            fields: schema
                .fields
                .iter()
                .map(|(name, spec)| (name.to_string(), spec.field_type.clone()))
                .collect(),
            shard_keys,
        }
    }

    pub fn key(&self, operation: OperationKind, mode: QueryMode) -> TemplateKey {
        let mut signature: Vec<(String, String)> = self
            .fields
            .iter()
            .map(|(name, t)| (name.clone(), t.to_string()))
            .collect();
        signature.sort();
        let mut shard_keys = self.shard_keys.clone();
        shard_keys.sort();
        TemplateKey {
            operation,
            mode,
            primary_key: self.primary_key.clone(),
            signature,
            shard_keys,
        }
    }

    fn non_key_fields(&self) -> impl Iterator<Item = (&str, &FieldType)> {
        self.fields
            .iter()
            .filter(move |(name, _)| *name != self.primary_key)
            .map(|(name, t)| (name.as_str(), t))
    }

    fn projection(&self, field: Option<&str>) -> Document {
        let mut projection = doc! { self.primary_key.as_str(): 1 };
        if let Some(field) = field {
            projection.insert(field, 1);
        }
        if self.primary_key != DEFAULT_PRIMARY_KEY && field != Some(DEFAULT_PRIMARY_KEY) {
            projection.insert(DEFAULT_PRIMARY_KEY, 0);
        }
        projection
    }
}

/// Cache key of a template list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub operation: OperationKind,
    pub mode: QueryMode,
    pub primary_key: String,
    /// Sorted `(field, type)` pairs.
    pub signature: Vec<(String, String)>,
    /// Sorted shard key fields.
    pub shard_keys: Vec<String>,
}

fn select_predicates(field: &str, field_type: &FieldType) -> Vec<TemplateNode> {
    let v = TemplateNode::value(field);
    match field_type {
        t if t.is_numeric() => vec![
            v.clone(),
            TemplateNode::op("$gt", v.clone()),
            TemplateNode::op("$lt", v.clone()),
            TemplateNode::doc([
                ("$gte", v),
                ("$lte", TemplateNode::Slot(Placeholder::High(field.to_string()))),
            ]),
        ],
        FieldType::String => vec![v.clone(), TemplateNode::op("$regex", v)],
        FieldType::Array => vec![TemplateNode::op("$in", v)],
        _ => vec![v],
    }
}

fn delete_predicates(field: &str, field_type: &FieldType) -> Vec<TemplateNode> {
    let v = TemplateNode::value(field);
    match field_type {
        t if t.is_numeric() => vec![v.clone(), TemplateNode::op("$gt", v)],
        FieldType::String => vec![v.clone(), TemplateNode::op("$regex", v)],
        FieldType::Array => vec![TemplateNode::op("$in", v)],
        _ => vec![v],
    }
}

fn update_documents(field: &str, field_type: &FieldType) -> Vec<TemplateNode> {
    let set = TemplateNode::op("$set", TemplateNode::doc([(field, TemplateNode::value(field))]));
    match field_type {
        t if t.is_numeric() => vec![
            set,
            TemplateNode::op(
                "$inc",
                TemplateNode::doc([(
                    field,
                    TemplateNode::Slot(Placeholder::Increment(field.to_string())),
                )]),
            ),
        ],
        FieldType::Bool => vec![
            set,
            TemplateNode::op(
                "$set",
                TemplateNode::doc([(
                    field,
                    TemplateNode::Slot(Placeholder::Negated(field.to_string())),
                )]),
            ),
        ],
        FieldType::Array => vec![
            set,
            TemplateNode::op(
                "$push",
                TemplateNode::doc([(field, TemplateNode::op("$each", TemplateNode::value(field)))]),
            ),
        ],
        _ => vec![set],
    }
}

/// Filter-only templates shared by select and delete.
fn predicate_templates(
    input: &TemplateInput,
    mode: QueryMode,
    first: TemplateNode,
    predicates: fn(&str, &FieldType) -> Vec<TemplateNode>,
    with_projection: bool,
) -> Vec<QueryTemplate> {
    let pk = input.primary_key.as_str();
    let anchored = mode == QueryMode::Optimized;
    let projection = |field: Option<&str>| with_projection.then(|| input.projection(field));

    let mut templates = vec![QueryTemplate::new(first, None, projection(None), anchored)];
    for (field, field_type) in input.non_key_fields() {
        for predicate in predicates(field, field_type) {
            let filter = if anchored {
                TemplateNode::doc([
                    (pk, TemplateNode::Slot(Placeholder::PrimaryKey)),
                    (field, predicate),
                ])
            } else {
                TemplateNode::doc([(field, predicate)])
            };
            templates.push(QueryTemplate::new(
                filter,
                None,
                projection(Some(field)),
                anchored,
            ));
        }
    }
    templates
}

/// Build the template list for one operation and mode. Inserts have none.
pub fn build_templates(
    operation: OperationKind,
    mode: QueryMode,
    input: &TemplateInput,
) -> Vec<QueryTemplate> {
    let pk = input.primary_key.as_str();
    let pk_anchor = || TemplateNode::doc([(pk, TemplateNode::Slot(Placeholder::PrimaryKey))]);

    match (operation, mode) {
        (OperationKind::Insert, _) => Vec::new(),

        (OperationKind::Select, QueryMode::Optimized) => {
            predicate_templates(input, mode, pk_anchor(), select_predicates, true)
        }
        (OperationKind::Select, QueryMode::Ineffective) => {
            let exists = TemplateNode::doc([(
                pk,
                TemplateNode::op("$exists", TemplateNode::Literal(Bson::Boolean(true))),
            )]);
            predicate_templates(input, mode, exists, select_predicates, true)
        }

        (OperationKind::Delete, QueryMode::Optimized) => {
            predicate_templates(input, mode, pk_anchor(), delete_predicates, false)
        }
        (OperationKind::Delete, QueryMode::Ineffective) => predicate_templates(
            input,
            mode,
            TemplateNode::Document(Vec::new()),
            delete_predicates,
            false,
        ),

        (OperationKind::Update, _) => {
            let updatable: Vec<(&str, &FieldType)> = input
                .non_key_fields()
                .filter(|(name, _)| !input.shard_keys.iter().any(|k| k.as_str() == *name))
                .collect();
            let mut templates = Vec::new();
            for (field, field_type) in &updatable {
                for update in update_documents(field, field_type) {
                    match mode {
                        QueryMode::Optimized => templates.push(QueryTemplate::new(
                            pk_anchor(),
                            Some(update),
                            None,
                            true,
                        )),
                        QueryMode::Ineffective => {
                            let filters: Vec<TemplateNode> = input
                                .non_key_fields()
                                .filter(|(other, _)| other != field)
                                .map(|(other, _)| TemplateNode::doc([(other, TemplateNode::value(other))]))
                                .collect();
                            if filters.is_empty() {
                                templates.push(QueryTemplate::new(
                                    TemplateNode::Document(Vec::new()),
                                    Some(update),
                                    None,
                                    false,
                                ));
                            } else {
                                for filter in filters {
                                    templates.push(QueryTemplate::new(
                                        filter,
                                        Some(update.clone()),
                                        None,
                                        false,
                                    ));
                                }
                            }
                        }
                    }
                }
            }
            templates
        }
    }
}

// ============================================================================
// Value binding
// ============================================================================

/// Bind every placeholder of `template` to a fresh random value.
///
/// Values are generated only for placeholders the template uses. `High` is
/// derived from the same field's `Value` so ranges are never empty, and
/// `Negated` is the negation of the field's bound boolean.
pub fn bind_values<R: Rng>(
    template: &QueryTemplate,
    schema: &CollectionSchema,
    generator: &DocumentGenerator,
    primary_key_value: &Bson,
    rng: &mut R,
) -> ValueMap {
    let mut values = ValueMap::new();
    for placeholder in template.placeholders() {
        if values.contains_key(placeholder) {
            continue;
        }
        let value = match placeholder {
            Placeholder::PrimaryKey => primary_key_value.clone(),
            Placeholder::Value(field) => field_value(&mut values, schema, generator, field, rng),
            Placeholder::High(field) => {
                let base = field_value(&mut values, schema, generator, field, rng);
                high_value(&base, rng)
            }
            Placeholder::Increment(field) => increment_value(&field_type(schema, field), rng),
            Placeholder::Negated(field) => {
                match field_value(&mut values, schema, generator, field, rng) {
                    Bson::Boolean(b) => Bson::Boolean(!b),
                    other => other,
                }
            }
        };
        values.insert(placeholder.clone(), value);
    }
    values
}

fn field_type(schema: &CollectionSchema, field: &str) -> FieldType {
    schema
        .field(field)
        .map(|s| s.field_type.clone())
        .unwrap_or_default()
}

/// The field's `Value`, generating and recording it on first use.
fn field_value<R: Rng>(
    values: &mut ValueMap,
    schema: &CollectionSchema,
    generator: &DocumentGenerator,
    field: &str,
    rng: &mut R,
) -> Bson {
    let key = Placeholder::Value(field.to_string());
    if let Some(v) = values.get(&key) {
        return v.clone();
    }
    let spec = schema
        .field(field)
        .cloned()
        .unwrap_or_else(|| FieldSpec::new(FieldType::String));
    let v = generator.generate_field(field, &spec, rng);
    values.insert(key, v.clone());
    v
}

/// `base` plus a positive offset, keeping the BSON number width.
fn high_value<R: Rng>(base: &Bson, rng: &mut R) -> Bson {
    match base {
        Bson::Int32(v) => Bson::Int32(v.saturating_add(rng.gen_range(1..=1_000))),
        Bson::Int64(v) => Bson::Int64(v.saturating_add(rng.gen_range(1..=1_000_000))),
        Bson::Double(v) => {
            let offset: f64 = rng.gen_range(1.0..=1_000.0);
            Bson::Double(((v + offset) * 100.0).round() / 100.0)
        }
        Bson::Decimal128(d) => match decimal_to_f64(d) {
            Some(value) => decimal_value(value + rng.gen_range(1.0..=1_000.0)),
            None => base.clone(),
        },
        other => other.clone(),
    }
}

/// `$inc` amount in 1..=10, typed like the field.
fn increment_value<R: Rng>(field_type: &FieldType, rng: &mut R) -> Bson {
    let amount: i32 = rng.gen_range(1..=10);
    match field_type {
        FieldType::Long => Bson::Int64(i64::from(amount)),
        FieldType::Double => Bson::Double(f64::from(amount)),
        FieldType::Decimal => decimal_value(f64::from(amount)),
        _ => Bson::Int32(amount),
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Process-wide template cache.
///
/// Entries are built on first request or by [`TemplateCache::prewarm`], and
/// never change afterwards. Concurrent builders of the same key race
/// harmlessly: the first insert wins and everyone gets that entry.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: RwLock<HashMap<TemplateKey, Arc<[QueryTemplate]>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &self,
        operation: OperationKind,
        mode: QueryMode,
        input: &TemplateInput,
    ) -> Arc<[QueryTemplate]> {
        let key = input.key(operation, mode);
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(found) = entries.get(&key) {
                return Arc::clone(found);
            }
        }
        let built: Arc<[QueryTemplate]> = build_templates(operation, mode, input).into();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(entries.entry(key).or_insert(built))
    }

    /// Build every select/update/delete list for both modes.
    pub fn prewarm(&self, input: &TemplateInput) {
        for operation in [
            OperationKind::Select,
            OperationKind::Update,
            OperationKind::Delete,
        ] {
            for mode in [QueryMode::Optimized, QueryMode::Ineffective] {
                self.get_or_build(operation, mode, input);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn people() -> CollectionSchema {
        CollectionSchema::new("app", "people")
            .with_field("user_id", FieldSpec::new(FieldType::Int).primary_key())
            .with_field("age", FieldSpec::new(FieldType::Int))
            .with_field("name", FieldSpec::new(FieldType::String))
            .with_field("active", FieldSpec::new(FieldType::Bool))
            .with_field("tags", FieldSpec::new(FieldType::Array))
    }

    fn input(schema: &CollectionSchema) -> TemplateInput {
        TemplateInput::from_schema(schema, &[])
    }

    fn filters(templates: &[QueryTemplate], values: &ValueMap) -> Vec<Document> {
        templates
            .iter()
            .map(|t| t.render(values).unwrap().filter)
            .collect()
    }

    fn fixed_values() -> ValueMap {
        let mut values = ValueMap::new();
        values.insert(Placeholder::PrimaryKey, Bson::Int32(7));
        values.insert(Placeholder::Value("age".into()), Bson::Int32(30));
        values.insert(Placeholder::High("age".into()), Bson::Int32(40));
        values.insert(Placeholder::Increment("age".into()), Bson::Int32(2));
        values.insert(Placeholder::Value("name".into()), Bson::String("ann".into()));
        values.insert(Placeholder::Value("active".into()), Bson::Boolean(true));
        values.insert(Placeholder::Negated("active".into()), Bson::Boolean(false));
        values.insert(
            Placeholder::Value("tags".into()),
            Bson::Array(vec![Bson::String("x".into())]),
        );
        values
    }

    #[test]
    fn test_numeric_select_templates() {
        let schema = CollectionSchema::new("app", "people")
            .with_field("user_id", FieldSpec::new(FieldType::Int).primary_key())
            .with_field("age", FieldSpec::new(FieldType::Int));
        let templates = build_templates(OperationKind::Select, QueryMode::Optimized, &input(&schema));
        let got = filters(&templates, &fixed_values());
        assert_eq!(
            got,
            vec![
                doc! { "user_id": 7 },
                doc! { "user_id": 7, "age": 30 },
                doc! { "user_id": 7, "age": { "$gt": 30 } },
                doc! { "user_id": 7, "age": { "$lt": 30 } },
                doc! { "user_id": 7, "age": { "$gte": 30, "$lte": 40 } },
            ]
        );
        assert!(templates.iter().all(|t| t.anchored));
    }

    #[test]
    fn test_ineffective_select_has_no_key_anchor() {
        let schema = people();
        let templates =
            build_templates(OperationKind::Select, QueryMode::Ineffective, &input(&schema));
        let got = filters(&templates, &fixed_values());
        assert_eq!(got[0], doc! { "user_id": { "$exists": true } });
        assert!(got[1..].iter().all(|f| !f.contains_key("user_id")));
        assert!(got.contains(&doc! { "name": { "$regex": "ann" } }));
        assert!(got.contains(&doc! { "tags": { "$in": ["x"] } }));
        assert!(templates.iter().all(|t| !t.anchored));
    }

    #[test]
    fn test_select_projections() {
        let schema = people();
        let templates = build_templates(OperationKind::Select, QueryMode::Optimized, &input(&schema));
        assert_eq!(
            templates[0].projection,
            Some(doc! { "user_id": 1, "_id": 0 })
        );
        assert_eq!(
            templates[1].projection,
            Some(doc! { "user_id": 1, "age": 1, "_id": 0 })
        );
    }

    #[test]
    fn test_projection_when_key_is_object_id() {
        let schema = CollectionSchema::new("app", "logs")
            .with_field("msg", FieldSpec::new(FieldType::String));
        let templates =
            build_templates(OperationKind::Select, QueryMode::Ineffective, &input(&schema));
        assert_eq!(templates[0].projection, Some(doc! { "_id": 1 }));
        assert_eq!(templates[1].projection, Some(doc! { "_id": 1, "msg": 1 }));
    }

    #[test]
    fn test_delete_templates() {
        let schema = people();
        let opt = build_templates(OperationKind::Delete, QueryMode::Optimized, &input(&schema));
        let got = filters(&opt, &fixed_values());
        assert_eq!(got[0], doc! { "user_id": 7 });
        assert!(got.contains(&doc! { "user_id": 7, "age": { "$gt": 30 } }));
        assert!(!got.iter().any(|f| f.get_document("age").map_or(false, |d| d.contains_key("$lt"))));

        let ineffective =
            build_templates(OperationKind::Delete, QueryMode::Ineffective, &input(&schema));
        let got = filters(&ineffective, &fixed_values());
        assert_eq!(got[0], Document::new());
        assert!(got.iter().all(|f| !f.contains_key("user_id")));
    }

    #[test]
    fn test_update_shapes() {
        let schema = people();
        let templates = build_templates(OperationKind::Update, QueryMode::Optimized, &input(&schema));
        let values = fixed_values();
        let updates: Vec<Document> = templates
            .iter()
            .map(|t| t.render(&values).unwrap().update.unwrap())
            .collect();
        assert!(updates.contains(&doc! { "$set": { "age": 30 } }));
        assert!(updates.contains(&doc! { "$inc": { "age": 2 } }));
        assert!(updates.contains(&doc! { "$set": { "active": false } }));
        assert!(updates.contains(&doc! { "$push": { "tags": { "$each": ["x"] } } }));
        assert!(templates
            .iter()
            .all(|t| t.render(&values).unwrap().filter == doc! { "user_id": 7 }));
        assert!(templates.iter().all(|t| !t.modified_fields().contains(&"user_id".to_string())));
    }

    #[test]
    fn test_update_excludes_shard_keys() {
        let schema = people().with_shard_key("age", json!(1));
        let inp = TemplateInput::from_schema(&schema, &["name".to_string()]);
        for mode in [QueryMode::Optimized, QueryMode::Ineffective] {
            let templates = build_templates(OperationKind::Update, mode, &inp);
            assert!(!templates.is_empty());
            for t in &templates {
                assert!(!t.modified_fields().contains(&"age".to_string()));
                assert!(!t.modified_fields().contains(&"name".to_string()));
            }
        }
    }

    #[test]
    fn test_ineffective_update_filters() {
        let schema = people();
        let templates =
            build_templates(OperationKind::Update, QueryMode::Ineffective, &input(&schema));
        for t in &templates {
            assert_eq!(t.filter_fields().len(), 1);
            let field = &t.filter_fields()[0];
            assert_ne!(field, "user_id");
            assert!(!t.modified_fields().contains(field));
        }

        let single = CollectionSchema::new("app", "solo")
            .with_field("count", FieldSpec::new(FieldType::Int));
        let templates =
            build_templates(OperationKind::Update, QueryMode::Ineffective, &input(&single));
        assert!(templates.iter().all(|t| t.filter == TemplateNode::Document(Vec::new())));
    }

    #[test]
    fn test_fill_leaves_template_untouched() {
        let schema = people();
        let templates = build_templates(OperationKind::Select, QueryMode::Optimized, &input(&schema));
        let template = &templates[1];
        let before = template.clone();

        let mut first = fixed_values();
        first.insert(Placeholder::Value("age".into()), Bson::Int32(1));
        let mut second = fixed_values();
        second.insert(Placeholder::Value("age".into()), Bson::Int32(2));

        let a = template.render(&first).unwrap();
        let b = template.render(&second).unwrap();
        assert_eq!(a.filter.get_i32("age").unwrap(), 1);
        assert_eq!(b.filter.get_i32("age").unwrap(), 2);
        assert_eq!(*template, before);
    }

    #[test]
    fn test_unbound_placeholder_is_error() {
        let schema = people();
        let templates = build_templates(OperationKind::Select, QueryMode::Optimized, &input(&schema));
        let err = templates[0].render(&ValueMap::new()).unwrap_err();
        assert!(matches!(err, TemplateError::UnboundPlaceholder(Placeholder::PrimaryKey)));
    }

    #[test]
    fn test_literal_strings_are_not_placeholders() {
        let node = TemplateNode::doc([("note", TemplateNode::Literal(Bson::String("{pk_value}".into())))]);
        let mut values = ValueMap::new();
        values.insert(Placeholder::PrimaryKey, Bson::Int32(1));
        assert_eq!(node.fill_document(&values).unwrap(), doc! { "note": "{pk_value}" });
    }

    #[test]
    fn test_bind_values_generates_only_needed() {
        let schema = people();
        let generator = DocumentGenerator::default();
        let mut rng = StdRng::seed_from_u64(42);
        let templates = build_templates(OperationKind::Select, QueryMode::Optimized, &input(&schema));
        let range = templates
            .iter()
            .find(|t| t.placeholders().contains(&Placeholder::High("age".into())))
            .unwrap();

        for _ in 0..50 {
            let values = bind_values(range, &schema, &generator, &Bson::Int32(9), &mut rng);
            assert_eq!(values.len(), 3);
            assert_eq!(values[&Placeholder::PrimaryKey], Bson::Int32(9));
            let low = values[&Placeholder::Value("age".into())].as_i32().unwrap();
            let high = values[&Placeholder::High("age".into())].as_i32().unwrap();
            assert!(high > low);
        }
    }

    #[test]
    fn test_bind_negation_and_increment() {
        let schema = people();
        let generator = DocumentGenerator::default();
        let mut rng = StdRng::seed_from_u64(1);
        let templates = build_templates(OperationKind::Update, QueryMode::Optimized, &input(&schema));
        for t in &templates {
            let values = bind_values(t, &schema, &generator, &Bson::Int32(1), &mut rng);
            if let Some(neg) = values.get(&Placeholder::Negated("active".into())) {
                assert!(matches!(neg, Bson::Boolean(_)));
            }
            if let Some(inc) = values.get(&Placeholder::Increment("age".into())) {
                assert!((1..=10).contains(&inc.as_i32().unwrap()));
            }
            t.render(&values).unwrap();
        }
    }

    #[test]
    fn test_cache_key_ignores_field_order() {
        let a = CollectionSchema::new("d", "a")
            .with_field("x", FieldSpec::new(FieldType::Int))
            .with_field("y", FieldSpec::new(FieldType::String));
        let b = CollectionSchema::new("d", "b")
            .with_field("y", FieldSpec::new(FieldType::String))
            .with_field("x", FieldSpec::new(FieldType::Int));
        assert_eq!(
            input(&a).key(OperationKind::Select, QueryMode::Optimized),
            input(&b).key(OperationKind::Select, QueryMode::Optimized)
        );
        assert_ne!(
            input(&a).key(OperationKind::Select, QueryMode::Optimized),
            input(&a).key(OperationKind::Select, QueryMode::Ineffective)
        );
    }

    #[test]
    fn test_cache_returns_shared_entry() {
        let cache = TemplateCache::new();
        let schema = people();
        let inp = input(&schema);
        cache.prewarm(&inp);
        assert_eq!(cache.len(), 6);

        let first = cache.get_or_build(OperationKind::Delete, QueryMode::Optimized, &inp);
        let second = cache.get_or_build(OperationKind::Delete, QueryMode::Optimized, &inp);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 6);
    }

    #[test]
    fn test_decimal_high_value_tracks_wide_base() {
        use std::str::FromStr;
        let mut rng = StdRng::seed_from_u64(5);
        let decimal = bson::Decimal128::from_str("12345678901234567890.50").unwrap();
        let base_value = decimal_to_f64(&decimal).unwrap();
        let base = Bson::Decimal128(decimal);
        for _ in 0..20 {
            let Bson::Decimal128(high) = high_value(&base, &mut rng) else {
                panic!("Expected Decimal128");
            };
            let high = decimal_to_f64(&high).unwrap();
            assert!(high > base_value * 0.999_999 && high < base_value * 1.000_001);
        }
    }

    #[test]
    fn test_decimal_increment_is_decimal() {
        let mut rng = StdRng::seed_from_u64(5);
        let Bson::Decimal128(amount) = increment_value(&FieldType::Decimal, &mut rng) else {
            panic!("Expected Decimal128");
        };
        assert!((1.0..=10.0).contains(&decimal_to_f64(&amount).unwrap()));
    }

    #[test]
    fn test_placeholder_display() {
        assert_eq!(Placeholder::PrimaryKey.to_string(), "{pk_value}");
        assert_eq!(Placeholder::High("age".into()).to_string(), "{age_high_value}");
    }
}
