//! Document generator for schema-described collections.

use crate::context::{AircraftContext, GenerationContext};
use crate::generators::{generate_for_type, generate_value};
use crate::registry::{GeneratorRegistry, SEATS_AVAILABLE_FIELD};
use bson::{Bson, Document};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use tracing::warn;
use workload_core::{CollectionSchema, FieldSpec, DEFAULT_PRIMARY_KEY};

/// Error type for generator operations.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// A field names a generator the registry does not know
    #[error("Unknown generator '{generator}' for field '{field}' in {collection}")]
    UnknownGenerator {
        collection: String,
        field: String,
        generator: String,
    },

    /// Schema error
    #[error("Schema error: {0}")]
    SchemaError(#[from] workload_core::SchemaError),
}

/// Produces random documents for collection schemas.
///
/// The generator holds no RNG; callers pass their own so that concurrent
/// streams never contend on one.
#[derive(Clone)]
pub struct DocumentGenerator {
    registry: Arc<GeneratorRegistry>,
}

impl DocumentGenerator {
    pub fn new(registry: Arc<GeneratorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &GeneratorRegistry {
        &self.registry
    }

    /// Generate one document.
    ///
    /// Fields are filled in declaration order. An aircraft context is drawn
    /// once per document when any field needs it. A field named
    /// `seats_available` always carries the context's value. If the
    /// primary key (other than `_id`) is still missing, one is generated
    /// from its declared type.
    pub fn generate_document<R: Rng>(&self, schema: &CollectionSchema, rng: &mut R) -> Document {
        let now = Utc::now();
        let ctx = if self.registry.requires_context(schema) {
            GenerationContext::with_aircraft(AircraftContext::generate(rng))
        } else {
            GenerationContext::default()
        };

        let mut doc = Document::new();
        for (field, spec) in schema.fields.iter() {
            let value = self.field_value(field, spec, rng, &ctx, now);
            doc.insert(field, value);
        }

        if ctx.aircraft.is_some() && schema.fields.contains_key(SEATS_AVAILABLE_FIELD) {
            doc.insert(SEATS_AVAILABLE_FIELD, Bson::Int32(ctx.seats_available()));
        }

        let pk = schema.primary_key();
        if pk != DEFAULT_PRIMARY_KEY && !doc.contains_key(pk) {
            doc.insert(pk, self.generate_primary_key(schema, rng));
        }

        doc
    }

    /// Generate `count` documents.
    pub fn generate_batch<R: Rng>(
        &self,
        schema: &CollectionSchema,
        count: usize,
        rng: &mut R,
    ) -> Vec<Document> {
        (0..count).map(|_| self.generate_document(schema, rng)).collect()
    }

    /// A value for one field outside any document, used to bind query
    /// placeholders. Context-dependent generators see default aircraft facts.
    pub fn generate_field<R: Rng>(&self, field: &str, spec: &FieldSpec, rng: &mut R) -> Bson {
        self.field_value(field, spec, rng, &GenerationContext::default(), Utc::now())
    }

    fn field_value<R: Rng>(
        &self,
        field: &str,
        spec: &FieldSpec,
        rng: &mut R,
        ctx: &GenerationContext,
        now: DateTime<Utc>,
    ) -> Bson {
        match spec.generator.as_deref() {
            Some(name) => match self.registry.get(name) {
                Some(named) => (named.generate)(&mut *rng, ctx),
                None => {
                    warn!("Unhandled generator '{}' for field '{}'", name, field);
                    generate_value(field, spec, rng, now)
                }
            },
            None => generate_value(field, spec, rng, now),
        }
    }

    /// A fresh value of the primary key's declared type.
    pub fn generate_primary_key<R: Rng>(&self, schema: &CollectionSchema, rng: &mut R) -> Bson {
        generate_for_type(&schema.primary_key_type(), rng, Utc::now())
    }
}

impl Default for DocumentGenerator {
    fn default() -> Self {
        Self::new(Arc::new(GeneratorRegistry::with_builtins()))
    }
}
