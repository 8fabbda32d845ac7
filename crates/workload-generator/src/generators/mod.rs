//! Type-driven value generators.
//!
//! Every declared field type maps to one generator. Named generators from the
//! registry take precedence; these are the fallbacks.

pub mod numeric;
pub mod timestamp;
pub mod words;

use bson::{doc, oid::ObjectId, Bson};
use chrono::{DateTime, Utc};
use rand::Rng;
use workload_core::{FieldSpec, FieldType};

/// Generate a random value for a field definition.
///
/// `date` fields honour the definition's date bounds when both are set.
pub fn generate_value<R: Rng + ?Sized>(
    field: &str,
    spec: &FieldSpec,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Bson {
    if spec.field_type == FieldType::Date {
        if let Ok(Some((start, end))) = spec.date_range(field, now) {
            return timestamp::generate_date_range(rng, start, end);
        }
    }
    generate_for_type(&spec.field_type, rng, now)
}

/// Generate a random value of the given type with default bounds.
pub fn generate_for_type<R: Rng + ?Sized>(
    field_type: &FieldType,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Bson {
    match field_type {
        FieldType::String => Bson::String(words::word(rng)),
        FieldType::Int => numeric::generate_int(rng),
        FieldType::Double => numeric::generate_double(rng),
        FieldType::Bool => Bson::Boolean(rng.gen_bool(0.5)),
        FieldType::Date => timestamp::generate_date(rng, now),
        FieldType::ObjectId => Bson::ObjectId(ObjectId::new()),
        FieldType::Array => Bson::Array(
            words::words(rng, 1, 5)
                .into_iter()
                .map(Bson::String)
                .collect(),
        ),
        FieldType::Object => Bson::Document(doc! { "randomKey": words::word(rng) }),
        FieldType::Timestamp => timestamp::generate_timestamp(now),
        FieldType::Long => numeric::generate_long(rng),
        FieldType::Decimal => numeric::generate_decimal(rng),
        FieldType::Unknown(_) => Bson::Null,
    }
}
