//! Named generator registry.
//!
//! Schema fields may name a generator (`"provider": "flight_code"`) instead of
//! relying on the type-based default. Names resolve through this registry;
//! a schema naming an unregistered generator is rejected before any worker
//! starts.

use crate::context::{self, GenerationContext};
use crate::generators::words;
use crate::GeneratorError;
use bson::Bson;
use rand::{Rng, RngCore};
use std::collections::HashMap;
use workload_core::{CollectionSchema, SchemaSet};

/// Field literally named this always takes the context's free seat count.
pub const SEATS_AVAILABLE_FIELD: &str = "seats_available";

pub type GeneratorFn = fn(&mut dyn RngCore, &GenerationContext) -> Bson;

#[derive(Clone, Copy)]
pub struct NamedGenerator {
    /// Whether the generator reads the aircraft context.
    pub needs_context: bool,
    pub generate: GeneratorFn,
}

pub struct GeneratorRegistry {
    generators: HashMap<String, NamedGenerator>,
}

impl GeneratorRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            generators: HashMap::new(),
        }
    }

    /// Registry holding every built-in generator.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();

        // Flight domain
        registry.register("passengers", true, |rng, ctx| context::passengers(rng, ctx));
        registry.register("equip", true, |rng, ctx| context::equipment(rng, ctx));
        registry.register("total_seats", true, |_, ctx| {
            Bson::String(ctx.total_seats().to_string())
        });
        registry.register("seats_available", true, |_, ctx| {
            Bson::Int32(ctx.seats_available())
        });
        registry.register("flight_code", false, |rng, _| {
            let a = rng.gen_range(b'A'..=b'Z') as char;
            let b = rng.gen_range(b'A'..=b'Z') as char;
            Bson::String(format!("{a}{b}{}", rng.gen_range(100..=999)))
        });
        registry.register("gate", false, |rng, _| {
            let letter = rng.gen_range(b'A'..=b'F') as char;
            Bson::String(format!("{letter}{}", rng.gen_range(1..=50)))
        });
        registry.register("plane_type", false, |rng, _| {
            Bson::String(words::pick(rng, context::PLANE_TYPES).to_string())
        });

        // People and places
        registry.register("name", false, |rng, _| Bson::String(words::full_name(rng)));
        registry.register("first_name", false, |rng, _| {
            Bson::String(words::pick(rng, words::FIRST_NAMES).to_string())
        });
        registry.register("last_name", false, |rng, _| {
            Bson::String(words::pick(rng, words::LAST_NAMES).to_string())
        });
        registry.register("email", false, |rng, _| {
            let first = words::pick(rng, words::FIRST_NAMES).to_ascii_lowercase();
            let last = words::pick(rng, words::LAST_NAMES).to_ascii_lowercase();
            let domain = words::pick(rng, words::EMAIL_DOMAINS);
            Bson::String(format!("{first}.{last}{}@{domain}", rng.gen_range(1..=999)))
        });
        registry.register("phone_number", false, |rng, _| {
            Bson::String(format!(
                "+1-{:03}-{:03}-{:04}",
                rng.gen_range(200..=999),
                rng.gen_range(200..=999),
                rng.gen_range(0..=9999)
            ))
        });
        registry.register("city", false, |rng, _| {
            Bson::String(words::pick(rng, words::CITIES).to_string())
        });
        registry.register("country", false, |rng, _| {
            Bson::String(words::pick(rng, words::COUNTRIES).to_string())
        });
        registry.register("address", false, |rng, _| {
            let number = rng.gen_range(1..=9999);
            let street = words::pick(rng, words::WORDS);
            let suffix = words::pick(rng, words::STREET_SUFFIXES);
            let city = words::pick(rng, words::CITIES);
            Bson::String(format!("{number} {street} {suffix}, {city}"))
        });

        // Text and identifiers
        registry.register("word", false, |rng, _| Bson::String(words::word(rng)));
        registry.register("sentence", false, |rng, _| Bson::String(words::sentence(rng)));
        registry.register("uuid4", false, |rng, _| {
            let uuid = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
            Bson::String(uuid.to_string())
        });
        registry.register("ipv4", false, |rng, _| {
            let octets: [u8; 4] = rng.gen();
            Bson::String(format!(
                "{}.{}.{}.{}",
                octets[0], octets[1], octets[2], octets[3]
            ))
        });
        registry.register("price", false, |rng, _| {
            let cents: i64 = rng.gen_range(100..=99_999);
            Bson::Double(cents as f64 / 100.0)
        });

        registry
    }

    pub fn register(&mut self, name: impl Into<String>, needs_context: bool, generate: GeneratorFn) {
        self.generators.insert(
            name.into(),
            NamedGenerator {
                needs_context,
                generate,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&NamedGenerator> {
        self.generators.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.generators.contains_key(name)
    }

    /// Sorted generator names, for help output.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.generators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Reject any field naming an unregistered generator.
    pub fn validate(&self, schemas: &SchemaSet) -> Result<(), GeneratorError> {
        for schema in schemas.iter() {
            self.validate_collection(schema)?;
        }
        Ok(())
    }

    pub fn validate_collection(&self, schema: &CollectionSchema) -> Result<(), GeneratorError> {
        for (field, spec) in schema.fields.iter() {
            if let Some(name) = &spec.generator {
                if !self.contains(name) {
                    return Err(GeneratorError::UnknownGenerator {
                        collection: schema.namespace(),
                        field: field.to_string(),
                        generator: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Whether documents of this collection need an aircraft context.
    pub fn requires_context(&self, schema: &CollectionSchema) -> bool {
        schema.fields.contains_key(SEATS_AVAILABLE_FIELD)
            || schema.fields.iter().any(|(_, spec)| {
                spec.generator
                    .as_deref()
                    .and_then(|name| self.get(name))
                    .is_some_and(|g| g.needs_context)
            })
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use workload_core::{FieldSpec, FieldType};

    fn run(name: &str) -> Bson {
        let registry = GeneratorRegistry::with_builtins();
        let mut rng = StdRng::seed_from_u64(42);
        let generator = registry.get(name).unwrap();
        (generator.generate)(&mut rng, &GenerationContext::default())
    }

    #[test]
    fn test_flight_code_format() {
        let Bson::String(code) = run("flight_code") else {
            panic!("Expected string");
        };
        assert_eq!(code.len(), 5);
        assert!(code[..2].chars().all(|c| c.is_ascii_uppercase()));
        let number: u32 = code[2..].parse().unwrap();
        assert!((100..=999).contains(&number));
    }

    #[test]
    fn test_gate_format() {
        let Bson::String(gate) = run("gate") else {
            panic!("Expected string");
        };
        assert!(('A'..='F').contains(&gate.chars().next().unwrap()));
        let number: u32 = gate[1..].parse().unwrap();
        assert!((1..=50).contains(&number));
    }

    #[test]
    fn test_total_seats_is_string() {
        assert_eq!(run("total_seats"), Bson::String("100".to_string()));
    }

    #[test]
    fn test_uuid4_parses() {
        let Bson::String(s) = run("uuid4") else {
            panic!("Expected string");
        };
        let parsed = uuid::Uuid::parse_str(&s).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn test_validate_rejects_unknown_generator() {
        let registry = GeneratorRegistry::with_builtins();
        let schema = CollectionSchema::new("db", "c")
            .with_field("x", FieldSpec::new(FieldType::String).with_generator("nope"));
        let set = SchemaSet::new(vec![schema]).unwrap();
        let err = registry.validate(&set).unwrap_err();
        assert!(matches!(
            err,
            GeneratorError::UnknownGenerator { ref generator, .. } if generator == "nope"
        ));
    }

    #[test]
    fn test_requires_context() {
        let registry = GeneratorRegistry::with_builtins();
        let plain = CollectionSchema::new("db", "c")
            .with_field("gate", FieldSpec::new(FieldType::String).with_generator("gate"));
        assert!(!registry.requires_context(&plain));

        let by_generator = CollectionSchema::new("db", "c")
            .with_field("equipment", FieldSpec::new(FieldType::Object).with_generator("equip"));
        assert!(registry.requires_context(&by_generator));

        let by_name = CollectionSchema::new("db", "c")
            .with_field("seats_available", FieldSpec::new(FieldType::Int));
        assert!(registry.requires_context(&by_name));
    }

    #[test]
    fn test_names_sorted() {
        let registry = GeneratorRegistry::with_builtins();
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert!(names.contains(&"passengers"));
    }
}
