//! Random document generator for the mongo-workload generator.
//!
//! Documents are produced from a [`workload_core::CollectionSchema`]. Each
//! field is filled either by a named generator from the
//! [`GeneratorRegistry`] or by the default generator for its declared type:
//!
//! | type      | value                                        |
//! |-----------|----------------------------------------------|
//! | string    | random word                                  |
//! | int       | uniform 1..=10000                            |
//! | double    | uniform 10..=10000, two decimals             |
//! | bool      | coin flip                                    |
//! | date      | within the field's date bounds, else random  |
//! | objectId  | fresh ObjectId                               |
//! | array     | 1 to 5 random words                          |
//! | object    | `{ randomKey: <word> }`                      |
//! | timestamp | current instant                              |
//! | long      | uniform 1e10..1e11                           |
//! | decimal   | uniform 0.1..9999.99 as Decimal128           |
//! | other     | null                                         |
//!
//! # Example
//!
//! ```rust
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use workload_core::{CollectionSchema, FieldSpec, FieldType};
//! use workload_generator::DocumentGenerator;
//!
//! let schema = CollectionSchema::new("shop", "orders")
//!     .with_field("sku", FieldSpec::new(FieldType::String).unique())
//!     .with_field("qty", FieldSpec::new(FieldType::Int));
//!
//! let generator = DocumentGenerator::default();
//! let mut rng = StdRng::seed_from_u64(42);
//! let doc = generator.generate_document(&schema, &mut rng);
//! assert!(doc.contains_key("sku"));
//! ```

pub mod context;
pub mod generator;
pub mod generators;
pub mod registry;

// Re-exports for convenience
pub use context::{AircraftContext, GenerationContext};
pub use generator::{DocumentGenerator, GeneratorError};
pub use generators::numeric::{bson_as_f64, decimal_from_f64, decimal_to_f64, decimal_value};
pub use generators::{generate_for_type, generate_value};
pub use registry::{GeneratorFn, GeneratorRegistry, NamedGenerator};
