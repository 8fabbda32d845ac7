//! Error types for the MongoDB workload engine.

use thiserror::Error;

/// Errors raised while setting up or executing workload operations.
#[derive(Error, Debug)]
pub enum WorkloadError {
    /// MongoDB connection or query error.
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    /// BSON conversion error.
    #[error("BSON error: {0}")]
    BsonDe(#[from] bson::de::Error),

    /// BSON serialization error.
    #[error("BSON error: {0}")]
    BsonSer(#[from] bson::ser::Error),

    /// Template could not be filled.
    #[error("Template error: {0}")]
    Template(#[from] crate::templates::TemplateError),

    /// Schema-related error.
    #[error("Schema error: {0}")]
    Schema(#[from] workload_core::SchemaError),

    /// Generator error.
    #[error("Generator error: {0}")]
    Generator(#[from] workload_generator::GeneratorError),

    /// Collection not found in schema.
    #[error("Collection '{0}' not found in schema")]
    CollectionNotFound(String),

    /// In-memory store rejected a filter or update.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
