//! Operation and query-mode vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The four CRUD operations a workload issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Select,
    Update,
    Delete,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Insert,
        OperationKind::Select,
        OperationKind::Update,
        OperationKind::Delete,
    ];
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Insert => write!(f, "insert"),
            OperationKind::Select => write!(f, "select"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// Whether generated queries use the primary key (index-friendly) or avoid it
/// (collection scans and scatter-gather).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Optimized,
    Ineffective,
}

impl QueryMode {
    pub fn from_optimized(optimized: bool) -> Self {
        if optimized {
            QueryMode::Optimized
        } else {
            QueryMode::Ineffective
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryMode::Optimized => write!(f, "optimized"),
            QueryMode::Ineffective => write!(f, "ineffective"),
        }
    }
}
