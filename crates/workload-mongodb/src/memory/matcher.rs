//! Filter evaluation and projection for the in-memory store.
//!
//! Covers the operators the workload emits plus the common logical ones:
//! `$eq $ne $gt $gte $lt $lte $in $nin $exists $regex $and $or $nor`.
//! Array fields match when any element matches, as on the server.

use crate::error::WorkloadError;
use bson::{Bson, Document};
use regex::RegexBuilder;
use std::cmp::Ordering;
use workload_generator::bson_as_f64;

/// Resolve a dotted path inside a document.
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn matches(doc: &Document, filter: &Document) -> Result<bool, WorkloadError> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_clause(doc, key, condition)?,
            "$nor" => !any_clause(doc, key, condition)?,
            op if op.starts_with('$') => {
                return Err(WorkloadError::Store(format!(
                    "unsupported top-level operator {op}"
                )))
            }
            path => field_matches(lookup(doc, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(key: &str, condition: &'a Bson) -> Result<Vec<&'a Document>, WorkloadError> {
    let Bson::Array(items) = condition else {
        return Err(WorkloadError::Store(format!("{key} needs an array")));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => Ok(d),
            _ => Err(WorkloadError::Store(format!("{key} entries must be documents"))),
        })
        .collect()
}

fn any_clause(doc: &Document, key: &str, condition: &Bson) -> Result<bool, WorkloadError> {
    for clause in clauses(key, condition)? {
        if matches(doc, clause)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn is_operator_document(condition: &Bson) -> Option<&Document> {
    match condition {
        Bson::Document(d) if d.keys().next().is_some_and(|k| k.starts_with('$')) => Some(d),
        _ => None,
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> Result<bool, WorkloadError> {
    let Some(operators) = is_operator_document(condition) else {
        return Ok(equals_or_contains(value, condition));
    };
    for (op, operand) in operators {
        let ok = match op.as_str() {
            "$eq" => equals_or_contains(value, operand),
            "$ne" => !equals_or_contains(value, operand),
            "$gt" => compare_any(value, operand, |o| o == Ordering::Greater),
            "$gte" => compare_any(value, operand, |o| o != Ordering::Less),
            "$lt" => compare_any(value, operand, |o| o == Ordering::Less),
            "$lte" => compare_any(value, operand, |o| o != Ordering::Greater),
            "$in" => in_list(value, operand)?,
            "$nin" => !in_list(value, operand)?,
            "$exists" => value.is_some() == truthy(operand),
            "$regex" => {
                let options = operators.get_str("$options").unwrap_or("");
                regex_matches(value, operand, options)?
            }
            "$options" => true,
            other => {
                return Err(WorkloadError::Store(format!(
                    "unsupported query operator {other}"
                )))
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => bson_as_f64(other).map_or(true, |n| n != 0.0),
    }
}

/// Equality with numeric widening.
pub(crate) fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (bson_as_f64(a), bson_as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn equals_or_contains(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(actual) => {
            values_equal(actual, expected)
                || matches!(actual, Bson::Array(items) if items.iter().any(|i| values_equal(i, expected)))
        }
    }
}

pub(crate) fn compare_values(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (bson_as_f64(a), bson_as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            Some((x.time, x.increment).cmp(&(y.time, y.increment)))
        }
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_any(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(actual) = value else {
        return false;
    };
    let direct = compare_values(actual, operand).is_some_and(&accept);
    direct
        || matches!(actual, Bson::Array(items)
            if items.iter().any(|i| compare_values(i, operand).is_some_and(&accept)))
}

fn in_list(value: Option<&Bson>, operand: &Bson) -> Result<bool, WorkloadError> {
    let Bson::Array(candidates) = operand else {
        return Err(WorkloadError::Store("$in/$nin needs an array".to_string()));
    };
    Ok(candidates.iter().any(|c| equals_or_contains(value, c)))
}

fn regex_matches(value: Option<&Bson>, pattern: &Bson, options: &str) -> Result<bool, WorkloadError> {
    let (pattern, options) = match pattern {
        Bson::String(p) => (p.as_str(), options),
        Bson::RegularExpression(r) => (r.pattern.as_str(), r.options.as_str()),
        other => {
            return Err(WorkloadError::Store(format!(
                "$regex needs a string, got {other}"
            )))
        }
    };
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| WorkloadError::Store(format!("invalid $regex: {e}")))?;
    Ok(match value {
        Some(Bson::String(s)) => regex.is_match(s),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|i| matches!(i, Bson::String(s) if regex.is_match(s))),
        _ => false,
    })
}

/// Apply a find projection. Inclusion projections keep `_id` unless it is
/// explicitly excluded; a projection of only exclusions removes those fields.
pub fn project(doc: &Document, projection: &Document) -> Document {
    let includes = projection.values().any(truthy);
    if includes {
        let mut out = Document::new();
        let keep_id = projection.get("_id").map_or(true, truthy);
        if keep_id {
            if let Some(id) = doc.get("_id") {
                out.insert("_id", id.clone());
            }
        }
        for (key, flag) in projection {
            if key == "_id" || !truthy(flag) {
                continue;
            }
            if let Some(value) = lookup(doc, key) {
                out.insert(key.clone(), value.clone());
            }
        }
        out
    } else {
        let mut out = doc.clone();
        for (key, flag) in projection {
            if !truthy(flag) {
                out.remove(key);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn person() -> Document {
        doc! {
            "_id": 1,
            "name": "Alice",
            "age": 34,
            "score": 12.5_f64,
            "tags": ["red", "blue"],
            "address": { "city": "Paris" },
        }
    }

    fn check(filter: Document) -> bool {
        matches(&person(), &filter).unwrap()
    }

    #[test]
    fn test_equality_and_numeric_widening() {
        assert!(check(doc! { "name": "Alice" }));
        assert!(check(doc! { "age": 34_i64 }));
        assert!(check(doc! { "age": 34.0_f64 }));
        assert!(!check(doc! { "age": 35 }));
        assert!(check(doc! { "missing": Bson::Null }));
        assert!(check(doc! {}));
    }

    #[test]
    fn test_comparisons() {
        assert!(check(doc! { "age": { "$gt": 30 } }));
        assert!(!check(doc! { "age": { "$lt": 30 } }));
        assert!(check(doc! { "age": { "$gte": 34, "$lte": 40 } }));
        assert!(!check(doc! { "age": { "$gte": 35, "$lte": 40 } }));
        assert!(check(doc! { "score": { "$lt": 13 } }));
        assert!(!check(doc! { "missing": { "$gt": 0 } }));
        assert!(!check(doc! { "name": { "$gt": 5 } }));
    }

    #[test]
    fn test_arrays_and_in() {
        assert!(check(doc! { "tags": "red" }));
        assert!(check(doc! { "tags": { "$in": ["green", "blue"] } }));
        assert!(!check(doc! { "tags": { "$in": ["green"] } }));
        assert!(check(doc! { "age": { "$nin": [1, 2] } }));
        assert!(check(doc! { "age": { "$ne": 3 } }));
    }

    #[test]
    fn test_exists_and_paths() {
        assert!(check(doc! { "name": { "$exists": true } }));
        assert!(check(doc! { "nope": { "$exists": false } }));
        assert!(check(doc! { "address.city": "Paris" }));
        assert!(check(doc! { "tags.1": "blue" }));
    }

    #[test]
    fn test_regex() {
        assert!(check(doc! { "name": { "$regex": "lic" } }));
        assert!(!check(doc! { "name": { "$regex": "^lic" } }));
        assert!(check(doc! { "name": { "$regex": "^ali", "$options": "i" } }));
        assert!(check(doc! { "tags": { "$regex": "^bl" } }));
        assert!(matches(&person(), &doc! { "name": { "$regex": "(" } }).is_err());
    }

    #[test]
    fn test_logical_operators() {
        assert!(check(doc! { "$or": [ { "age": 1 }, { "name": "Alice" } ] }));
        assert!(!check(doc! { "$and": [ { "age": 34 }, { "name": "Bob" } ] }));
        assert!(check(doc! { "$nor": [ { "age": 1 } ] }));
        assert!(matches(&person(), &doc! { "$where": "1" }).is_err());
    }

    #[test]
    fn test_projection() {
        let p = project(&person(), &doc! { "age": 1, "_id": 0 });
        assert_eq!(p, doc! { "age": 34 });

        let p = project(&person(), &doc! { "name": 1 });
        assert_eq!(p, doc! { "_id": 1, "name": "Alice" });

        let p = project(&person(), &doc! { "_id": 1 });
        assert_eq!(p, doc! { "_id": 1 });

        let p = project(&person(), &doc! { "tags": 0, "address": 0 });
        assert_eq!(p.len(), 4);
    }
}
