//! Update operators for the in-memory store: `$set $unset $inc $push`.

use crate::error::WorkloadError;
use bson::{Bson, Document};
use workload_generator::{bson_as_f64, decimal_value};

/// Apply an operator update in place. Returns whether the document changed.
pub fn apply_update(doc: &mut Document, update: &Document) -> Result<bool, WorkloadError> {
    let before = doc.clone();
    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(WorkloadError::Store(format!(
                "{operator} needs a document of fields"
            )));
        };
        for (path, operand) in fields {
            if path == "_id" {
                return Err(WorkloadError::Store(
                    "the _id field is immutable".to_string(),
                ));
            }
            match operator.as_str() {
                "$set" => set_path(doc, path, operand.clone())?,
                "$unset" => {
                    unset_path(doc, path);
                }
                "$inc" => {
                    let current = get_path(doc, path).cloned();
                    set_path(doc, path, increment(current.as_ref(), operand)?)?;
                }
                "$push" => {
                    let additions = match operand {
                        Bson::Document(d) if d.contains_key("$each") => match d.get("$each") {
                            Some(Bson::Array(items)) => items.clone(),
                            _ => {
                                return Err(WorkloadError::Store(
                                    "$each needs an array".to_string(),
                                ))
                            }
                        },
                        single => vec![single.clone()],
                    };
                    let mut items = match get_path(doc, path) {
                        None => Vec::new(),
                        Some(Bson::Array(items)) => items.clone(),
                        Some(_) => {
                            return Err(WorkloadError::Store(format!(
                                "$push target {path} is not an array"
                            )))
                        }
                    };
                    items.extend(additions);
                    set_path(doc, path, Bson::Array(items))?;
                }
                other => {
                    return Err(WorkloadError::Store(format!(
                        "unsupported update operator {other}"
                    )))
                }
            }
        }
    }
    Ok(*doc != before)
}

fn increment(current: Option<&Bson>, amount: &Bson) -> Result<Bson, WorkloadError> {
    let not_numeric = || WorkloadError::Store("$inc needs numeric values".to_string());
    let current = current.cloned().unwrap_or(Bson::Int32(0));
    Ok(match (&current, amount) {
        (Bson::Int32(a), Bson::Int32(b)) => match a.checked_add(*b) {
            Some(sum) => Bson::Int32(sum),
            None => Bson::Int64(i64::from(*a) + i64::from(*b)),
        },
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a).saturating_add(*b)),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.saturating_add(i64::from(*b))),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.saturating_add(*b)),
        (Bson::Decimal128(_), _) | (_, Bson::Decimal128(_)) => {
            let sum = bson_as_f64(&current).ok_or_else(not_numeric)?
                + bson_as_f64(amount).ok_or_else(not_numeric)?;
            decimal_value(sum)
        }
        _ => Bson::Double(
            bson_as_f64(&current).ok_or_else(not_numeric)?
                + bson_as_f64(amount).ok_or_else(not_numeric)?,
        ),
    })
}

fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    super::matcher::lookup(doc, path)
}

/// Set a dotted path, creating intermediate documents.
fn set_path(doc: &mut Document, path: &str, value: Bson) -> Result<(), WorkloadError> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !doc.contains_key(head) {
                doc.insert(head, Document::new());
            }
            match doc.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(WorkloadError::Store(format!(
                    "cannot set {path}: {head} is not a document"
                ))),
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Bson::Document(inner)) => unset_path(inner, rest),
            _ => None,
        },
    }
}
