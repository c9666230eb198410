//! Evaluation of MongoDB-style filters and patches against BSON documents.

use std::cmp::Ordering;

use mongodb::bson::{Bson, Document as BsonDocument};

use crate::document::{Sort, SortDirection, StoreError, StoreResult, Update};

/// Whether `document` satisfies `filter`.
pub fn matches(document: &BsonDocument, filter: &BsonDocument) -> StoreResult<bool> {
    for (key, condition) in filter {
        let matched = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            op if op.starts_with('$') => {
                return Err(StoreError::validation(format!(
                    "unsupported top-level operator '{op}'"
                )));
            }
            path => field_matches(lookup(document, path), condition)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(operator: &str, value: &'a Bson) -> StoreResult<Vec<&'a BsonDocument>> {
    let Bson::Array(items) = value else {
        return Err(StoreError::validation(format!("'{operator}' expects an array")));
    };
    items
        .iter()
        .map(|item| {
            item.as_document().ok_or_else(|| {
                StoreError::validation(format!("'{operator}' clauses must be documents"))
            })
        })
        .collect()
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> StoreResult<bool> {
    match condition {
        Bson::Document(ops) if is_operator_document(ops) => {
            for (op, operand) in ops {
                if !operator_matches(value, op, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equals(value, condition)),
    }
}

fn is_operator_document(document: &BsonDocument) -> bool {
    !document.is_empty() && document.keys().all(|k| k.starts_with('$'))
}

fn operator_matches(value: Option<&Bson>, op: &str, operand: &Bson) -> StoreResult<bool> {
    let ordered = |accept: fn(Ordering) -> bool| {
        value.is_some_and(|v| compare_values(v, operand).is_some_and(accept))
    };

    Ok(match op {
        "$eq" => equals(value, operand),
        "$ne" => !equals(value, operand),
        "$gt" => ordered(|o| o == Ordering::Greater),
        "$gte" => ordered(|o| o != Ordering::Less),
        "$lt" => ordered(|o| o == Ordering::Less),
        "$lte" => ordered(|o| o != Ordering::Greater),
        "$in" => in_list(value, operand, op)?,
        "$nin" => !in_list(value, operand, op)?,
        "$exists" => {
            let wanted = operand.as_bool().ok_or_else(|| {
                StoreError::validation("'$exists' expects a boolean")
            })?;
            value.is_some() == wanted
        }
        other => {
            return Err(StoreError::validation(format!(
                "unsupported query operator '{other}'"
            )));
        }
    })
}

fn in_list(value: Option<&Bson>, operand: &Bson, op: &str) -> StoreResult<bool> {
    let Bson::Array(candidates) = operand else {
        return Err(StoreError::validation(format!("'{op}' expects an array")));
    };
    Ok(candidates.iter().any(|candidate| equals(value, candidate)))
}

/// Equality with MongoDB's array semantics: an array field matches a scalar it
/// contains. A missing field equals `null`.
fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(actual) => values_equal(actual, expected),
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Ordering between two values of comparable types; `None` across types.
fn compare_values(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Rank of a BSON type in MongoDB's cross-type sort order.
fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) => 0,
        Some(Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => 1,
        Some(Bson::String(_)) => 2,
        Some(Bson::Document(_)) => 3,
        Some(Bson::Array(_)) => 4,
        Some(Bson::Boolean(_)) => 5,
        Some(Bson::DateTime(_)) => 6,
        Some(_) => 7,
    }
}

/// Total order used by `find_with_pagination`.
pub fn compare_documents(a: &BsonDocument, b: &BsonDocument, sort: &Sort) -> Ordering {
    for (field, direction) in sort.fields() {
        let (left, right) = (lookup(a, field), lookup(b, field));
        let ordering = match (left, right) {
            (Some(x), Some(y)) => compare_values(x, y)
                .unwrap_or_else(|| type_rank(left).cmp(&type_rank(right))),
            _ => type_rank(left).cmp(&type_rank(right)),
        };
        let ordering = match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Resolve a dotted path such as `address.city`.
pub fn lookup<'a>(document: &'a BsonDocument, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }
    Some(current)
}

/// Apply a normalised patch (operator form) in place.
pub fn apply_update(document: &mut BsonDocument, update: &Update) -> StoreResult<()> {
    for (operator, fields) in update {
        let fields = fields.as_document().ok_or_else(|| {
            StoreError::validation(format!("'{operator}' expects a document of fields"))
        })?;
        match operator.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(document, path, value.clone())?;
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    unset_path(document, path);
                }
            }
            "$inc" => {
                for (path, delta) in fields {
                    let current = lookup(document, path).cloned().unwrap_or(Bson::Int32(0));
                    let next = increment(&current, delta, path)?;
                    set_path(document, path, next)?;
                }
            }
            other => {
                return Err(StoreError::validation(format!(
                    "unsupported update operator '{other}'"
                )));
            }
        }
    }
    Ok(())
}

fn increment(current: &Bson, delta: &Bson, path: &str) -> StoreResult<Bson> {
    let overflow = || StoreError::validation(format!("$inc overflows the value of '{path}'"));
    match (current, delta) {
        (Bson::Int32(a), Bson::Int32(b)) => Ok(a.checked_add(*b).map_or(
            Bson::Int64(i64::from(*a) + i64::from(*b)),
            Bson::Int32,
        )),
        (Bson::Int64(a), Bson::Int32(b)) => a
            .checked_add(i64::from(*b))
            .map(Bson::Int64)
            .ok_or_else(overflow),
        (Bson::Int32(a), Bson::Int64(b)) => i64::from(*a)
            .checked_add(*b)
            .map(Bson::Int64)
            .ok_or_else(overflow),
        (Bson::Int64(a), Bson::Int64(b)) => {
            a.checked_add(*b).map(Bson::Int64).ok_or_else(overflow)
        }
        _ => match (as_number(current), as_number(delta)) {
            (Some(a), Some(b)) => Ok(Bson::Double(a + b)),
            _ => Err(StoreError::validation(format!(
                "cannot increment non-numeric field '{path}'"
            ))),
        },
    }
}

fn set_path(document: &mut BsonDocument, path: &str, value: Bson) -> StoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, BsonDocument::new());
            }
            match document.get_mut(head) {
                Some(Bson::Document(child)) => set_path(child, rest, value),
                _ => Err(StoreError::validation(format!(
                    "cannot set '{path}': '{head}' is not a document"
                ))),
            }
        }
    }
}

fn unset_path(document: &mut BsonDocument, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                unset_path(child, rest);
            }
        }
    }
}
