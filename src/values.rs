//! Key-value access across a collection.
//!
//! `collection_value_for_key` returns one value per element.
//! `collection_value_for_key_path` also understands dotted paths and the
//! collection operators `@count`, `@sum.<p>`, `@avg.<p>`, `@min.<p>` and
//! `@max.<p>`.

use crate::collection::LiveCollection;
use crate::error::{BridgeError, Result};
use crate::types::{ClassInfo, Object, Property};
use serde_json::Value;
use std::cmp::Ordering;

/// Resolve a dotted key path on one object. Missing components yield `Null`.
pub fn lookup_key_path<O: Object>(object: &O, path: &str) -> Value {
    let mut components = path.split('.');
    let Some(first) = components.next() else {
        return Value::Null;
    };

    let mut value = object.value_for_key(first).unwrap_or(Value::Null);
    for component in components {
        value = match value {
            Value::Object(mut map) => map.remove(component).unwrap_or(Value::Null),
            _ => return Value::Null,
        };
    }
    value
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string, arrays and
/// objects compare equal among themselves.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn property<'a>(info: &'a ClassInfo, key: &str) -> Result<&'a Property> {
    info.property(key).ok_or_else(|| BridgeError::InvalidKey {
        class: info.name.clone(),
        key: key.to_string(),
    })
}

/// The value of `key` for every element, in collection order.
pub fn collection_value_for_key<C: LiveCollection>(
    collection: &C,
    key: &str,
    info: &ClassInfo,
) -> Result<Vec<Value>> {
    property(info, key)?;
    let snapshot = collection.snapshot()?;
    Ok(snapshot
        .iter()
        .map(|object| object.value_for_key(key).unwrap_or(Value::Null))
        .collect())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Aggregate {
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "@sum" => Some(Aggregate::Sum),
            "@avg" => Some(Aggregate::Avg),
            "@min" => Some(Aggregate::Min),
            "@max" => Some(Aggregate::Max),
            _ => None,
        }
    }
}

/// Evaluate a key path against the whole collection.
///
/// Plain paths return an array with one value per element; operator paths
/// return a single aggregate value. Null values are ignored by aggregates,
/// and `@avg`/`@min`/`@max` of nothing is `Null`.
pub fn collection_value_for_key_path<C: LiveCollection>(
    collection: &C,
    path: &str,
    info: &ClassInfo,
) -> Result<Value> {
    if path == "@count" {
        return Ok(Value::from(collection.count()?));
    }

    if !path.starts_with('@') {
        let first = path.split('.').next().unwrap_or_default();
        property(info, first)?;
        let snapshot = collection.snapshot()?;
        return Ok(Value::Array(
            snapshot
                .iter()
                .map(|object| lookup_key_path(object, path))
                .collect(),
        ));
    }

    let (operator, property_path) = path
        .split_once('.')
        .ok_or_else(|| BridgeError::InvalidKeyPath(format!("'{path}': missing property")))?;
    let aggregate = Aggregate::parse(operator).ok_or_else(|| {
        BridgeError::InvalidKeyPath(format!("'{path}': unsupported operator '{operator}'"))
    })?;

    let first = property_path.split('.').next().unwrap_or_default();
    let kind = property(info, first)?.kind;
    let nested = property_path.contains('.');
    match aggregate {
        Aggregate::Sum | Aggregate::Avg if !nested && !kind.is_numeric() => {
            return Err(BridgeError::InvalidKeyPath(format!(
                "'{path}': {operator} requires a numeric property, '{first}' is {kind:?}"
            )));
        }
        Aggregate::Min | Aggregate::Max if !nested && !kind.is_sortable() => {
            return Err(BridgeError::InvalidKeyPath(format!(
                "'{path}': {operator} requires a sortable property, '{first}' is {kind:?}"
            )));
        }
        _ => {}
    }

    let snapshot = collection.snapshot()?;
    let values: Vec<Value> = snapshot
        .iter()
        .map(|object| lookup_key_path(object, property_path))
        .filter(|value| !value.is_null())
        .collect();

    Ok(aggregate_values(aggregate, &values))
}

fn aggregate_values(aggregate: Aggregate, values: &[Value]) -> Value {
    match aggregate {
        Aggregate::Sum => {
            // stays integral only while every value is an integer and the sum fits
            let integral = values
                .iter()
                .try_fold(0i64, |sum, value| value.as_i64().and_then(|n| sum.checked_add(n)));
            match integral {
                Some(sum) => Value::from(sum),
                None => Value::from(values.iter().filter_map(Value::as_f64).sum::<f64>()),
            }
        }
        Aggregate::Avg => {
            let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::from(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        Aggregate::Min => values
            .iter()
            .min_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or(Value::Null),
        Aggregate::Max => values
            .iter()
            .max_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DynamicObject;
    use serde_json::json;

    #[test]
    fn test_lookup_nested_path() {
        let object = DynamicObject::from_json(1, json!({"address": {"city": "Oslo"}}));
        assert_eq!(lookup_key_path(&object, "address.city"), json!("Oslo"));
        assert_eq!(lookup_key_path(&object, "address.zip"), Value::Null);
        assert_eq!(lookup_key_path(&object, "name.first"), Value::Null);
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values(&json!(1), &json!(2)), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&Value::Null, &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!(true), &json!(0)), Ordering::Less);
    }

    #[test]
    fn test_aggregates() {
        let values = vec![json!(3), json!(1), json!(2)];
        assert_eq!(aggregate_values(Aggregate::Sum, &values), json!(6));
        assert_eq!(aggregate_values(Aggregate::Avg, &values), json!(2.0));
        assert_eq!(aggregate_values(Aggregate::Min, &values), json!(1));
        assert_eq!(aggregate_values(Aggregate::Max, &values), json!(3));

        let mixed = vec![json!(1), json!(0.5)];
        assert_eq!(aggregate_values(Aggregate::Sum, &mixed), json!(1.5));
        assert_eq!(aggregate_values(Aggregate::Avg, &[]), Value::Null);
    }

    #[test]
    fn test_sum_overflow_falls_back_to_float() {
        let values = vec![json!(i64::MAX), json!(1)];
        let sum = aggregate_values(Aggregate::Sum, &values);
        assert!(sum.is_f64());
        assert_eq!(sum.as_f64(), Some(i64::MAX as f64 + 1.0));

        let negative = vec![json!(i64::MIN), json!(-1)];
        assert!(aggregate_values(Aggregate::Sum, &negative).is_f64());

        let fits = vec![json!(i64::MAX - 1), json!(1)];
        assert_eq!(aggregate_values(Aggregate::Sum, &fits), json!(i64::MAX));
    }

    #[test]
    fn test_parse_operator() {
        assert_eq!(Aggregate::parse("@sum"), Some(Aggregate::Sum));
        assert_eq!(Aggregate::parse("@median"), None);
    }
}
