//! Attribute matching.
//!
//! Matching is type-sensitive: the string `"1"` never equals the number `1`,
//! and booleans never equal numbers. Numbers compare by numeric value, so
//! `1` equals `1.0`. Arrays compare element-wise in order and objects compare
//! by identical key sets.

use serde_json::{Number, Value};

use crate::record::Record;

/// Attribute that carries a record's product association.
pub const PRODUCT_FIELD: &str = "product";

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCriteria {
    pub name: String,
    pub value: Value,
    pub product: Option<String>,
}

pub fn matches(record: &Record, criteria: &MatchCriteria) -> bool {
    if !in_product_scope(record, criteria.product.as_deref()) {
        return false;
    }

    record
        .attribute(&criteria.name)
        .is_some_and(|value| json_deep_eq(value, &criteria.value))
}

/// Records without a `product` attribute are trusted to be scoped by the
/// backend, which receives the same product as a query parameter.
pub fn in_product_scope(record: &Record, product: Option<&str>) -> bool {
    let Some(product) = product else {
        return true;
    };

    match record.attribute(PRODUCT_FIELD) {
        None => true,
        Some(Value::String(value)) => value == product,
        Some(Value::Array(values)) => values
            .iter()
            .any(|value| value.as_str() == Some(product)),
        Some(_) => false,
    }
}

/// Retains the records of one page that satisfy `criteria`, in page order.
pub fn filter_page(records: Vec<Record>, criteria: &MatchCriteria) -> Vec<Record> {
    records
        .into_iter()
        .filter(|record| matches(record, criteria))
        .collect()
}

pub fn json_deep_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => numbers_eq(a, b),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_deep_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| json_deep_eq(x, y)))
        }
        _ => false,
    }
}

fn numbers_eq(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    if a.is_f64() || b.is_f64() {
        return a.as_f64() == b.as_f64();
    }
    // One side is negative, the other above i64::MAX.
    false
}
