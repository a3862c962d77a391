use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// Name of the identifier field in backend record objects.
pub const KEY_FIELD: &str = "key";

/// One backend record: its key plus every other field of the wire object.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: u64,
    pub attributes: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(key: u64, attributes: BTreeMap<String, Value>) -> Self {
        Self { key, attributes }
    }

    /// Decodes a flat wire object (`{"key": 17, "country": "US", ...}`).
    pub fn from_wire(value: Value) -> Result<Self, String> {
        let Value::Object(object) = value else {
            return Err(format!("record must be a JSON object, got {}", kind_name(&value)));
        };
        Self::from_object(object)
    }

    fn from_object(mut object: Map<String, Value>) -> Result<Self, String> {
        let key = match object.remove(KEY_FIELD) {
            Some(Value::Number(number)) => number
                .as_u64()
                .ok_or_else(|| format!("record key must be a non-negative integer, got {number}"))?,
            Some(other) => {
                return Err(format!(
                    "record key must be a number, got {}",
                    kind_name(&other)
                ))
            }
            None => return Err("record is missing the 'key' field".to_string()),
        };

        Ok(Self {
            key,
            attributes: object.into_iter().collect(),
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
