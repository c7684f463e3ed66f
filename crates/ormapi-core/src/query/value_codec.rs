//! Value codec between store rows and semantic property values.
//!
//! Stores hand back loosely typed cells: SQLite keeps booleans as integers
//! and arrays/objects as JSON text. Decoding restores the value the
//! property's semantic type promises; encoding does the reverse for writes.

use crate::catalog::SemanticType;
use crate::error::Error;
use ormapi_proto::Value;

/// Decode a stored cell for a property of the given type.
pub fn decode_value(semantic_type: SemanticType, raw: Value) -> Result<Value, Error> {
    match (semantic_type, raw) {
        (_, Value::Null) => Ok(Value::Null),
        (SemanticType::Boolean, Value::Int(i)) => Ok(Value::Bool(i != 0)),
        (SemanticType::Boolean, Value::String(s)) => Ok(Value::Bool(matches!(
            s.as_str(),
            "1" | "true" | "t"
        ))),
        (SemanticType::Array | SemanticType::Object, Value::String(text)) => {
            let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                Error::Serialization(format!("stored value is not valid JSON: {}", e))
            })?;
            Ok(Value::from(json))
        }
        (SemanticType::String | SemanticType::Date, Value::Int(i)) => {
            Ok(Value::String(i.to_string()))
        }
        (_, value) => Ok(value),
    }
}

/// Encode a semantic value for storage.
///
/// Identity for every type the store understands natively; the store layer
/// turns arrays, objects and booleans into its own representation.
pub fn encode_value(semantic_type: SemanticType, value: Value) -> Result<Value, String> {
    semantic_type.coerce(value)
}
