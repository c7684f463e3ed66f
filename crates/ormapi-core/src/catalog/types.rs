//! Semantic property types and primary key kinds.

use ormapi_proto::Value;
use serde::{Deserialize, Serialize};

/// Semantic type of a scalar property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    /// UTF-8 text.
    String,
    /// Integer or floating point number.
    Number,
    /// Boolean flag.
    Boolean,
    /// Date/time, carried as ISO-8601 text.
    Date,
    /// Array of scalars.
    Array,
    /// Free-form JSON object.
    Object,
}

impl SemanticType {
    /// Check if values of this type are stored as JSON text.
    pub fn is_json(&self) -> bool {
        matches!(self, SemanticType::Array | SemanticType::Object)
    }

    /// Coerce a literal to this type.
    ///
    /// Query strings carry every literal as text, so numbers and booleans are
    /// parsed here. `Null` passes through; nullability is checked by callers.
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (SemanticType::String, Value::String(s)) => Ok(Value::String(s)),
            (SemanticType::String, v @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) => {
                Ok(Value::String(v.to_id_string()))
            }
            (SemanticType::Date, Value::String(s)) => Ok(Value::String(s)),
            (SemanticType::Number, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
            (SemanticType::Number, Value::String(s)) => {
                let trimmed = s.trim();
                if let Ok(i) = trimmed.parse::<i64>() {
                    Ok(Value::Int(i))
                } else if let Ok(f) = trimmed.parse::<f64>() {
                    Ok(Value::Float(f))
                } else {
                    Err(format!("'{}' is not a number", s))
                }
            }
            (SemanticType::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
            (SemanticType::Boolean, Value::Int(i)) if i == 0 || i == 1 => Ok(Value::Bool(i == 1)),
            (SemanticType::Boolean, Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                _ => Err(format!("'{}' is not a boolean", s)),
            },
            (SemanticType::Array, v @ Value::Array(_)) => Ok(v),
            (SemanticType::Object, v @ Value::Object(_)) => Ok(v),
            (ty, v) => Err(format!("expected {:?}, got {}", ty, v.to_json_string()).to_lowercase()),
        }
    }
}

/// How primary key values are produced and parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Store-generated integer key.
    Integer,
    /// UUID text, generated by the engine when the caller supplies none.
    Uuid,
    /// Caller-supplied text key.
    String,
}

impl KeyType {
    /// Parse an identifier received as text. Returns `None` when the text
    /// cannot be a key of this type.
    pub fn parse_id(&self, raw: &str) -> Option<Value> {
        match self {
            KeyType::Integer => raw.trim().parse::<i64>().ok().map(Value::Int),
            KeyType::Uuid => uuid::Uuid::parse_str(raw)
                .ok()
                .map(|u| Value::String(u.hyphenated().to_string())),
            KeyType::String => Some(Value::String(raw.to_string())),
        }
    }

    /// Generate a fresh key, when this type is engine-generated.
    pub fn generate(&self) -> Option<Value> {
        match self {
            KeyType::Uuid => Some(Value::String(uuid::Uuid::new_v4().to_string())),
            _ => None,
        }
    }
}
