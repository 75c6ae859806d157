//! Response schemas in the OpenAPI subset Gemini accepts for structured output.

use serde_json::{Map, Value, json};

pub fn string() -> Value {
    json!({"type": "STRING"})
}

pub fn integer() -> Value {
    json!({"type": "INTEGER"})
}

pub fn nullable_string() -> Value {
    json!({"type": "STRING", "nullable": true})
}

pub fn array(items: Value) -> Value {
    json!({"type": "ARRAY", "items": items})
}

/// An object schema. Properties keep their declaration order through
/// `propertyOrdering`, which Gemini uses to order the generated fields.
pub fn object(properties: &[(&str, Value)], required: &[&str]) -> Value {
    let mut props = Map::new();
    for (name, schema) in properties {
        props.insert((*name).to_string(), schema.clone());
    }
    let ordering: Vec<&str> = properties.iter().map(|(name, _)| *name).collect();
    json!({
        "type": "OBJECT",
        "properties": props,
        "required": required,
        "propertyOrdering": ordering,
    })
}
