//! Output structure handling.
//!
//! A solution's output structure is either a free-text description or, when it
//! parses to something that looks like a JSON Schema, a strict schema. Strict
//! schemas are forwarded to the model and used to validate its answer against
//! the subset of JSON Schema implemented here: `type`, `properties`, `required`,
//! `items`, `enum` and `additionalProperties: false`.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum OutputStructure {
    Description(String),
    Schema(Value),
}

impl OutputStructure {
    pub fn from_description(text: &str) -> Self {
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) if looks_like_schema(&value) => OutputStructure::Schema(value),
            _ => OutputStructure::Description(text.to_string()),
        }
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, OutputStructure::Schema(_))
    }
}

fn looks_like_schema(value: &Value) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    map.get("type").and_then(Value::as_str) == Some("object")
        || map.get("properties").is_some_and(Value::is_object)
}

/// Validates `fields` against `schema`. Returns one message per violation,
/// each prefixed with the JSON path of the offending value (`$.items[0].sku`).
pub fn validate(schema: &Value, fields: &Map<String, Value>) -> Vec<String> {
    let mut errors = Vec::new();
    validate_at(schema, &Value::Object(fields.clone()), "$", &mut errors);
    errors
}

fn validate_at(schema: &Value, value: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(t) => vec![t.as_str()],
            Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| matches_type(t, value)) {
            errors.push(format!(
                "{path}: expected {}, got {}",
                allowed.join(" or "),
                type_name(value)
            ));
            return;
        }
    }

    if let Some(Value::Array(options)) = schema.get("enum") {
        if !options.contains(value) {
            errors.push(format!("{path}: value {value} is not one of the allowed values"));
        }
    }

    match value {
        Value::Object(map) => {
            if let Some(Value::Array(required)) = schema.get("required") {
                for key in required.iter().filter_map(Value::as_str) {
                    if !map.contains_key(key) {
                        errors.push(format!("{path}.{key}: required field is missing"));
                    }
                }
            }
            let properties = schema.get("properties").and_then(Value::as_object);
            if let Some(properties) = properties {
                for (key, sub_schema) in properties {
                    if let Some(child) = map.get(key) {
                        validate_at(sub_schema, child, &format!("{path}.{key}"), errors);
                    }
                }
            }
            if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                for key in map.keys() {
                    if !properties.is_some_and(|p| p.contains_key(key)) {
                        errors.push(format!("{path}.{key}: unexpected field"));
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    validate_at(item_schema, item, &format!("{path}[{i}]"), errors);
                }
            }
        }
        _ => {}
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().is_some_and(|f| f.fract() == 0.0)
        }
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        // Unknown type keywords are not ours to enforce.
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn receipt_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "vendor": { "type": "string" },
                "total": { "type": "number" },
                "currency": { "type": "string", "enum": ["USD", "EUR"] },
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": { "sku": { "type": "string" }, "qty": { "type": "integer" } },
                        "required": ["sku"]
                    }
                }
            },
            "required": ["vendor", "total"]
        })
    }

    #[test]
    fn test_free_text_is_description() {
        let structure = OutputStructure::from_description("vendor name, total amount");
        assert!(!structure.is_strict());
        // Valid JSON without schema markers stays a description too.
        assert!(!OutputStructure::from_description("{}").is_strict());
        assert!(!OutputStructure::from_description("{\"vendor\": \"string\"}").is_strict());
    }

    #[test]
    fn test_schema_detection() {
        assert!(OutputStructure::from_description("{\"type\": \"object\"}").is_strict());
        assert!(
            OutputStructure::from_description("{\"properties\": {\"a\": {}}}").is_strict()
        );
    }

    #[test]
    fn test_valid_object_has_no_errors() {
        let value = fields(json!({
            "vendor": "Acme", "total": 12.5, "currency": "USD",
            "items": [{ "sku": "A1", "qty": 2 }]
        }));
        assert!(validate(&receipt_schema(), &value).is_empty());
    }

    #[test]
    fn test_reports_missing_and_mistyped_fields_with_paths() {
        let value = fields(json!({
            "total": "12.50", "currency": "GBP",
            "items": [{ "qty": 1.5 }]
        }));
        let errors = validate(&receipt_schema(), &value);
        assert!(errors.contains(&"$.vendor: required field is missing".to_string()));
        assert!(errors.contains(&"$.total: expected number, got string".to_string()));
        assert!(errors.iter().any(|e| e.starts_with("$.currency: value")));
        assert!(errors.contains(&"$.items[0].sku: required field is missing".to_string()));
        assert!(errors.contains(&"$.items[0].qty: expected integer, got number".to_string()));
    }

    #[test]
    fn test_union_types_and_additional_properties() {
        let schema = json!({
            "type": "object",
            "properties": { "note": { "type": ["string", "null"] } },
            "additionalProperties": false
        });
        assert!(validate(&schema, &fields(json!({ "note": null }))).is_empty());
        let errors = validate(&schema, &fields(json!({ "note": "x", "extra": 1 })));
        assert_eq!(errors, vec!["$.extra: unexpected field".to_string()]);
    }
}
