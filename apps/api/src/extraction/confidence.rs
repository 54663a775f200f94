use serde_json::{Map, Value};

/// Completeness heuristic in [0, 100]: the share of fields whose value is neither
/// null nor the empty string. Non-objects and empty objects score 0.
pub fn score(value: &Value) -> u8 {
    match value {
        Value::Object(fields) => score_fields(fields),
        _ => 0,
    }
}

pub fn score_fields(fields: &Map<String, Value>) -> u8 {
    let total = fields.len();
    if total == 0 {
        return 0;
    }
    let filled = fields.values().filter(|v| !is_empty(v)).count();
    ((filled as f64 / total as f64) * 100.0).round() as u8
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
