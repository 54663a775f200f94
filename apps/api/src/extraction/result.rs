use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::extraction::confidence;

pub const PARSE_ERROR: &str = "parse_error";
const PARSE_ERROR_NOTE: &str =
    "The model response could not be parsed as JSON. The raw response is kept in extracted_text.";

/// Outcome of one extraction call. Malformed or off-schema model output is
/// carried as data, never as an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    /// A JSON object the model returned, accepted as-is.
    Valid(Map<String, Value>),
    /// No JSON object could be recovered from the reply.
    Degraded {
        raw_text: String,
        reason: String,
        expected_structure: String,
    },
    /// An object that failed strict-schema validation, kept with its errors.
    ValidationWarning {
        fields: Map<String, Value>,
        warnings: Vec<String>,
    },
}

impl ExtractionResult {
    pub fn parse_error(raw_text: impl Into<String>, expected_structure: impl Into<String>) -> Self {
        ExtractionResult::Degraded {
            raw_text: raw_text.into(),
            reason: PARSE_ERROR.to_string(),
            expected_structure: expected_structure.into(),
        }
    }

    /// The JSON object shown to users and stored on data items.
    pub fn render(&self) -> Value {
        match self {
            ExtractionResult::Valid(fields) => Value::Object(fields.clone()),
            ExtractionResult::Degraded {
                raw_text,
                reason,
                expected_structure,
            } => json!({
                "extracted_text": raw_text,
                "processing_status": reason,
                "note": PARSE_ERROR_NOTE,
                "expected_structure": expected_structure,
            }),
            ExtractionResult::ValidationWarning { fields, warnings } => {
                let mut rendered = fields.clone();
                rendered.insert("validation_warning".to_string(), Value::Bool(true));
                rendered.insert("validation_errors".to_string(), json!(warnings));
                Value::Object(rendered)
            }
        }
    }

    pub fn confidence(&self) -> u8 {
        match self {
            ExtractionResult::Valid(fields) => confidence::score_fields(fields),
            ExtractionResult::ValidationWarning { fields, .. } => confidence::score_fields(fields),
            ExtractionResult::Degraded { .. } => confidence::score(&self.render()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ExtractionResult::Degraded { .. })
    }

    /// Number of extracted fields; zero when degraded.
    pub fn field_count(&self) -> usize {
        match self {
            ExtractionResult::Valid(fields) => fields.len(),
            ExtractionResult::ValidationWarning { fields, .. } => fields.len(),
            ExtractionResult::Degraded { .. } => 0,
        }
    }
}

impl Serialize for ExtractionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.render().serialize(serializer)
    }
}

/// An extraction paired with its confidence. The only constructor computes both
/// together, so neither can change without the other.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredExtraction {
    result: ExtractionResult,
    confidence: u8,
}

impl ScoredExtraction {
    pub fn new(result: ExtractionResult) -> Self {
        let confidence = result.confidence();
        Self { result, confidence }
    }

    pub fn result(&self) -> &ExtractionResult {
        &self.result
    }

    pub fn confidence(&self) -> u8 {
        self.confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_degraded_renders_status_marker() {
        let result = ExtractionResult::parse_error("I can't read this", "{}");
        let rendered = result.render();
        assert_eq!(rendered["extracted_text"], "I can't read this");
        assert_eq!(rendered["processing_status"], "parse_error");
        assert_eq!(rendered["expected_structure"], "{}");
        assert!(rendered["note"].as_str().is_some());
    }

    #[test]
    fn test_degraded_confidence_scores_rendered_shape() {
        let result = ExtractionResult::parse_error("raw", "{}");
        assert_eq!(result.confidence(), 100);
        let empty = ExtractionResult::parse_error("", "");
        assert_eq!(empty.confidence(), 50);
    }

    #[test]
    fn test_validation_warning_scores_fields_only() {
        let result = ExtractionResult::ValidationWarning {
            fields: fields(json!({ "total": null, "vendor": "Acme" })),
            warnings: vec!["$.total: expected number, got null".to_string()],
        };
        assert_eq!(result.confidence(), 50);
        let rendered = result.render();
        assert_eq!(rendered["validation_warning"], true);
        assert_eq!(rendered["validation_errors"][0], "$.total: expected number, got null");
        assert_eq!(rendered["vendor"], "Acme");
    }

    #[test]
    fn test_scored_extraction_keeps_pair_consistent() {
        let scored = ScoredExtraction::new(ExtractionResult::Valid(fields(
            json!({ "a": 1, "b": "" }),
        )));
        assert_eq!(scored.confidence(), 50);
        let value = serde_json::to_value(&scored).unwrap();
        assert_eq!(value["confidence"], 50);
        assert_eq!(value["result"]["a"], 1);
    }
}
