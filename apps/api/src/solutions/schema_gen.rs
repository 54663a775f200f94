//! Output-structure generation: a plain-language field list becomes a JSON Schema.
//!
//! When the model answers with something that is not a schema object, its
//! text is kept as a free-form structure description so the caller still gets
//! something usable.

use serde::Serialize;
use tracing::{info, warn};

use crate::llm_client::parse::{parse_model_json, strip_json_fences};
use crate::llm_client::prompts::{fill_template, RAW_JSON_REMINDER};
use crate::llm_client::{ChatMessage, ChatModel, ChatRequest, LlmError};
use crate::solutions::prompts::{OUTPUT_SCHEMA_PROMPT_TEMPLATE, OUTPUT_SCHEMA_SYSTEM};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedStructure {
    /// Ready to store as a solution's `model_output_structure`.
    pub output_structure: String,
    /// False when the model's answer was kept as a plain description.
    pub is_schema: bool,
}

pub async fn generate_output_structure(
    model: &dyn ChatModel,
    description: &str,
) -> Result<GeneratedStructure, LlmError> {
    let prompt = fill_template(
        OUTPUT_SCHEMA_PROMPT_TEMPLATE,
        &[
            ("description", description.trim()),
            ("raw_json_reminder", RAW_JSON_REMINDER),
        ],
    );

    let request = ChatRequest::new(vec![
        ChatMessage::system(OUTPUT_SCHEMA_SYSTEM),
        ChatMessage::user(prompt),
    ])
    .with_temperature(0.2)
    .json_mode();

    let raw = model.complete(request).await?;
    Ok(interpret_structure(&raw))
}

fn interpret_structure(raw: &str) -> GeneratedStructure {
    match parse_model_json(raw, &["properties"]) {
        Ok(parsed) => {
            let mut schema = parsed.fields;
            schema
                .entry("type")
                .or_insert_with(|| serde_json::Value::String("object".to_string()));
            info!(
                "Generated output schema with {} properties ({:?})",
                schema
                    .get("properties")
                    .and_then(|p| p.as_object())
                    .map_or(0, |p| p.len()),
                parsed.tier
            );
            GeneratedStructure {
                output_structure: serde_json::Value::Object(schema).to_string(),
                is_schema: true,
            }
        }
        Err(fallback) => {
            warn!("Model did not return a schema object; keeping its answer as a description");
            GeneratedStructure {
                output_structure: strip_json_fences(&fallback.raw).trim().to_string(),
                is_schema: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::schema::OutputStructure;
    use crate::test_support::ScriptedModel;

    #[tokio::test]
    async fn test_schema_reply_becomes_strict_structure() {
        let model = ScriptedModel::new();
        model.reply(
            r#"```json
{"type": "object", "properties": {"vendor_name": {"type": "string"}, "total_amount": {"type": "number"}}}
```"#,
        );

        let generated = generate_output_structure(model.as_ref(), "vendor name and total amount")
            .await
            .unwrap();

        assert!(generated.is_schema);
        assert!(OutputStructure::from_description(&generated.output_structure).is_strict());

        let requests = model.requests();
        assert!(requests[0].messages[1]
            .text()
            .contains("\"vendor name and total amount\""));
    }

    #[test]
    fn test_missing_type_is_filled_in() {
        let generated = interpret_structure(r#"{"properties": {"age": {"type": "integer"}}}"#);
        let value: serde_json::Value = serde_json::from_str(&generated.output_structure).unwrap();
        assert_eq!(value["type"], "object");
    }

    #[test]
    fn test_prose_reply_is_kept_as_description() {
        let generated = interpret_structure("```\nname: string, age: number\n```");
        assert!(!generated.is_schema);
        assert_eq!(generated.output_structure, "name: string, age: number");
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let model = ScriptedModel::new();
        model.fail(500);
        assert!(generate_output_structure(model.as_ref(), "anything").await.is_err());
    }
}
