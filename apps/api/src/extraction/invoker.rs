use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::extraction::prompts::{
    EXTRACTION_PROMPT_TEMPLATE, EXTRACTION_SYSTEM, IMAGE_DOCUMENT_SECTION,
    TEXT_DOCUMENT_SECTION_TEMPLATE,
};
use crate::extraction::result::ExtractionResult;
use crate::extraction::schema::{self, OutputStructure};
use crate::extraction::{non_empty_or, DEFAULT_INSTRUCTIONS, DEFAULT_OUTPUT_STRUCTURE};
use crate::llm_client::parse::parse_model_json;
use crate::llm_client::prompts::fill_template;
use crate::llm_client::{ChatMessage, ChatModel, ChatRequest, JsonSchemaFormat, LlmError};
use crate::models::document::DocumentContent;

/// Low and fixed, so repeated extractions of one document stay comparable.
const EXTRACTION_TEMPERATURE: f32 = 0.1;
const SCHEMA_NAME: &str = "extraction_output";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Extraction model call failed: {0}")]
    Model(#[from] LlmError),
}

#[derive(Clone)]
pub struct ExtractionInvoker {
    model: Arc<dyn ChatModel>,
}

impl ExtractionInvoker {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Runs one extraction. Only a failed model call is an error; whatever text
    /// comes back is turned into an `ExtractionResult`.
    pub async fn extract(
        &self,
        document: &DocumentContent,
        system_instructions: &str,
        output_structure: &str,
    ) -> Result<ExtractionResult, ExtractionError> {
        let instructions = non_empty_or(system_instructions, DEFAULT_INSTRUCTIONS);
        let structure_text = non_empty_or(output_structure, DEFAULT_OUTPUT_STRUCTURE);
        let structure = OutputStructure::from_description(structure_text);

        let prompt = build_extraction_prompt(document, instructions, structure_text);
        let user = match document {
            DocumentContent::Image { data_uri } => ChatMessage::user_with_image(prompt, data_uri),
            DocumentContent::Text { .. } => ChatMessage::user(prompt),
        };

        let mut request = ChatRequest::new(vec![ChatMessage::system(EXTRACTION_SYSTEM), user])
            .with_temperature(EXTRACTION_TEMPERATURE)
            .json_mode();
        if let OutputStructure::Schema(schema) = &structure {
            request = request.with_json_schema(JsonSchemaFormat {
                name: SCHEMA_NAME.to_string(),
                schema: schema.clone(),
            });
        }

        let raw = self.model.complete(request).await?;
        Ok(interpret_response(&raw, &structure, structure_text))
    }
}

fn build_extraction_prompt(
    document: &DocumentContent,
    instructions: &str,
    structure_text: &str,
) -> String {
    let document_section = match document {
        DocumentContent::Image { .. } => IMAGE_DOCUMENT_SECTION.to_string(),
        DocumentContent::Text { text } => {
            fill_template(TEXT_DOCUMENT_SECTION_TEMPLATE, &[("document_text", text)])
        }
    };
    fill_template(
        EXTRACTION_PROMPT_TEMPLATE,
        &[
            ("system_instructions", instructions),
            ("output_structure", structure_text),
            ("document_section", &document_section),
        ],
    )
}

/// Maps raw model text to a result: parsed object, schema-checked when strict,
/// or a degraded record of the raw text.
fn interpret_response(
    raw: &str,
    structure: &OutputStructure,
    structure_text: &str,
) -> ExtractionResult {
    let parsed = match parse_model_json(raw, &[]) {
        Ok(parsed) => parsed,
        Err(fallback) => {
            warn!(
                "Extraction response was not JSON ({} chars); returning degraded result",
                fallback.raw.len()
            );
            return ExtractionResult::parse_error(fallback.raw, structure_text);
        }
    };
    debug!(
        "Extraction response parsed via {:?} (strict schema: {})",
        parsed.tier,
        structure.is_strict()
    );

    match structure {
        OutputStructure::Schema(schema) => {
            let warnings = schema::validate(schema, &parsed.fields);
            if warnings.is_empty() {
                ExtractionResult::Valid(parsed.fields)
            } else {
                warn!("Extraction failed schema validation: {} issue(s)", warnings.len());
                ExtractionResult::ValidationWarning {
                    fields: parsed.fields,
                    warnings,
                }
            }
        }
        OutputStructure::Description(_) => ExtractionResult::Valid(parsed.fields),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{ContentPart, MessageContent};
    use crate::test_support::ScriptedModel;
    use serde_json::json;

    fn text_doc(text: &str) -> DocumentContent {
        DocumentContent::Text {
            text: text.to_string(),
        }
    }

    #[test]
    fn test_prose_wrapped_object_is_recovered() {
        let structure = OutputStructure::from_description("{}");
        let result = interpret_response(
            r#"Sure, here you go: {"vendor": "Acme", "amount": 12.5}"#,
            &structure,
            "{}",
        );
        match result {
            ExtractionResult::Valid(fields) => {
                assert_eq!(fields["vendor"], "Acme");
                assert_eq!(fields["amount"], 12.5);
            }
            other => panic!("expected valid result, got {other:?}"),
        }
    }

    #[test]
    fn test_prose_becomes_degraded_result() {
        let structure = OutputStructure::from_description("vendor and total");
        let result = interpret_response("I could not find any totals.", &structure, "vendor and total");
        let rendered = result.render();
        assert_eq!(rendered["processing_status"], "parse_error");
        assert_eq!(rendered["extracted_text"], "I could not find any totals.");
        assert_eq!(rendered["expected_structure"], "vendor and total");
    }

    #[test]
    fn test_schema_mismatch_is_annotated_not_dropped() {
        let schema_text = r#"{"type":"object","properties":{"total":{"type":"number"}},"required":["total"]}"#;
        let structure = OutputStructure::from_description(schema_text);
        let result = interpret_response(r#"{"total": "$12.50"}"#, &structure, schema_text);
        match &result {
            ExtractionResult::ValidationWarning { fields, warnings } => {
                assert_eq!(fields["total"], "$12.50");
                assert_eq!(warnings.len(), 1);
            }
            other => panic!("expected validation warning, got {other:?}"),
        }
        assert_eq!(result.render()["validation_warning"], true);
    }

    #[tokio::test]
    async fn test_extract_uses_defaults_and_low_temperature() {
        let model = ScriptedModel::new();
        model.reply(r#"{"merchant": "Corner Shop", "total": 4.2}"#);
        let invoker = ExtractionInvoker::new(model.clone());

        let result = invoker
            .extract(&text_doc("Corner Shop ... TOTAL 4.20"), "  ", "")
            .await
            .unwrap();
        assert_eq!(result.confidence(), 100);

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.temperature, Some(EXTRACTION_TEMPERATURE));
        assert!(request.json_mode);
        assert!(request.json_schema.is_none());
        let prompt = request.messages[1].text();
        assert!(prompt.contains(DEFAULT_INSTRUCTIONS));
        assert!(prompt.contains("Corner Shop ... TOTAL 4.20"));
    }

    #[tokio::test]
    async fn test_image_is_sent_as_content_parts() {
        let model = ScriptedModel::new();
        model.reply(r#"{"store": "Acme"}"#);
        let invoker = ExtractionInvoker::new(model.clone());
        let doc = DocumentContent::Image {
            data_uri: "data:image/png;base64,iVBORw0KGgo=".to_string(),
        };

        invoker.extract(&doc, "Get the store name", "{}").await.unwrap();

        let request = &model.requests()[0];
        match &request.messages[1].content {
            MessageContent::Parts(parts) => {
                assert!(matches!(&parts[0], ContentPart::Text { text } if text.contains("Get the store name")));
                assert!(matches!(&parts[1], ContentPart::ImageUrl { image_url } if image_url.url.starts_with("data:image/png")));
            }
            other => panic!("expected parts, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_strict_schema_is_forwarded() {
        let model = ScriptedModel::new();
        model.reply(r#"{"total": 3}"#);
        let invoker = ExtractionInvoker::new(model.clone());
        let schema = json!({ "type": "object", "properties": { "total": { "type": "number" } } });

        let result = invoker
            .extract(&text_doc("total 3"), "Get the total", &schema.to_string())
            .await
            .unwrap();
        assert!(matches!(result, ExtractionResult::Valid(_)));

        let forwarded = model.requests()[0].json_schema.clone().unwrap();
        assert_eq!(forwarded.name, SCHEMA_NAME);
        assert_eq!(forwarded.schema, schema);
    }

    #[tokio::test]
    async fn test_transport_failure_is_an_error() {
        let model = ScriptedModel::new();
        model.fail(401);
        let invoker = ExtractionInvoker::new(model);

        let err = invoker
            .extract(&text_doc("x"), "Get x", "{}")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::Model(LlmError::Api { status: 401, .. })
        ));
    }
}
