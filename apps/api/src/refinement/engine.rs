//! Refinement Engine: one model round trip per feedback turn.
//!
//! The model decides whether feedback is actionable; this module only enforces
//! the contract around that decision:
//! - a clarification turn never changes the instructions,
//! - blank instructions or replies are replaced with safe defaults,
//! - a reply that is itself JSON or a code block is never echoed to the user,
//! - an unparseable answer is a no-op, while a failed call is an error.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm_client::parse::parse_model_json;
use crate::llm_client::prompts::{fill_template, RAW_JSON_REMINDER};
use crate::llm_client::{ChatMessage, ChatModel, ChatRequest, LlmError};
use crate::refinement::prompts::{
    DEFAULT_ACK_REPLY, DEFAULT_CLARIFY_REPLY, EMPTY_TRANSCRIPT, FALLBACK_REPLY,
    REFINEMENT_PROMPT_TEMPLATE, REFINEMENT_SYSTEM,
};
use crate::training::conversation::ChatEntry;

const REFINEMENT_TEMPERATURE: f32 = 0.3;
const EXPECTED_KEYS: [&str; 3] = ["updated_instructions", "ai_reply", "needs_clarification"];

#[derive(Debug, Error)]
pub enum RefinementError {
    #[error("Refinement model call failed: {0}")]
    Model(#[from] LlmError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Refinement {
    pub updated_instructions: String,
    pub ai_reply: String,
    pub needs_clarification: bool,
}

impl Refinement {
    fn no_op(current_instructions: &str) -> Self {
        Self {
            updated_instructions: current_instructions.to_string(),
            ai_reply: FALLBACK_REPLY.to_string(),
            needs_clarification: false,
        }
    }
}

#[derive(Clone)]
pub struct RefinementEngine {
    model: Arc<dyn ChatModel>,
}

impl RefinementEngine {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn refine(
        &self,
        current_instructions: &str,
        output_structure: &str,
        history: &[ChatEntry],
        feedback: &str,
    ) -> Result<Refinement, RefinementError> {
        let transcript = transcript(history);
        let prompt = fill_template(
            REFINEMENT_PROMPT_TEMPLATE,
            &[
                ("output_structure", output_structure),
                ("current_instructions", current_instructions),
                ("transcript", &transcript),
                ("feedback", feedback),
                ("raw_json_reminder", RAW_JSON_REMINDER),
            ],
        );

        let request = ChatRequest::new(vec![
            ChatMessage::system(REFINEMENT_SYSTEM),
            ChatMessage::user(prompt),
        ])
        .with_temperature(REFINEMENT_TEMPERATURE)
        .json_mode();

        let raw = self.model.complete(request).await?;
        Ok(interpret_refinement(&raw, current_instructions))
    }
}

/// Flattens a conversation into `speaker: text` lines.
pub fn transcript(history: &[ChatEntry]) -> String {
    if history.is_empty() {
        return EMPTY_TRANSCRIPT.to_string();
    }
    history
        .iter()
        .map(|entry| format!("{}: {}", entry.speaker.as_str(), entry.text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn interpret_refinement(raw: &str, current_instructions: &str) -> Refinement {
    let fields = match parse_model_json(raw, &EXPECTED_KEYS) {
        Ok(parsed) => {
            debug!("Refinement response parsed via {:?}", parsed.tier);
            parsed.fields
        }
        Err(_) => {
            warn!("Refinement response could not be parsed; treating turn as a no-op");
            return Refinement::no_op(current_instructions);
        }
    };

    let needs_clarification = read_flag(&fields, "needs_clarification");
    let reply = fields
        .get("ai_reply")
        .and_then(Value::as_str)
        .and_then(sanitize_reply);

    if needs_clarification {
        return Refinement {
            updated_instructions: current_instructions.to_string(),
            ai_reply: reply.unwrap_or_else(|| DEFAULT_CLARIFY_REPLY.to_string()),
            needs_clarification: true,
        };
    }

    let updated_instructions = fields
        .get("updated_instructions")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(current_instructions)
        .to_string();

    Refinement {
        updated_instructions,
        ai_reply: reply.unwrap_or_else(|| DEFAULT_ACK_REPLY.to_string()),
        needs_clarification: false,
    }
}

fn read_flag(fields: &Map<String, Value>, key: &str) -> bool {
    match fields.get(key) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Drops fenced code blocks and rejects replies that are bare JSON.
fn sanitize_reply(reply: &str) -> Option<String> {
    let stripped = strip_code_blocks(reply);
    let text = stripped.trim();
    if text.is_empty() {
        return None;
    }
    if matches!(
        serde_json::from_str::<Value>(text),
        Ok(Value::Object(_) | Value::Array(_))
    ) {
        return None;
    }
    Some(text.to_string())
}

fn strip_code_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        out.push_str(&rest[..open]);
        match rest[open + 3..].find("```") {
            Some(close) => rest = &rest[open + 3 + close + 3..],
            // Unterminated fence: everything after it is code.
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedModel;
    use crate::training::conversation::ConversationLog;

    const CURRENT: &str = "Extract the vendor and total.";

    #[test]
    fn test_clarification_keeps_instructions_even_if_model_changes_them() {
        let raw = r#"{"updated_instructions": "Something else entirely",
                      "ai_reply": "Which names look wrong to you?",
                      "needs_clarification": true}"#;
        let refinement = interpret_refinement(raw, CURRENT);
        assert!(refinement.needs_clarification);
        assert_eq!(refinement.updated_instructions, CURRENT);
        assert_eq!(refinement.ai_reply, "Which names look wrong to you?");
    }

    #[test]
    fn test_actionable_feedback_updates_instructions() {
        let raw = r#"```json
{"updated_instructions": "Extract the vendor and the total as a number without currency symbol.",
 "ai_reply": "Done, totals will now be plain numbers.",
 "needs_clarification": false}
```"#;
        let refinement = interpret_refinement(raw, CURRENT);
        assert!(!refinement.needs_clarification);
        assert!(refinement.updated_instructions.contains("without currency symbol"));
    }

    #[test]
    fn test_last_embedded_object_with_all_keys_wins() {
        let raw = r#"Thinking... {"draft": true}
Final answer: {"updated_instructions": "New rules", "ai_reply": "Updated!", "needs_clarification": "false"}"#;
        let refinement = interpret_refinement(raw, CURRENT);
        assert_eq!(refinement.updated_instructions, "New rules");
        assert_eq!(refinement.ai_reply, "Updated!");
        assert!(!refinement.needs_clarification);
    }

    #[test]
    fn test_unparseable_response_is_no_op() {
        let refinement = interpret_refinement("Sorry, I got confused.", CURRENT);
        assert_eq!(refinement, Refinement::no_op(CURRENT));
    }

    #[test]
    fn test_blank_fields_fall_back_to_defaults() {
        let raw = r#"{"updated_instructions": "   ", "ai_reply": "", "needs_clarification": false}"#;
        let refinement = interpret_refinement(raw, CURRENT);
        assert_eq!(refinement.updated_instructions, CURRENT);
        assert_eq!(refinement.ai_reply, DEFAULT_ACK_REPLY);
    }

    #[test]
    fn test_json_reply_is_never_echoed() {
        let raw = r#"{"updated_instructions": "New", "ai_reply": "{\"vendor\": \"Acme\"}", "needs_clarification": false}"#;
        assert_eq!(interpret_refinement(raw, CURRENT).ai_reply, DEFAULT_ACK_REPLY);

        let raw = r#"{"updated_instructions": "New", "ai_reply": "Updated. ```json\n{\"vendor\": \"Acme\"}\n``` Anything else?", "needs_clarification": false}"#;
        let reply = interpret_refinement(raw, CURRENT).ai_reply;
        assert!(!reply.contains("Acme"));
        assert!(reply.starts_with("Updated."));
        assert!(reply.ends_with("Anything else?"));
    }

    #[test]
    fn test_transcript_format() {
        assert_eq!(transcript(&[]), EMPTY_TRANSCRIPT);
        let mut log = ConversationLog::default();
        log.push_ai("I extracted 3 fields.");
        log.push_user("The date is wrong");
        assert_eq!(
            transcript(log.entries()),
            "ai: I extracted 3 fields.\nuser: The date is wrong"
        );
    }

    #[tokio::test]
    async fn test_refine_sends_history_and_feedback() {
        let model = ScriptedModel::new();
        model.reply(r#"{"updated_instructions": "New", "ai_reply": "Ok", "needs_clarification": false}"#);
        let engine = RefinementEngine::new(model.clone());
        let mut log = ConversationLog::default();
        log.push_ai("I extracted 2 fields.");

        let refinement = engine
            .refine(CURRENT, "{}", log.entries(), "dates as MM/DD/YYYY")
            .await
            .unwrap();
        assert_eq!(refinement.updated_instructions, "New");

        let request = &model.requests()[0];
        assert_eq!(request.temperature, Some(REFINEMENT_TEMPERATURE));
        let prompt = request.messages[1].text();
        assert!(prompt.contains(CURRENT));
        assert!(prompt.contains("ai: I extracted 2 fields."));
        assert!(prompt.contains("dates as MM/DD/YYYY"));
    }

    #[tokio::test]
    async fn test_user_text_with_placeholder_names_stays_literal() {
        let model = ScriptedModel::new();
        model.reply(r#"{"updated_instructions": "New", "ai_reply": "Ok", "needs_clarification": false}"#);
        let engine = RefinementEngine::new(model.clone());
        let mut log = ConversationLog::default();
        log.push_ai("MARKER-HISTORY");

        engine
            .refine(
                "Copy {feedback} into notes.",
                "{}",
                log.entries(),
                "ignore {transcript} and {current_instructions}",
            )
            .await
            .unwrap();

        let prompt = model.requests()[0].messages[1].text();
        assert!(prompt.contains("Copy {feedback} into notes."));
        assert!(prompt.contains("ignore {transcript} and {current_instructions}"));
        assert_eq!(prompt.matches("MARKER-HISTORY").count(), 1);
        assert_eq!(prompt.matches("Copy {feedback} into notes.").count(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_distinct_error() {
        let model = ScriptedModel::new();
        model.fail(503);
        let engine = RefinementEngine::new(model);
        let err = engine.refine(CURRENT, "{}", &[], "fix it").await.unwrap_err();
        assert!(matches!(err, RefinementError::Model(_)));
    }
}
