// Chat lines the orchestrator appends to a document's conversation.

use crate::extraction::{ExtractionResult, ScoredExtraction};

pub const APPROVED_USER: &str = "✅ Approved this output";
pub const APPROVED_AI: &str =
    "Great! I've learned from this example and will apply this understanding to future documents.";

pub const NEEDS_WORK_USER: &str = "❌ This needs improvement";
pub const NEEDS_WORK_AI: &str = "I understand this output needs improvement. \
    Please tell me what I should change or what I missed.";

pub const PROCESSING_FAILED_AI: &str =
    "I had trouble processing this document. Can you help me understand what to extract?";

pub const REPROCESSED_AFTER_FEEDBACK_AI: &str =
    "I've re-processed the document with the updated instructions. Take a look at the new output.";
pub const REPROCESSED_AI: &str =
    "I've re-processed this document with the current instructions.";
pub const REPROCESS_FAILED_AI: &str =
    "I couldn't re-process this document right now, so the previous output is unchanged.";
pub const NO_SOURCE_AI: &str = "I don't have readable content for this document. \
    Please delete it and upload the file again.";

pub const REFINEMENT_FAILED_AI: &str =
    "I had trouble understanding that. Could you try rephrasing your feedback?";

/// First AI message after an extraction lands.
pub fn extraction_summary(scored: &ScoredExtraction) -> String {
    match scored.result() {
        ExtractionResult::Valid(fields) => format!(
            "I've extracted {} field{} from this document with {}% confidence. \
             Review the output and approve it, or tell me what to change.",
            fields.len(),
            if fields.len() == 1 { "" } else { "s" },
            scored.confidence()
        ),
        ExtractionResult::ValidationWarning { fields, warnings } => format!(
            "I've extracted {} fields, but the output breaks the expected structure in {} place{}. \
             Tell me how to fix it, or approve the output as it is.",
            fields.len(),
            warnings.len(),
            if warnings.len() == 1 { "" } else { "s" }
        ),
        ExtractionResult::Degraded { .. } => "I couldn't produce structured output for this \
            document, so I've kept the raw text. Tell me what to extract and I'll try again."
            .to_string(),
    }
}
