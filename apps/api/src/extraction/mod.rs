// Extraction: turns a document plus the solution's instructions into structured output.
// All model calls go through llm_client::ChatModel.

pub mod confidence;
pub mod invoker;
pub mod prompts;
pub mod result;
pub mod schema;

pub use invoker::{ExtractionError, ExtractionInvoker};
pub use result::{ExtractionResult, ScoredExtraction};

/// Used whenever a solution has no instructions yet.
pub const DEFAULT_INSTRUCTIONS: &str = "Extract information from this document.";

/// Used whenever a solution has no output structure yet.
pub const DEFAULT_OUTPUT_STRUCTURE: &str = "{}";

/// `value` unless it is blank, else `fallback`.
pub fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}
