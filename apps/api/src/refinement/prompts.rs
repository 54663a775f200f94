// LLM prompt constants for the Refinement module.

/// System prompt for instruction refinement.
pub const REFINEMENT_SYSTEM: &str = "You are an expert prompt engineer helping a user train \
    a document extraction assistant. You rewrite extraction instructions based on the \
    user's feedback, or ask a focused follow-up question when the feedback is too vague \
    to act on.";

/// Refinement prompt template.
/// Replace: {output_structure}, {current_instructions}, {transcript}, {feedback}, {raw_json_reminder}
pub const REFINEMENT_PROMPT_TEMPLATE: &str = r#"EXPECTED OUTPUT STRUCTURE:
{output_structure}

CURRENT EXTRACTION INSTRUCTIONS:
{current_instructions}

CONVERSATION SO FAR:
{transcript}

NEW USER FEEDBACK:
{feedback}

First decide whether the feedback is VAGUE or ACTIONABLE.

VAGUE feedback gives no concrete change to make, for example:
- "Make it better"
- "Fix the names"
- "Add more fields"
For vague feedback set "needs_clarification" to true, return the current
instructions unchanged in "updated_instructions", and ask ONE specific
follow-up question in "ai_reply".

ACTIONABLE feedback names a concrete change, for example:
- "Normalize abbreviations like LRG to LARGE"
- "Extract the date in MM/DD/YYYY format"
- "Focus only on line items, ignore headers"
For actionable feedback set "needs_clarification" to false, write a complete,
self-contained replacement for the instructions in "updated_instructions"
(keep everything from the current instructions that still applies), and
confirm the change in one or two friendly sentences in "ai_reply".

The "ai_reply" is plain conversational text. NEVER repeat, quote or summarize
the extracted JSON in it; the user can already see the output.

Respond with this EXACT JSON shape:
{
  "updated_instructions": "...",
  "ai_reply": "...",
  "needs_clarification": false
}

{raw_json_reminder}"#;

/// Transcript placeholder when a document has no conversation yet.
pub const EMPTY_TRANSCRIPT: &str = "This is the beginning of our conversation.";

/// Reply used when the model's answer could not be parsed.
pub const FALLBACK_REPLY: &str =
    "I understand your feedback and will incorporate it into the instructions.";

/// Reply used when the model returned instructions but no usable reply text.
pub const DEFAULT_ACK_REPLY: &str = "Got it. I've updated the instructions based on your feedback.";

/// Reply used when a clarification turn came back without a usable question.
pub const DEFAULT_CLARIFY_REPLY: &str =
    "Could you tell me more specifically what you would like me to change?";
