// LLM prompt constants for the Extraction module.

/// System prompt for document extraction.
pub const EXTRACTION_SYSTEM: &str = "You are a precise document extraction assistant. \
    You read one document and return the requested information as a single JSON object. \
    Follow the user's extraction instructions exactly. \
    If a field cannot be found in the document, use null rather than guessing.";

/// Extraction prompt template.
/// Replace: {system_instructions}, {output_structure}, {document_section}
pub const EXTRACTION_PROMPT_TEMPLATE: &str = r#"EXTRACTION INSTRUCTIONS:
{system_instructions}

OUTPUT STRUCTURE:
{output_structure}

Return a JSON object that follows the output structure above. When the output
structure is empty ("{}"), choose clear snake_case field names for the
information the instructions ask for.

{document_section}"#;

/// Document section for image documents; the image follows as a separate content part.
pub const IMAGE_DOCUMENT_SECTION: &str = "The document is attached as an image.";

/// Document section for text documents. Replace: {document_text}
pub const TEXT_DOCUMENT_SECTION_TEMPLATE: &str = "DOCUMENT CONTENT:\n{document_text}";
