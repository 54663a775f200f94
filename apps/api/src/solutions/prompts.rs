// Prompt templates for output-structure generation.
// Placeholders: {description}, {raw_json_reminder}

pub const OUTPUT_SCHEMA_SYSTEM: &str = "\
You are a data modelling expert. You turn plain-language descriptions of the \
fields someone wants extracted from documents into clean JSON Schema objects.";

pub const OUTPUT_SCHEMA_PROMPT_TEMPLATE: &str = r#"Convert the user's description of the data they want into a JSON Schema.

Rules:
1. Identify every field the user asks for.
2. Name each property in snake_case.
3. Pick the most fitting type: "string", "number", "integer", "boolean", "array" or "object". Use "string" for dates unless told otherwise.
4. Give every property a "description" quoting the user's words for it.
5. The top level must be {"type": "object", "properties": {...}}.

Example description: "I need the customer's full name, their age as a number, and whether they are a premium member."
Example output:
{"type": "object", "properties": {"customer_full_name": {"type": "string", "description": "the customer's full name"}, "age": {"type": "number", "description": "their age"}, "is_premium_member": {"type": "boolean", "description": "whether they are a premium member"}}}

User description: "{description}"

{raw_json_reminder}"#;
