// Shared prompt constants.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// Appended to the first system message when JSON output is requested without a schema.
pub const JSON_MODE_SUFFIX: &str = "\n\nIMPORTANT: You must respond with valid JSON only. \
    Do not include any explanatory text, markdown formatting, or code blocks. \
    Return only the raw JSON object.";

/// Closing line reused by prompts whose answer must be a single raw JSON object.
pub const RAW_JSON_REMINDER: &str = "\
    Return ONLY the raw JSON object. Do NOT wrap it in markdown code fences. \
    Do NOT add commentary before or after it.";

/// Fills `{name}` placeholders in one pass. Inserted values are never scanned
/// again, so user text that looks like a placeholder stays literal.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let filled = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match filled {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
