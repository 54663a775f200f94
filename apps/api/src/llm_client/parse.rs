//! Tolerant recovery of JSON objects from free-form model text.
//!
//! Models wrap JSON in prose, code fences, or both. `parse_model_json` tries a
//! fixed ladder of strategies and reports which one succeeded, so callers can
//! log how well-behaved the model was.

use serde_json::{Map, Value};

/// Which recovery strategy produced the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseTier {
    /// The whole reply was a JSON object.
    Direct,
    /// The object sat inside a ``` fenced block.
    Fenced,
    /// The object was found embedded in surrounding prose.
    Embedded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedJson {
    pub fields: Map<String, Value>,
    pub tier: ParseTier,
}

/// Every strategy failed. Carries the trimmed reply for degraded handling.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFallback {
    pub raw: String,
}

/// Recovers a JSON object from model output.
///
/// Strategies, in order:
/// 1. the whole trimmed text;
/// 2. the first ``` fenced block that holds an object carrying `required_keys`;
/// 3. an embedded object. With no `required_keys` this is the span from the first
///    `{` to the last `}`, then the first balanced object that parses. With
///    `required_keys` it is the LAST balanced object carrying all of them.
///
/// An object that lacks the keys but wraps one that has them yields the inner
/// object. When keys are required and nothing carries them, the first fenced
/// object is still returned; a whole-text object is always returned as is.
///
/// Only JSON objects count; a bare array or scalar falls through to the next tier.
pub fn parse_model_json(text: &str, required_keys: &[&str]) -> Result<ParsedJson, RawFallback> {
    let trimmed = text.trim();

    if let Some(fields) = parse_object(trimmed) {
        let fields = carrying_keys(&fields, required_keys)
            .cloned()
            .unwrap_or(fields);
        return Ok(ParsedJson {
            fields,
            tier: ParseTier::Direct,
        });
    }

    let fenced: Vec<Map<String, Value>> = fenced_blocks(trimmed).filter_map(parse_object).collect();
    if let Some(fields) = fenced
        .iter()
        .find_map(|fields| carrying_keys(fields, required_keys))
    {
        return Ok(ParsedJson {
            fields: fields.clone(),
            tier: ParseTier::Fenced,
        });
    }

    let embedded = if required_keys.is_empty() {
        outer_span(trimmed)
            .and_then(parse_object)
            .or_else(|| balanced_objects(trimmed).into_iter().find_map(parse_object))
    } else {
        balanced_objects(trimmed)
            .into_iter()
            .rev()
            .filter_map(parse_object)
            .find_map(|fields| carrying_keys(&fields, required_keys).cloned())
    };

    if let Some(fields) = embedded {
        return Ok(ParsedJson {
            fields,
            tier: ParseTier::Embedded,
        });
    }

    match fenced.into_iter().next() {
        Some(fields) => Ok(ParsedJson {
            fields,
            tier: ParseTier::Fenced,
        }),
        None => Err(RawFallback {
            raw: trimmed.to_string(),
        }),
    }
}

/// `fields` itself when it has every key, else the first nested object that does.
fn carrying_keys<'a>(
    fields: &'a Map<String, Value>,
    keys: &[&str],
) -> Option<&'a Map<String, Value>> {
    if keys.iter().all(|k| fields.contains_key(*k)) {
        return Some(fields);
    }
    fields.values().find_map(|value| match value {
        Value::Object(inner) => carrying_keys(inner, keys),
        Value::Array(items) => items.iter().find_map(|item| match item {
            Value::Object(inner) => carrying_keys(inner, keys),
            _ => None,
        }),
        _ => None,
    })
}

/// Strips a leading/trailing markdown code fence if present.
pub fn strip_json_fences(text: &str) -> &str {
    let trimmed = text.trim();
    fenced_blocks(trimmed)
        .next()
        .filter(|_| trimmed.starts_with("```"))
        .unwrap_or(trimmed)
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Interiors of ``` fenced blocks, with any language tag removed.
fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let open = rest.find("```")?;
        let after_open = &rest[open + 3..];
        // Skip an optional language tag such as `json`.
        let body_start = after_open
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(after_open.len());
        let body = &after_open[body_start..];
        let close = body.find("```")?;
        rest = &body[close + 3..];
        Some(body[..close].trim())
    })
}

fn outer_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Every top-level brace-balanced `{...}` span, in order of appearance.
/// String literals are respected, so braces inside quoted values do not count.
fn balanced_objects(text: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(offset) = text[cursor..].find('{') {
        let start = cursor + offset;
        match matching_brace(&text[start..]) {
            Some(len) => {
                found.push(&text[start..start + len]);
                cursor = start + len;
            }
            None => cursor = start + 1,
        }
    }
    found
}

/// Length of the balanced object starting at the first byte of `s` (which is `{`).
fn matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
