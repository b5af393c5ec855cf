//! Structured-block extraction from free-form agent output.
//!
//! Agents are asked to emit a single JSON block, but the surrounding text
//! varies: some wrap it in a ```json fence, some in a bare fence, some emit
//! it inline in narrative text. The extractor tolerates all of those; what
//! it never does is default to an empty result when no parseable block
//! exists.

use serde::de::DeserializeOwned;

use crate::errors::PayloadError;

/// Extract the JSON object embedded in `text`.
///
/// Tries, in order: a ```json fence, a generic ``` fence (with or without a
/// language tag), and finally an outermost-brace scan over the whole text.
pub fn extract_json_block(text: &str) -> Result<String, PayloadError> {
    let region = fenced_region(text).unwrap_or(text);
    outermost_object(region)
        .map(str::to_string)
        .ok_or(PayloadError::NoStructuredBlock)
}

/// Extract and deserialize the embedded JSON object in one step.
pub fn parse_payload<T: DeserializeOwned>(text: &str) -> Result<T, PayloadError> {
    let block = extract_json_block(text)?;
    serde_json::from_str(&block).map_err(PayloadError::Malformed)
}

/// The inside of the first fenced code block, if any. A language tag on the
/// opening fence line is skipped.
fn fenced_region(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    // Skip the rest of the fence line (language tag or nothing)
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

/// The outermost `{...}` object in `text`, by brace counting. Braces inside
/// string literals are ignored.
fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
