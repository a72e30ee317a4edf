use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```(?:json)?\s*|```$").expect("valid fence regex"));
static TRAILING_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("valid trailing comma regex"));
static FENCED_OBJECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```json\s*(\{.*?\})\s*```").expect("valid fenced object regex"));

/// Strip markdown code fences around a model reply.
pub fn clean_json_block(raw: &str) -> String {
    FENCE_RE.replace_all(raw.trim(), "").trim().to_string()
}

/// Parse a model reply as JSON, tolerating fences and trailing commas.
pub fn safe_json_loads(raw: &str) -> Result<Value> {
    let cleaned = clean_json_block(raw);
    match serde_json::from_str(&cleaned) {
        Ok(value) => Ok(value),
        Err(_) => {
            let repaired = TRAILING_COMMA_RE.replace_all(&cleaned, "$1");
            serde_json::from_str(&repaired).context("Failed to parse model reply as JSON")
        }
    }
}

/// First balanced `{...}` object in `text`, ignoring braces inside strings.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Pull a JSON object out of free-form model output. A ```json fenced block
/// wins; otherwise the first balanced object is tried.
pub fn extract_json_block(text: &str) -> Option<Value> {
    let block = FENCED_OBJECT_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .or_else(|| first_json_object(text));

    let Some(block) = block else {
        tracing::warn!("No JSON object found in model reply");
        return None;
    };

    match safe_json_loads(block) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "Discarding unparsable JSON block");
            None
        }
    }
}
