//! Tolerant JSON extraction from model output
//!
//! Models wrap JSON in code fences, prose or both. We take the first fenced
//! ```` ```json ```` block or bare `{...}` object, and when that does not parse
//! fall back to everything between the outermost braces.

use crate::llm::ERROR_PREFIX;
use crate::{log_error, log_warn};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static JSON_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"```json\s*(\{[\s\S]*?\})\s*```|(\{[\s\S]*?\})").ok());

fn candidate(text: &str) -> Option<&str> {
    let captures = JSON_BLOCK.as_ref()?.captures(text)?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str())
}

fn outermost_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn as_object(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Parse the first JSON object found in `text`.
///
/// Returns `None` for blank text, completion-failure sentinels and text
/// without a decodable object.
pub fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    if text.trim().is_empty() || text.starts_with(ERROR_PREFIX) {
        log_error!("Not parsing JSON after a failed completion: {}", text);
        return None;
    }

    let Some(found) = candidate(text) else {
        log_warn!("No JSON object in model output: '{}'", text);
        return None;
    };

    as_object(found).or_else(|| {
        let parsed = outermost_braces(text).and_then(as_object);
        if parsed.is_none() {
            log_error!("Could not decode JSON from model output: '{}'", text);
        }
        parsed
    })
}

/// First non-empty string among `keys`
pub fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}
