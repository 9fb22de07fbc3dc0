// src/services/extraction.rs
//! Response text extraction over provider envelopes
//!
//! Providers (and different versions of the same provider) put the generated
//! text in different places. Each rule below is a total function over an
//! arbitrary JSON value: a missing or mistyped field means "no match", never
//! an error. Rules run in order and the first non-empty string wins.

use serde_json::Value;
use tracing::debug;

type Rule = fn(&Value) -> Option<&str>;

const RULES: [(&str, Rule); 9] = [
    ("completion_string", completion_string),
    ("completion_content_string", completion_content_string),
    ("completion_content_parts", completion_content_parts),
    ("content_sequence", content_sequence),
    ("messages", messages),
    ("output_text", output_text),
    ("text", top_level_text),
    ("candidates", candidates),
    ("choices", choices),
];

/// Extract the generated text from a decoded envelope.
///
/// Returns the matched text and the name of the rule that produced it, or
/// `None` when no rule matched.
pub fn extract_text_with_rule(envelope: &Value) -> Option<(&'static str, String)> {
    RULES.iter().find_map(|(name, rule)| {
        rule(envelope)
            .filter(|text| !text.is_empty())
            .map(|text| (*name, text.to_string()))
    })
}

/// Extract the generated text, or an empty string when nothing matched.
pub fn extract_text(envelope: &Value) -> String {
    match extract_text_with_rule(envelope) {
        Some((rule, text)) => {
            debug!(rule = rule, "Extracted provider text");
            text
        }
        None => String::new(),
    }
}

fn first_text(parts: &Value) -> Option<&str> {
    parts.as_array()?.first()?.get("text")?.as_str()
}

// {"completion": "..."}
fn completion_string(v: &Value) -> Option<&str> {
    v.get("completion")?.as_str()
}

// {"completion": {"content": "..."}}
fn completion_content_string(v: &Value) -> Option<&str> {
    v.get("completion")?.get("content")?.as_str()
}

// {"completion": {"content": [{"text": "..."}]}}
fn completion_content_parts(v: &Value) -> Option<&str> {
    first_text(v.get("completion")?.get("content")?)
}

// {"content": [{"text": "..."}]} or {"content": [{"content": [{"text": "..."}]}]}
fn content_sequence(v: &Value) -> Option<&str> {
    let first = v.get("content")?.as_array()?.first()?;
    match first.get("text").and_then(Value::as_str) {
        Some(text) if !text.is_empty() => Some(text),
        _ => first_text(first.get("content")?),
    }
}

// {"messages": [{"role": "assistant", "content": {"text": "..."} | "..."}]}
fn messages(v: &Value) -> Option<&str> {
    let entries = v.get("messages")?.as_array()?;
    let chosen = entries
        .iter()
        .find(|m| m.get("role").and_then(Value::as_str) == Some("assistant"))
        .or_else(|| entries.first())?;
    let content = chosen.get("content")?;
    if content.is_object() {
        content.get("text")?.as_str()
    } else {
        content.as_str()
    }
}

fn output_text(v: &Value) -> Option<&str> {
    v.get("output_text")?.as_str()
}

fn top_level_text(v: &Value) -> Option<&str> {
    v.get("text")?.as_str()
}

// {"candidates": [{"content": {"parts": [{"text": "..."}]}}]}
fn candidates(v: &Value) -> Option<&str> {
    let candidate = v.get("candidates")?.as_array()?.first()?;
    first_text(candidate.get("content")?.get("parts")?)
}

// {"choices": [{"message": {"content": "..."}}]} or {"choices": [{"text": "..."}]}
fn choices(v: &Value) -> Option<&str> {
    let choice = v.get("choices")?.as_array()?.first()?;
    choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .or_else(|| choice.get("text").and_then(Value::as_str))
}
