use std::sync::LazyLock;

use common::error::AppError;
use regex::Regex;
use serde_json::{json, Value};
use tracing::warn;

static ACTION_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""action":\s*"([^"]+)""#).unwrap_or_else(|_| unreachable!()));
static REASONING_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""reasoning":\s*"([^"]*)"#).unwrap_or_else(|_| unreachable!()));
static CAN_ANSWER_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""can_answer":\s*(true|false)"#).unwrap_or_else(|_| unreachable!())
});

/// Best-effort JSON extraction from an LLM reply. Layered strategy:
/// strict parse, fence stripping, closing an unterminated string, then
/// regex recovery of the known keys. Recoveries log the original payload.
pub fn extract_json(text: &str) -> Result<Value, AppError> {
    let mut cleaned = text.trim().to_string();

    for prefix in ["```json", "```"] {
        if let Some(stripped) = cleaned.strip_prefix(prefix) {
            cleaned = stripped.to_string();
            break;
        }
    }
    if let Some(stripped) = cleaned.strip_suffix("```") {
        cleaned = stripped.to_string();
    }

    let start = cleaned.find('{');
    let end = cleaned.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(AppError::LLMParsing(format!(
            "no JSON object found in: {}",
            preview(text)
        )));
    };
    if end < start {
        return Err(AppError::LLMParsing(format!(
            "no JSON object found in: {}",
            preview(text)
        )));
    }

    let json_text = &cleaned[start..=end];

    if let Ok(value) = serde_json::from_str::<Value>(json_text) {
        return Ok(value);
    }

    // Repair 1: an odd quote count suggests a single unterminated string
    if json_text.matches('"').count() % 2 != 0 {
        let repaired = format!("{}\"}}", json_text.trim_end());
        if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
            warn!(payload = preview(text), "recovered JSON by closing a string");
            return Ok(value);
        }
    }

    // Repair 2: regex extraction of an action decision
    if let Some(action) = ACTION_KEY.captures(json_text) {
        let reasoning = REASONING_KEY
            .captures(json_text)
            .map_or("parsing error", |captures| {
                captures.get(1).map_or("", |group| group.as_str())
            });
        warn!(payload = preview(text), "recovered action decision by regex");
        return Ok(json!({
            "action": &action[1],
            "reasoning": reasoning,
        }));
    }

    // Repair 3: regex extraction of an evaluation verdict
    if let Some(can_answer) = CAN_ANSWER_KEY.captures(json_text) {
        let reasoning = REASONING_KEY
            .captures(json_text)
            .map_or("parsing error", |captures| {
                captures.get(1).map_or("", |group| group.as_str())
            });
        warn!(payload = preview(text), "recovered evaluation by regex");
        return Ok(json!({
            "can_answer": &can_answer[1] == "true",
            "reasoning": reasoning,
        }));
    }

    Err(AppError::LLMParsing(format!(
        "could not parse or repair JSON: {}",
        preview(json_text)
    )))
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_json_passes_through() {
        let value = extract_json(r#"{"action": "search_semantic", "reasoning": "definitions"}"#)
            .expect("parse");
        assert_eq!(value["action"], "search_semantic");
        assert_eq!(value["reasoning"], "definitions");
    }

    #[test]
    fn test_markdown_fences_are_stripped() {
        let value = extract_json("```json\n{\"action\": \"done\", \"reasoning\": \"enough\"}\n```")
            .expect("parse");
        assert_eq!(value["action"], "done");
    }

    #[test]
    fn test_prose_around_object_is_ignored() {
        let value = extract_json(
            "Sure! Here is the decision:\n{\"action\": \"search_graph\", \"reasoning\": \"relations\"}\nHope that helps.",
        )
        .expect("parse");
        assert_eq!(value["action"], "search_graph");
    }

    #[test]
    fn test_unterminated_string_is_closed() {
        let value = extract_json(r#"{"action": "search_fulltext", "reasoning": "cut off}"#);
        let value = value.expect("repair");
        assert_eq!(value["action"], "search_fulltext");
    }

    #[test]
    fn test_action_recovered_by_regex() {
        let broken = r#"{"action": "search_semantic", "reasoning": "relations", "extra": }"#;
        let value = extract_json(broken).expect("regex recovery");
        assert_eq!(value["action"], "search_semantic");
        assert_eq!(value["reasoning"], "relations");
    }

    #[test]
    fn test_can_answer_recovered_by_regex() {
        let broken = r#"{"can_answer": false, "reasoning": "tangential info", }"#;
        let value = extract_json(broken).expect("regex recovery");
        assert_eq!(value["can_answer"], false);
    }

    #[test]
    fn test_garbage_fails() {
        assert!(extract_json("no json here at all").is_err());
        assert!(extract_json("{completely: broken").is_err());
    }
}
