//! Pull a JSON value out of free-form model output.
//!
//! Models wrap JSON in markdown fences, prepend a sentence, or append a
//! sign-off. We try the fenced block first, then the whole reply, then the
//! outermost brace span.

use serde_json::Value;

/// Extract the first JSON object or array found in `content`.
pub fn extract_json(content: &str) -> Option<Value> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(fenced) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(fenced) {
            return Some(value);
        }
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() || value.is_array() {
            return Some(value);
        }
    }

    brace_span(trimmed, '{', '}')
        .or_else(|| brace_span(trimmed, '[', ']'))
        .and_then(|span| serde_json::from_str::<Value>(span).ok())
}

fn fenced_block(content: &str) -> Option<&str> {
    if content.contains("```json") {
        content
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
    } else if content.contains("```") {
        content.split("```").nth(1).map(|s| s.trim())
    } else {
        None
    }
}

fn brace_span(content: &str, open: char, close: char) -> Option<&str> {
    let start = content.find(open)?;
    let end = content.rfind(close)?;
    (end > start).then(|| &content[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let value = extract_json(r#"{"rules": []}"#).unwrap();
        assert!(value["rules"].is_array());
    }

    #[test]
    fn test_fenced_object() {
        let content = "Here you go:\n```json\n{\"status\": \"RULE_OK\"}\n```\nDone.";
        let value = extract_json(content).unwrap();
        assert_eq!(value["status"], "RULE_OK");
    }

    #[test]
    fn test_unlabeled_fence() {
        let content = "```\n[1, 2, 3]\n```";
        assert_eq!(extract_json(content).unwrap().as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_surrounding_prose() {
        let content = "The verdict is {\"canTranslate\": true} as shown.";
        assert_eq!(extract_json(content).unwrap()["canTranslate"], true);
    }

    #[test]
    fn test_no_json() {
        assert!(extract_json("").is_none());
        assert!(extract_json("no structure here").is_none());
        assert!(extract_json("\"just a string\"").is_none());
    }
}
