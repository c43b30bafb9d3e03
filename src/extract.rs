use anyhow::{Context, Result};
use serde_json::Value;

/// Pulls the payload out of a generation response. Fenced blocks win over the
/// raw text, and a block tagged `json` wins over an untagged one. A fence
/// with no closing marker runs to the end of the text.
pub fn strip_code_fences(raw: &str) -> &str {
    if let Some(idx) = raw.find("```json") {
        let rest = &raw[idx + "```json".len()..];
        return match rest.find("```") {
            Some(end) => rest[..end].trim(),
            None => rest.trim(),
        };
    }
    if let Some(idx) = raw.find("```") {
        let rest = &raw[idx + "```".len()..];
        return match rest.find("```") {
            Some(end) => rest[..end].trim(),
            None => rest.trim(),
        };
    }
    raw.trim()
}

/// Extracts and parses a JSON payload from raw generation output.
///
/// Validation is syntactic only: `null` and `{}` are successes. Whether a
/// parsed value has a usable shape is the consumer's concern.
pub fn parse_json_payload(raw: &str) -> Result<Value> {
    let cleaned = strip_code_fences(raw);
    serde_json::from_str(cleaned).with_context(|| {
        let preview: String = cleaned.chars().take(120).collect();
        format!("Payload is not valid JSON: {preview}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_json_with_surrounding_text() {
        let raw = "prefix ```json\n{\"a\":1}\n``` suffix";
        let value = parse_json_payload(raw).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_untagged_fence() {
        let raw = "```\n{\"a\":1}\n```";
        let value = parse_json_payload(raw).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_bare_json() {
        let value = parse_json_payload("{\"a\":1}").unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_json_fence_preferred_over_plain_fence() {
        let raw = "```\nnot the payload\n```\n```json\n{\"b\":2}\n```";
        let value = parse_json_payload(raw).unwrap();
        assert_eq!(value["b"], 2);
    }

    #[test]
    fn test_unclosed_fence_runs_to_end() {
        let value = parse_json_payload("```json\n{\"a\":1}").unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_not_json_fails() {
        assert!(parse_json_payload("not json at all").is_err());
    }

    #[test]
    fn test_null_and_empty_are_syntactic_successes() {
        assert!(parse_json_payload("null").unwrap().is_null());
        assert!(parse_json_payload("{}").unwrap().is_object());
    }
}
