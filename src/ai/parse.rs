//! Parsing and validation of model output
//!
//! A batch is either fully valid or rejected; callers never see a partial
//! list of subtopics.

use serde_json::Value;
use tracing::{debug, warn};

use super::{AiError, AiResult, ExpandedSubtopic, Subtopic};

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_blocks(text: &str) -> String {
    let text = text.trim();
    if text.starts_with("```") {
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() > 2 && lines[lines.len() - 1].trim_start().starts_with("```") {
            // Skip first line (```json) and last line (```)
            return lines[1..lines.len() - 1].join("\n");
        }
    }
    text.to_string()
}

/// Parse subtopics for a new map
pub fn parse_subtopics(raw: &str, count: usize) -> AiResult<Vec<Subtopic>> {
    let entries = extract_entries(raw)?;
    let subtopics = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            Ok(Subtopic {
                title: required_str(entry, "title", index)?,
                explanation: required_str(entry, "explanation", index)?,
            })
        })
        .collect::<AiResult<Vec<_>>>()?;
    take_batch(subtopics, count)
}

/// Parse subtopics for a node expansion
pub fn parse_expanded(raw: &str, count: usize) -> AiResult<Vec<ExpandedSubtopic>> {
    let entries = extract_entries(raw)?;
    let subtopics = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            Ok(ExpandedSubtopic {
                title: required_str(entry, "title", index)?,
                explanation: required_str(entry, "explanation", index)?,
                importance: optional_str(entry, "importance"),
            })
        })
        .collect::<AiResult<Vec<_>>>()?;
    take_batch(subtopics, count)
}

/// Validate a prose explanation
pub fn parse_explanation(raw: &str) -> AiResult<String> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(AiError::EmptyResponse);
    }
    Ok(text.to_string())
}

fn extract_entries(raw: &str) -> AiResult<Vec<Value>> {
    let cleaned = strip_code_blocks(raw);
    if cleaned.is_empty() {
        return Err(AiError::EmptyResponse);
    }
    debug!("Parsing model response ({} bytes)", cleaned.len());

    let value: Value = serde_json::from_str(&cleaned)?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => match obj.remove("subtopics") {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(AiError::InvalidResponse(
                "\"subtopics\" is not an array".to_string(),
            )),
            None => Err(AiError::InvalidResponse(
                "missing \"subtopics\" array".to_string(),
            )),
        },
        _ => Err(AiError::InvalidResponse(
            "expected a JSON object or array".to_string(),
        )),
    }
}

fn required_str(entry: &Value, field: &str, index: usize) -> AiResult<String> {
    match entry.get(field).and_then(Value::as_str).map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(AiError::InvalidResponse(format!(
            "subtopic {} is missing \"{}\"",
            index, field
        ))),
    }
}

fn optional_str(entry: &Value, field: &str) -> Option<String> {
    entry
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Enforce the batch size: short batches fail, extra entries are dropped
pub fn take_batch<T>(mut items: Vec<T>, count: usize) -> AiResult<Vec<T>> {
    if items.len() < count {
        return Err(AiError::InvalidResponse(format!(
            "expected {} subtopics, got {}",
            count,
            items.len()
        )));
    }
    if items.len() > count {
        warn!(
            "Model returned {} subtopics, keeping the first {}",
            items.len(),
            count
        );
        items.truncate(count);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIVE: &str = r#"{"subtopics": [
        {"title": "Light reactions", "explanation": "Capture light."},
        {"title": "Calvin cycle", "explanation": "Fixes carbon."},
        {"title": "Chlorophyll", "explanation": "Absorbs light."},
        {"title": "Stomata", "explanation": "Exchange gases."},
        {"title": "Glucose", "explanation": "The product."}
    ]}"#;

    #[test]
    fn test_parse_object_shape() {
        let subs = parse_subtopics(FIVE, 5).unwrap();
        assert_eq!(subs.len(), 5);
        assert_eq!(subs[0].title, "Light reactions");
        assert_eq!(subs[4].title, "Glucose");
    }

    #[test]
    fn test_parse_bare_array_in_code_fence() {
        let raw = "```json\n[{\"title\": \"A\", \"explanation\": \"a\", \"importance\": \"x\"}]\n```";
        let subs = parse_expanded(raw, 1).unwrap();
        assert_eq!(subs[0].importance.as_deref(), Some("x"));
    }

    #[test]
    fn test_extra_entries_truncated_in_order() {
        let subs = parse_subtopics(FIVE, 3).unwrap();
        let titles: Vec<&str> = subs.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Light reactions", "Calvin cycle", "Chlorophyll"]);
    }

    #[test]
    fn test_short_batch_rejected() {
        let err = parse_subtopics(FIVE, 6).unwrap_err();
        assert!(matches!(err, AiError::InvalidResponse(_)));
    }

    #[test]
    fn test_non_json_rejected() {
        assert!(matches!(
            parse_subtopics("here are some topics", 5),
            Err(AiError::Json(_))
        ));
    }

    #[test]
    fn test_missing_field_rejected() {
        let raw = r#"{"subtopics": [{"title": "Only a title"}]}"#;
        assert!(matches!(
            parse_expanded(raw, 1),
            Err(AiError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_blank_title_rejected() {
        let raw = r#"[{"title": "  ", "explanation": "x"}]"#;
        assert!(parse_subtopics(raw, 1).is_err());
    }

    #[test]
    fn test_wrong_container_rejected() {
        assert!(parse_subtopics(r#"{"topics": []}"#, 0).is_err());
        assert!(parse_subtopics(r#""just a string""#, 0).is_err());
    }

    #[test]
    fn test_empty_content_rejected() {
        assert!(matches!(parse_subtopics("   ", 5), Err(AiError::EmptyResponse)));
        assert!(matches!(parse_explanation(""), Err(AiError::EmptyResponse)));
    }

    #[test]
    fn test_strip_code_blocks_leaves_plain_text() {
        assert_eq!(strip_code_blocks("  [1, 2]  "), "[1, 2]");
    }
}
