use crate::value::Value;

/// Temperature providers send when a request leaves it unset.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// A completion request built from a `@prompt` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    pub text: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub json_decode: bool,
    /// Overrides the provider's default model.
    pub model: Option<String>,
}

impl PromptRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            max_tokens: None,
            temperature: None,
            json_decode: false,
            model: None,
        }
    }
}

/// Raw text returned by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub text: String,
    pub model: String,
    pub tokens_in: i64,
    pub tokens_out: i64,
}

impl CompletionResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: String::new(),
            tokens_in: 0,
            tokens_out: 0,
        }
    }
}

/// Remove a surrounding Markdown code fence (```` ``` ```` or
/// ```` ```json ````) and the whitespace around it.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Decode a completion into a value, ignoring any code fence around it.
pub fn decode_json(text: &str) -> Result<Value, serde_json::Error> {
    let json: serde_json::Value = serde_json::from_str(strip_code_fence(text))?;
    Ok(Value::from_json(&json))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_with_language_tag() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  ```\n[1, 2]\n```  \n"), "[1, 2]");
        assert_eq!(strip_code_fence("```{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn unfenced_text_is_trimmed() {
        assert_eq!(strip_code_fence("  {\"a\": 1}\n"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("plain"), "plain");
    }

    #[test]
    fn decode_fenced_object() {
        let value = decode_json("```json\n{\"a\":1}\n```").unwrap();
        assert_eq!(value, Value::Map(vec![("a".into(), Value::Int(1))]));
    }

    #[test]
    fn decode_rejects_prose() {
        assert!(decode_json("Sure! Here is your answer.").is_err());
    }

    #[test]
    fn new_request_leaves_options_unset() {
        let request = PromptRequest::new("hi");
        assert_eq!(request.text, "hi");
        assert!(request.temperature.is_none());
        assert!(request.max_tokens.is_none());
        assert!(!request.json_decode);
    }
}
