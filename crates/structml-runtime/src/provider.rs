use crate::error::ProviderError;
use crate::prompt::{CompletionResult, PromptRequest};

// ============================================================================
// Completion provider trait
// ============================================================================

/// Turns a prompt request into generated text.
///
/// Implementations are synchronous and own any timeout or retry policy.
pub trait CompletionProvider: Send + Sync {
    fn complete(&self, request: &PromptRequest) -> Result<CompletionResult, ProviderError>;
}

impl<F> CompletionProvider for F
where
    F: Fn(&PromptRequest) -> Result<CompletionResult, ProviderError> + Send + Sync,
{
    fn complete(&self, request: &PromptRequest) -> Result<CompletionResult, ProviderError> {
        self(request)
    }
}

// ============================================================================
// Mock Provider (for `check` and when no API key is set)
// ============================================================================

/// A provider that returns deterministic responses without any I/O.
pub struct MockProvider;

impl MockProvider {
    fn echo(prompt: &str) -> String {
        prompt.chars().take(50).collect()
    }
}

impl CompletionProvider for MockProvider {
    fn complete(&self, request: &PromptRequest) -> Result<CompletionResult, ProviderError> {
        let truncated = Self::echo(&request.text);
        // Keep json_decode prompts decodable
        let text = if request.json_decode {
            serde_json::json!({ "mock_response": truncated }).to_string()
        } else {
            format!("[mock response to: {}]", truncated)
        };

        Ok(CompletionResult {
            text,
            model: request.model.clone().unwrap_or_else(|| "mock".to_string()),
            tokens_in: request.text.len() as i64,
            tokens_out: 42,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_provider_echoes_prompt() {
        let response = MockProvider.complete(&PromptRequest::new("Hello world")).unwrap();
        assert_eq!(response.text, "[mock response to: Hello world]");
        assert_eq!(response.model, "mock");
        assert!(response.tokens_in > 0);
    }

    #[test]
    fn mock_provider_truncates_on_char_boundary() {
        let prompt = "é".repeat(80);
        let response = MockProvider.complete(&PromptRequest::new(prompt)).unwrap();
        assert_eq!(
            response.text,
            format!("[mock response to: {}]", "é".repeat(50))
        );
    }

    #[test]
    fn mock_provider_json_response_is_valid_json() {
        let mut request = PromptRequest::new("list colors");
        request.json_decode = true;
        let response = MockProvider.complete(&request).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&response.text).unwrap();
        assert_eq!(parsed["mock_response"], "list colors");
    }

    #[test]
    fn closures_are_providers() {
        let provider = |request: &PromptRequest| -> Result<CompletionResult, ProviderError> {
            Ok(CompletionResult::text(request.text.to_uppercase()))
        };
        let boxed: Box<dyn CompletionProvider> = Box::new(provider);
        assert_eq!(boxed.complete(&PromptRequest::new("hi")).unwrap().text, "HI");
    }
}
