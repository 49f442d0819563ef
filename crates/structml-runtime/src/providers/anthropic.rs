use reqwest::blocking::Client;

use crate::error::ProviderError;
use crate::prompt::{CompletionResult, PromptRequest, DEFAULT_TEMPERATURE};
use crate::provider::CompletionProvider;

use super::{build_client, post_json};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
const API_VERSION: &str = "2023-06-01";

/// Anthropic completion provider (Messages API).
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    default_temperature: Option<f64>,
}

impl AnthropicProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        AnthropicProvider {
            client: Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            default_model: DEFAULT_MODEL.to_string(),
            default_temperature: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.default_temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, seconds: u32) -> Result<Self, ProviderError> {
        self.client = build_client("Anthropic", seconds)?;
        Ok(self)
    }

    /// Build the JSON request body for the Messages API.
    ///
    /// `max_tokens` is mandatory for this API and defaults to 1024.
    pub fn build_request_body(
        request: &PromptRequest,
        default_model: &str,
        default_temperature: Option<f64>,
    ) -> serde_json::Value {
        serde_json::json!({
            "model": request.model.as_deref().unwrap_or(default_model),
            "messages": [{
                "role": "user",
                "content": request.text,
            }],
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request
                .temperature
                .or(default_temperature)
                .unwrap_or(DEFAULT_TEMPERATURE),
        })
    }

    /// Parse the JSON response from the Messages API.
    pub fn parse_response(json: &serde_json::Value) -> Result<CompletionResult, ProviderError> {
        let content = json
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| ProviderError::Response {
                provider: "Anthropic".to_string(),
                message: "no content in response".to_string(),
            })?;

        // Concatenate text blocks; other block types carry no prompt output.
        let text: String = content
            .iter()
            .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
            .collect();

        let model = json
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown")
            .to_string();

        let usage = json.get("usage");
        let tokens_in = usage
            .and_then(|u| u.get("input_tokens"))
            .and_then(|t| t.as_i64())
            .unwrap_or(0);
        let tokens_out = usage
            .and_then(|u| u.get("output_tokens"))
            .and_then(|t| t.as_i64())
            .unwrap_or(0);

        Ok(CompletionResult {
            text,
            model,
            tokens_in,
            tokens_out,
        })
    }
}

impl CompletionProvider for AnthropicProvider {
    fn complete(&self, request: &PromptRequest) -> Result<CompletionResult, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let body =
            Self::build_request_body(request, &self.default_model, self.default_temperature);

        let builder = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION);
        let json = post_json("Anthropic", builder, &body)?;
        Self::parse_response(&json)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_basic() {
        let mut request = PromptRequest::new("Hello");
        request.temperature = Some(0.5);
        request.max_tokens = Some(200);
        let body = AnthropicProvider::build_request_body(&request, "claude-sonnet-4-5", None);
        assert_eq!(body["model"], "claude-sonnet-4-5");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["max_tokens"], 200);
    }

    #[test]
    fn build_request_default_max_tokens_and_temperature() {
        let request = PromptRequest::new("Hello");
        let body = AnthropicProvider::build_request_body(&request, DEFAULT_MODEL, None);
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["temperature"], 0.7);

        let body = AnthropicProvider::build_request_body(&request, DEFAULT_MODEL, Some(0.3));
        assert_eq!(body["temperature"], 0.3);
    }

    #[test]
    fn parse_response_text() {
        let json = serde_json::json!({
            "content": [
                {"type": "text", "text": "Hello! "},
                {"type": "text", "text": "How can I help?"}
            ],
            "model": "claude-sonnet-4-5",
            "usage": {
                "input_tokens": 12,
                "output_tokens": 8
            }
        });
        let response = AnthropicProvider::parse_response(&json).unwrap();
        assert_eq!(response.text, "Hello! How can I help?");
        assert_eq!(response.model, "claude-sonnet-4-5");
        assert_eq!(response.tokens_in, 12);
        assert_eq!(response.tokens_out, 8);
    }

    #[test]
    fn parse_response_skips_non_text_blocks() {
        let json = serde_json::json!({
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "42"}
            ]
        });
        let response = AnthropicProvider::parse_response(&json).unwrap();
        assert_eq!(response.text, "42");
    }

    #[test]
    fn parse_response_no_content_errors() {
        let json = serde_json::json!({"error": {"message": "invalid_api_key"}});
        assert!(AnthropicProvider::parse_response(&json).is_err());
    }
}
