use reqwest::blocking::Client;

use crate::error::ProviderError;
use crate::prompt::{CompletionResult, PromptRequest, DEFAULT_TEMPERATURE};
use crate::provider::CompletionProvider;

use super::{build_client, post_json};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI-compatible completion provider.
///
/// Works with the OpenAI API and any compatible endpoint (e.g. Ollama,
/// Together, Groq). The API key is optional for local servers.
pub struct OpenAiProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    default_model: String,
    default_temperature: Option<f64>,
}

impl OpenAiProvider {
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Self {
        OpenAiProvider {
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
        self.client = build_client("OpenAI", seconds)?;
        Ok(self)
    }

    /// Build the JSON request body for the chat completions API.
    pub fn build_request_body(
        request: &PromptRequest,
        default_model: &str,
        default_temperature: Option<f64>,
    ) -> serde_json::Value {
        let temperature = request
            .temperature
            .or(default_temperature)
            .unwrap_or(DEFAULT_TEMPERATURE);
        let mut body = serde_json::json!({
            "model": request.model.as_deref().unwrap_or(default_model),
            "messages": [{
                "role": "user",
                "content": request.text,
            }],
            "temperature": temperature,
        });
        if let Some(max) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        body
    }

    /// Parse the JSON response from the chat completions API.
    pub fn parse_response(json: &serde_json::Value) -> Result<CompletionResult, ProviderError> {
        let malformed = |message: &str| ProviderError::Response {
            provider: "OpenAI".to_string(),
            message: message.to_string(),
        };

        let choice = json
            .get("choices")
            .and_then(|c| c.get(0))
            .ok_or_else(|| malformed("no choices in response"))?;

        let message = choice
            .get("message")
            .ok_or_else(|| malformed("no message in choice"))?;

        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        let model = json
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown")
            .to_string();

        let usage = json.get("usage");
        let tokens_in = usage
            .and_then(|u| u.get("prompt_tokens"))
            .and_then(|t| t.as_i64())
            .unwrap_or(0);
        let tokens_out = usage
            .and_then(|u| u.get("completion_tokens"))
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

impl CompletionProvider for OpenAiProvider {
    fn complete(&self, request: &PromptRequest) -> Result<CompletionResult, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body =
            Self::build_request_body(request, &self.default_model, self.default_temperature);

        let mut builder = self.client.post(&url);
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        let json = post_json("OpenAI", builder, &body)?;
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
        request.temperature = Some(0.2);
        request.max_tokens = Some(100);
        let body = OpenAiProvider::build_request_body(&request, "gpt-4", None);
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
        assert_eq!(body["temperature"], 0.2);
        assert_eq!(body["max_tokens"], 100);
    }

    #[test]
    fn build_request_defaults() {
        let request = PromptRequest::new("Hello");
        let body = OpenAiProvider::build_request_body(&request, DEFAULT_MODEL, None);
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["temperature"], 0.7);
        assert!(body.get("max_tokens").is_none());

        let body = OpenAiProvider::build_request_body(&request, DEFAULT_MODEL, Some(0.0));
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn request_model_overrides_default() {
        let mut request = PromptRequest::new("Hello");
        request.model = Some("gpt-4o".to_string());
        let body = OpenAiProvider::build_request_body(&request, DEFAULT_MODEL, None);
        assert_eq!(body["model"], "gpt-4o");
    }

    #[test]
    fn parse_response_basic() {
        let json = serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Hello there!"
                }
            }],
            "model": "gpt-4-0613",
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 5
            }
        });
        let response = OpenAiProvider::parse_response(&json).unwrap();
        assert_eq!(response.text, "Hello there!");
        assert_eq!(response.model, "gpt-4-0613");
        assert_eq!(response.tokens_in, 10);
        assert_eq!(response.tokens_out, 5);
    }

    #[test]
    fn parse_response_null_content_is_empty() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": null}}]
        });
        let response = OpenAiProvider::parse_response(&json).unwrap();
        assert_eq!(response.text, "");
        assert_eq!(response.model, "unknown");
    }

    #[test]
    fn parse_response_no_choices_errors() {
        let json = serde_json::json!({"error": "something went wrong"});
        let err = OpenAiProvider::parse_response(&json).unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }
}
