pub mod anthropic;
pub mod openai;

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};

use crate::error::ProviderError;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

fn build_client(provider: &str, timeout_secs: u32) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(Duration::from_secs(u64::from(timeout_secs)))
        .build()
        .map_err(|e| ProviderError::Http {
            provider: provider.to_string(),
            message: e.to_string(),
        })
}

/// POST `body` and return the decoded JSON response, mapping transport,
/// status and decoding failures to [`ProviderError`].
fn post_json(
    provider: &str,
    builder: RequestBuilder,
    body: &serde_json::Value,
) -> Result<serde_json::Value, ProviderError> {
    let response = builder
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .map_err(|e| ProviderError::Http {
            provider: provider.to_string(),
            message: e.to_string(),
        })?;

    let status = response.status();
    let response_text = response.text().map_err(|e| ProviderError::Http {
        provider: provider.to_string(),
        message: format!("read error: {}", e),
    })?;

    if !status.is_success() {
        return Err(ProviderError::Api {
            provider: provider.to_string(),
            status: status.as_u16(),
            body: response_text,
        });
    }

    serde_json::from_str(&response_text).map_err(|e| ProviderError::Response {
        provider: provider.to_string(),
        message: format!("invalid JSON: {}", e),
    })
}
