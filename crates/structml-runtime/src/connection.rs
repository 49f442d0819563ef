//! Building a completion provider from `StructML.toml` connections.

use structml_common::manifest::{ConnectionConfig, StructmlManifest};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::provider::{CompletionProvider, MockProvider};
use crate::providers::{AnthropicProvider, OpenAiProvider};

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const OLLAMA_DEFAULT_MODEL: &str = "llama3.1";

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("connection '{0}' is not declared in StructML.toml")]
    Unknown(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Provider for `connection` (or the manifest's default connection).
///
/// Falls back to [`MockProvider`] when there is no manifest, no default
/// connection, or the API key variable is unset. Naming a connection that
/// does not exist is an error.
pub fn provider_from_manifest(
    manifest: Option<&StructmlManifest>,
    connection: Option<&str>,
) -> Result<Box<dyn CompletionProvider>, ConnectionError> {
    provider_from_manifest_with(manifest, connection, |var| std::env::var(var).ok())
}

/// Like [`provider_from_manifest`], reading API keys through `env`.
pub fn provider_from_manifest_with(
    manifest: Option<&StructmlManifest>,
    connection: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Box<dyn CompletionProvider>, ConnectionError> {
    let selected = match (manifest, connection) {
        (Some(manifest), Some(name)) => Some(
            manifest
                .connections
                .get_key_value(name)
                .map(|(k, v)| (k.as_str(), v))
                .ok_or_else(|| ConnectionError::Unknown(name.to_string()))?,
        ),
        (None, Some(name)) => return Err(ConnectionError::Unknown(name.to_string())),
        (Some(manifest), None) => manifest.default_connection(),
        (None, None) => None,
    };

    match selected {
        Some((name, config)) => provider_from_config(name, config, env),
        None => {
            warn!("no connection configured; @prompt uses the mock provider");
            Ok(Box::new(MockProvider))
        }
    }
}

/// Construct the provider a single connection describes.
pub fn provider_from_config(
    name: &str,
    config: &ConnectionConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Box<dyn CompletionProvider>, ConnectionError> {
    debug!(connection = name, provider = %config.provider, "building provider");

    let api_key = config.api_key_env.as_deref().and_then(|var| {
        let key = env(var).filter(|k| !k.is_empty());
        if key.is_none() {
            warn!(connection = name, env = var, "API key variable is not set");
        }
        key
    });

    let provider: Box<dyn CompletionProvider> = match (config.provider.as_str(), api_key) {
        ("mock", _) => Box::new(MockProvider),
        ("ollama", _) => {
            let base_url = config
                .base_url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string());
            let model = config.default_model.as_deref().unwrap_or(OLLAMA_DEFAULT_MODEL);
            let mut provider = OpenAiProvider::new(None, Some(base_url))
                .with_model(model)
                .with_temperature(config.default_temperature);
            if let Some(timeout) = config.timeout {
                provider = provider.with_timeout(timeout)?;
            }
            Box::new(provider)
        }
        ("openai", Some(key)) => {
            let mut provider = OpenAiProvider::new(Some(key), config.base_url.clone())
                .with_temperature(config.default_temperature);
            if let Some(ref model) = config.default_model {
                provider = provider.with_model(model);
            }
            if let Some(timeout) = config.timeout {
                provider = provider.with_timeout(timeout)?;
            }
            Box::new(provider)
        }
        ("anthropic", Some(key)) => {
            let mut provider = AnthropicProvider::new(key, config.base_url.clone())
                .with_temperature(config.default_temperature);
            if let Some(ref model) = config.default_model {
                provider = provider.with_model(model);
            }
            if let Some(timeout) = config.timeout {
                provider = provider.with_timeout(timeout)?;
            }
            Box::new(provider)
        }
        (other, _) => {
            warn!(
                connection = name,
                provider = other,
                "provider unavailable; @prompt uses the mock provider"
            );
            Box::new(MockProvider)
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use structml_common::manifest::parse_manifest;

    use super::*;
    use crate::prompt::PromptRequest;

    fn manifest(toml: &str) -> StructmlManifest {
        parse_manifest(toml, PathBuf::from(".")).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn is_mock(provider: &dyn CompletionProvider) -> bool {
        provider
            .complete(&PromptRequest::new("ping"))
            .map(|r| r.text == "[mock response to: ping]")
            .unwrap_or(false)
    }

    #[test]
    fn no_manifest_uses_mock() {
        let provider = provider_from_manifest_with(None, None, no_env).unwrap();
        assert!(is_mock(provider.as_ref()));
    }

    #[test]
    fn missing_api_key_falls_back_to_mock() {
        let m = manifest(
            r#"
[connections.openai]
provider = "openai"
api_key_env = "STRUCTML_TEST_UNSET_KEY"
"#,
        );
        let provider = provider_from_manifest_with(Some(&m), None, no_env).unwrap();
        assert!(is_mock(provider.as_ref()));
    }

    #[test]
    fn mock_connection_by_name() {
        let m = manifest(
            r#"
[connections.a]
provider = "mock"

[connections.b]
provider = "mock"
"#,
        );
        let provider = provider_from_manifest_with(Some(&m), Some("b"), no_env).unwrap();
        assert!(is_mock(provider.as_ref()));
    }

    #[test]
    fn unknown_connection_is_an_error() {
        let m = manifest("");
        let err = provider_from_manifest_with(Some(&m), Some("nope"), no_env)
            .err()
            .unwrap();
        assert!(err.to_string().contains("nope"));
        assert!(provider_from_manifest_with(None, Some("nope"), no_env).is_err());
    }

    #[test]
    fn configured_key_builds_real_provider() {
        let m = manifest(
            r#"
[connections.claude]
provider = "anthropic"
api_key_env = "ANTHROPIC_API_KEY"
default_model = "claude-sonnet-4-5"
"#,
        );
        let provider = provider_from_manifest_with(Some(&m), None, |_| Some("sk-test".into()));
        assert!(provider.is_ok());
    }
}
