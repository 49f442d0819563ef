use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// File name searched for when locating a manifest.
pub const MANIFEST_FILE: &str = "StructML.toml";

/// The parsed StructML.toml manifest.
#[derive(Debug, Clone)]
pub struct StructmlManifest {
    pub project: Option<ProjectSection>,
    pub settings: Settings,
    pub connections: HashMap<String, ConnectionConfig>,
    /// The directory containing the StructML.toml file.
    pub root_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    pub name: String,
    #[serde(default)]
    pub entry: Option<String>,
}

/// Interpreter behaviour switches.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Treat a non-iterable `@foreach` collection as fatal.
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub provider_failure: ProviderFailure,
    #[serde(default)]
    pub preserve_blank_lines: bool,
    /// Connection used for `@prompt` when none is given on the command line.
    #[serde(default)]
    pub connection: Option<String>,
}

/// What a failed completion call does to the running script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFailure {
    /// Bind an error value to the target variable and keep going.
    #[default]
    Bind,
    /// Abort the whole execution.
    Abort,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub provider: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub default_temperature: Option<f64>,
    #[serde(default)]
    pub timeout: Option<u32>,
}

/// Raw TOML structure for deserialization.
#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    project: Option<ProjectSection>,
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    connections: HashMap<String, ConnectionConfig>,
}

/// Errors that can occur when loading a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("no StructML.toml found (searched from {0})")]
    NotFound(String),
    #[error("failed to read StructML.toml: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid StructML.toml: {0}")]
    ParseError(String),
    #[error("invalid StructML.toml: connection '{0}' has provider '{1}' which requires 'api_key_env'")]
    MissingApiKeyEnv(String, String),
    #[error("invalid StructML.toml: connection '{0}' has unknown provider '{1}' (expected openai, anthropic, ollama or mock)")]
    UnknownProvider(String, String),
    #[error("invalid StructML.toml: [settings] connection '{0}' is not declared under [connections]")]
    UnknownConnection(String),
}

/// Walk up from `start_dir` looking for `StructML.toml`.
pub fn find_manifest(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        let candidate = current.join(MANIFEST_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Load and validate a manifest from a file path.
pub fn load_manifest(path: &Path) -> Result<StructmlManifest, ManifestError> {
    let content = std::fs::read_to_string(path)?;
    let root_dir = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    parse_manifest(&content, root_dir)
}

/// Parse and validate a manifest from a string.
pub fn parse_manifest(content: &str, root_dir: PathBuf) -> Result<StructmlManifest, ManifestError> {
    let raw: RawManifest =
        toml::from_str(content).map_err(|e| ManifestError::ParseError(e.to_string()))?;

    for (name, conn) in &raw.connections {
        validate_connection(name, conn)?;
    }

    if let Some(ref name) = raw.settings.connection {
        if !raw.connections.contains_key(name) {
            return Err(ManifestError::UnknownConnection(name.clone()));
        }
    }

    Ok(StructmlManifest {
        project: raw.project,
        settings: raw.settings,
        connections: raw.connections,
        root_dir,
    })
}

/// Find and load the manifest starting from a script's directory.
pub fn find_and_load_manifest(script: &Path) -> Result<StructmlManifest, ManifestError> {
    let start_dir = script.parent().unwrap_or_else(|| Path::new("."));
    let manifest_path = find_manifest(start_dir)
        .ok_or_else(|| ManifestError::NotFound(start_dir.display().to_string()))?;
    load_manifest(&manifest_path)
}

fn validate_connection(name: &str, conn: &ConnectionConfig) -> Result<(), ManifestError> {
    match conn.provider.as_str() {
        "openai" | "anthropic" => {
            if conn.api_key_env.is_none() {
                return Err(ManifestError::MissingApiKeyEnv(
                    name.to_string(),
                    conn.provider.clone(),
                ));
            }
        }
        "ollama" | "mock" => {}
        other => {
            return Err(ManifestError::UnknownProvider(
                name.to_string(),
                other.to_string(),
            ))
        }
    }
    Ok(())
}

impl StructmlManifest {
    /// The connection selected by `[settings] connection`, or the only one
    /// declared when there is exactly one.
    pub fn default_connection(&self) -> Option<(&str, &ConnectionConfig)> {
        if let Some(ref name) = self.settings.connection {
            return self
                .connections
                .get_key_value(name)
                .map(|(k, v)| (k.as_str(), v));
        }
        if self.connections.len() == 1 {
            return self
                .connections
                .iter()
                .next()
                .map(|(k, v)| (k.as_str(), v));
        }
        None
    }
}
