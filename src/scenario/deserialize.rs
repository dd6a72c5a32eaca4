//! Loading operator-written scenarios from JSON or YAML.

use std::path::Path;

use crate::error::ScenarioError;
use crate::models::PublicScenario;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioFormat {
    Json,
    Yaml,
}

impl ScenarioFormat {
    /// Pick a format from a file extension, YAML unless it is `.json`
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ScenarioFormat::Json,
            _ => ScenarioFormat::Yaml,
        }
    }
}

pub fn from_bytes(bytes: &[u8], format: ScenarioFormat) -> Result<PublicScenario, ScenarioError> {
    match format {
        ScenarioFormat::Json => {
            serde_json::from_slice(bytes).map_err(|e| ScenarioError::Deserialize(e.to_string()))
        }
        ScenarioFormat::Yaml => {
            serde_yaml::from_slice(bytes).map_err(|e| ScenarioError::Deserialize(e.to_string()))
        }
    }
}

pub async fn from_file(path: impl AsRef<Path>) -> Result<PublicScenario, ScenarioError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|source| ScenarioError::Io {
        path: path.display().to_string(),
        source,
    })?;
    from_bytes(&bytes, ScenarioFormat::from_path(path))
}
