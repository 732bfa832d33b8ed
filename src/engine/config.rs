// Mnemo Engine — Configuration Loading
//
// JSON config with serde defaults: a missing file or missing sections fall
// back to Default impls, so a bare `Assistant::connect` works out of the box
// against local Ollama + a local vault directory.

use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::atoms::error::EngineResult;
use crate::atoms::types::EngineConfig;

/// Default config file location: ~/.config/mnemo/config.json (or the
/// platform equivalent), falling back to the working directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("mnemo").join("config.json"))
        .unwrap_or_else(|| PathBuf::from("mnemo-config.json"))
}

/// Load configuration from a JSON file. A missing file yields defaults;
/// malformed JSON is an error (silent fallback would mask typos).
pub fn load_config(path: &Path) -> EngineResult<EngineConfig> {
    match std::fs::read_to_string(path) {
        Ok(raw) => {
            let config: EngineConfig = serde_json::from_str(&raw)?;
            info!("[config] loaded {}", path.display());
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("[config] {} not found — using defaults", path.display());
            Ok(EngineConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// Persist configuration as pretty-printed JSON.
pub fn save_config(path: &Path, config: &EngineConfig) -> EngineResult<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(config)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.vault.api_port, 27124);
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = EngineConfig::default();
        config.memory.embedding_model = "custom-model".into();
        config.retrieval.semantic_weight = 0.5;
        save_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.memory.embedding_model, "custom-model");
        assert!((loaded.retrieval.semantic_weight - 0.5).abs() < 1e-9);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_config(&path).is_err());
    }
}
