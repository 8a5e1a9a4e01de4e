//! Declarative configuration (`llms.yaml`) and secrets/env resolution.
//!
//! Grounded on `original_source/llm_deploy/llms_config.py` (validation
//! semantics) and `original_source/llm_deploy/config.py` (secrets
//! precedence), expressed with the `mofa-cli::config::loader` discovery
//! idiom.

use crate::error::{FleetError, FleetResult};
use crate::types::{DesiredModel, Priority};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
struct RawModelEntry {
    model: Option<String>,
    priority: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RawFleetConfig {
    #[serde(default)]
    models: HashMap<String, RawModelEntry>,
}

/// Parsed, validated `llms.yaml`.
#[derive(Debug, Clone, Default)]
pub struct FleetConfig {
    pub models: Vec<DesiredModel>,
}

impl FleetConfig {
    /// Loads and validates a config file. Missing fields or an invalid
    /// `priority` are a `ConfigError`, surfaced before any remote call —
    /// per spec §3's DesiredModel invariant.
    pub fn load(path: &Path) -> FleetResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> FleetResult<Self> {
        let raw: RawFleetConfig = serde_yaml::from_str(text)?;
        let mut models = Vec::with_capacity(raw.models.len());
        for (name, entry) in raw.models {
            let model = entry.model.ok_or_else(|| {
                FleetError::Config(format!("missing required key 'model' in model {name}"))
            })?;
            let priority_str = entry.priority.ok_or_else(|| {
                FleetError::Config(format!("missing required key 'priority' in model {name}"))
            })?;
            let priority = match priority_str.as_str() {
                "high" => Priority::High,
                "low" => Priority::Low,
                other => {
                    return Err(FleetError::Config(format!(
                        "invalid priority value for {name}: {other}"
                    )));
                }
            };
            models.push(DesiredModel {
                name,
                model,
                priority,
            });
        }
        Ok(FleetConfig { models })
    }

    /// Finds `llms.yaml` starting from `start_dir` and walking upward, the
    /// way `mofa-cli::config::loader::ConfigLoader::find_config` searches
    /// for `agent.yml`. Returns `None` if the filesystem has none — presence
    /// is the declarative-mode switch (SPEC_FULL.md §9 Design Notes).
    pub fn discover(start_dir: &Path, filename: &str) -> Option<PathBuf> {
        let mut current = start_dir.to_path_buf();
        loop {
            let candidate = current.join(filename);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }
}

/// Resolved secrets for the marketplace and gateway clients.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub vast_api_key: String,
    pub litellm_api_url: String,
}

impl Secrets {
    /// Reads `~/.vast_api_key` (first line) if present, else falls back to
    /// `VAST_API_KEY`; always reads `LITELLM_API_URL` with a default.
    /// Mirrors `original_source/llm_deploy/config.py::load_config`.
    pub fn load() -> FleetResult<Self> {
        let key_file = dirs_home().map(|h| h.join(".vast_api_key"));
        let from_file = key_file
            .filter(|p| p.is_file())
            .and_then(|p| std::fs::read_to_string(p).ok())
            .map(|s| s.lines().next().unwrap_or("").trim().to_string())
            .filter(|s| !s.is_empty());

        let vast_api_key = match from_file {
            Some(key) => key,
            None => std::env::var("VAST_API_KEY").unwrap_or_default(),
        };

        if vast_api_key.is_empty() {
            return Err(FleetError::Config(
                "no vast.ai API key found in ~/.vast_api_key or VAST_API_KEY".into(),
            ));
        }

        let litellm_api_url = std::env::var("LITELLM_API_URL")
            .unwrap_or_else(|_| "http://localhost:4000".to_string());

        Ok(Secrets {
            vast_api_key,
            litellm_api_url,
        })
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_config() {
        let yaml = r#"
models:
  llama:
    model: llama3-8b:q4_k_m
    priority: high
  mistral:
    model: mistral-7b:q4_k_m
    priority: low
"#;
        let cfg = FleetConfig::parse(yaml).unwrap();
        assert_eq!(cfg.models.len(), 2);
    }

    #[test]
    fn rejects_missing_model_key() {
        let yaml = r#"
models:
  llama:
    priority: high
"#;
        assert!(FleetConfig::parse(yaml).is_err());
    }

    #[test]
    fn rejects_invalid_priority() {
        let yaml = r#"
models:
  llama:
    model: llama3-8b:q4_k_m
    priority: medium
"#;
        assert!(FleetConfig::parse(yaml).is_err());
    }

    #[test]
    fn empty_config_is_empty_model_list() {
        let cfg = FleetConfig::parse("models: {}").unwrap();
        assert!(cfg.models.is_empty());
    }

    #[test]
    fn discover_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("llms.yaml"), "models: {}").unwrap();
        let found = FleetConfig::discover(&nested, "llms.yaml").unwrap();
        assert_eq!(found, dir.path().join("llms.yaml"));
    }

    #[test]
    fn discover_returns_none_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FleetConfig::discover(dir.path(), "llms.yaml").is_none());
    }
}
