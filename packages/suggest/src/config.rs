use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_NAME: &str = "redline.config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// What to do with an edit in suggest mode when no author identity exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingAuthorPolicy {
    /// Apply the edit directly
    #[default]
    Fallthrough,
    /// Swallow the edit
    Drop,
}

/// Labels for thread-creation events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Labels {
    #[serde(default = "default_insert_label")]
    pub insert: String,
    #[serde(default = "default_delete_label")]
    pub delete: String,
    #[serde(default = "default_replace_label")]
    pub replace: String,
}

fn default_insert_label() -> String {
    "Suggested edit".to_string()
}

fn default_delete_label() -> String {
    "Suggested deletion".to_string()
}

fn default_replace_label() -> String {
    "Suggested replacement".to_string()
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            insert: default_insert_label(),
            delete: default_delete_label(),
            replace: default_replace_label(),
        }
    }
}

/// Engine configuration file format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Start in suggest mode
    #[serde(default)]
    pub suggest_mode: bool,

    /// How long consecutive typing at the same caret keeps extending one suggestion
    #[serde(default = "default_merge_window_ms")]
    pub merge_window_ms: u64,

    #[serde(default)]
    pub missing_author: MissingAuthorPolicy,

    #[serde(default)]
    pub labels: Labels,

    /// Undo depth of the host editor (0 = unlimited)
    #[serde(default = "default_history_levels")]
    pub history_levels: usize,

    /// Logical document id for replication and id seeding
    #[serde(default = "default_document_id")]
    pub document_id: String,
}

fn default_merge_window_ms() -> u64 {
    3000
}

fn default_history_levels() -> usize {
    100
}

fn default_document_id() -> String {
    "default".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            suggest_mode: false,
            merge_window_ms: default_merge_window_ms(),
            missing_author: MissingAuthorPolicy::default(),
            labels: Labels::default(),
            history_levels: default_history_levels(),
            document_id: default_document_id(),
        }
    }
}

impl EngineConfig {
    /// Load `redline.config.json` from a directory, falling back to defaults
    pub fn load(cwd: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = cwd.as_ref().join(DEFAULT_CONFIG_NAME);
        if path.exists() {
            Self::load_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "suggestMode": true,
            "mergeWindowMs": 500,
            "missingAuthor": "drop",
            "labels": { "insert": "Edit" },
            "documentId": "post-42"
        }"#;

        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert!(config.suggest_mode);
        assert_eq!(config.merge_window_ms, 500);
        assert_eq!(config.missing_author, MissingAuthorPolicy::Drop);
        assert_eq!(config.labels.insert, "Edit");
        assert_eq!(config.labels.delete, "Suggested deletion");
        assert_eq!(config.history_levels, 100);
        assert_eq!(config.document_id, "post-42");
    }

    #[test]
    fn test_default_config() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(!config.suggest_mode);
        assert_eq!(config.merge_window_ms, 3000);
        assert_eq!(config.labels.replace, "Suggested replacement");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = std::env::temp_dir().join("redline-config-missing");
        let config = EngineConfig::load(&dir).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
