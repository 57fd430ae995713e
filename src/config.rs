use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app_dirs::AppDirs;
use crate::error::{QuizError, Result};
use crate::session::{DeliveryMode, SessionSettings};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub delivery_mode: DeliveryMode,
    pub settle_delay_ms: u64,
    pub tick_rate_ms: u64,
    pub require_confidence: bool,
    pub shuffle: bool,
    pub number_of_questions: Option<usize>,
    /// bundled bank name or path to a bank file
    pub bank: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            delivery_mode: DeliveryMode::Classic,
            settle_delay_ms: 600,
            tick_rate_ms: 100,
            require_confidence: false,
            shuffle: false,
            number_of_questions: None,
            bank: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.tick_rate_ms == 0 {
            return Err(QuizError::Config("tick_rate_ms must be positive".into()));
        }
        if self.number_of_questions == Some(0) {
            return Err(QuizError::Config(
                "number_of_questions must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl From<&Config> for SessionSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            mode: cfg.delivery_mode,
            settle_delay: Duration::from_millis(cfg.settle_delay_ms),
            tick_rate: Duration::from_millis(cfg.tick_rate_ms),
            require_confidence: cfg.require_confidence,
            specification: None,
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("quizdeck_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    /// Missing or unreadable files fall back to the defaults
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(err) => {
                    tracing::warn!(path = %self.path.display(), %err, "ignoring invalid config")
                }
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::tempdir;

    #[test]
    fn test_roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn test_save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config {
            delivery_mode: DeliveryMode::Individual,
            settle_delay_ms: 0,
            tick_rate_ms: 250,
            require_confidence: true,
            shuffle: true,
            number_of_questions: Some(3),
            bank: Some("pharmacology".into()),
        };
        store.save(&cfg).unwrap();
        assert_eq!(cfg, store.load());
    }

    #[test]
    fn test_missing_or_corrupt_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        assert_eq!(store.load(), Config::default());

        fs::write(&path, b"{not json").unwrap();
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{"delivery_mode": "preset"}"#).unwrap();

        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.delivery_mode, DeliveryMode::Preset);
        assert_eq!(cfg.settle_delay_ms, 600);
    }

    #[test]
    fn test_session_settings_from_config() {
        let cfg = Config {
            require_confidence: true,
            settle_delay_ms: 10,
            ..Config::default()
        };
        let settings = SessionSettings::from(&cfg);
        assert_eq!(settings.settle_delay, Duration::from_millis(10));
        assert_eq!(
            settings.completion_rule(),
            crate::manager::CompletionRule::ChosenWithConfidence
        );
    }

    #[test]
    fn test_validate_rejects_zero_tick() {
        let cfg = Config {
            tick_rate_ms: 0,
            ..Config::default()
        };
        assert_matches!(cfg.validate(), Err(QuizError::Config(_)));
        assert!(Config::default().validate().is_ok());
    }
}
