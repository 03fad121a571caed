//! Replay configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ReplayError, ReplayResult};
use crate::playwright::PlaywrightConfig;
use crate::visual::VisualConfig;

/// Replay configuration, usually read from `oo-replay.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// `host:port` of the editor's remote debugger
    pub debugger_address: String,

    /// Directory for `run-<timestamp>.log` files
    pub log_dir: PathBuf,

    /// Default filter directive when `RUST_LOG` is unset
    pub log_level: String,

    /// Name of the replay profile
    pub profile: String,

    /// Where interaction logs are looked up when none is given
    pub logs_dir: PathBuf,

    /// Root for batch results
    pub artifacts_dir: PathBuf,

    /// Merged into the execution context before the profile runs
    pub settings: Map<String, Value>,

    pub playwright: PlaywrightConfig,

    pub visual: VisualConfig,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            debugger_address: "127.0.0.1:9222".to_string(),
            log_dir: PathBuf::from("artifacts/logs"),
            log_level: "info".to_string(),
            profile: "plugin".to_string(),
            logs_dir: PathBuf::from("."),
            artifacts_dir: PathBuf::from("artifacts"),
            settings: Map::new(),
            playwright: PlaywrightConfig::default(),
            visual: VisualConfig::default(),
        }
    }
}

impl ReplayConfig {
    /// Load configuration from file, or the defaults when it does not exist
    pub fn load(path: &Path) -> ReplayResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::parse(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> ReplayResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> ReplayResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ReplayError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Playwright settings with the top-level debugger address applied.
    pub fn driver_config(&self) -> PlaywrightConfig {
        PlaywrightConfig {
            debugger_address: self.debugger_address.clone(),
            ..self.playwright.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visual::{BaselineMode, CompareMethod};
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ReplayConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.debugger_address, "127.0.0.1:9222");
        assert_eq!(config.log_dir, PathBuf::from("artifacts/logs"));
        assert_eq!(config.profile, "plugin");
    }

    #[test]
    fn test_partial_file() {
        let config = ReplayConfig::parse(
            r##"
debugger_address = "10.0.0.5:9333"

[settings]
find_timeout_ms = 2500
prepare_selector = "#plugin-button"

[visual]
method = "ssim"
mode = "update"
strict = false
"##,
        )
        .unwrap();

        assert_eq!(config.debugger_address, "10.0.0.5:9333");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.settings["find_timeout_ms"], 2500);
        assert_eq!(config.settings["prepare_selector"], "#plugin-button");
        assert_eq!(config.visual.method, CompareMethod::Ssim);
        assert_eq!(config.visual.mode, BaselineMode::Update);
        assert_eq!(config.visual.threshold, 0.01);
        assert_eq!(config.driver_config().debugger_address, "10.0.0.5:9333");
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(ReplayConfig::parse("profile = ["), Err(ReplayError::Toml(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/oo-replay.toml");
        let mut config = ReplayConfig::default();
        config.profile = "custom".into();
        config.save(&path).unwrap();

        assert_eq!(ReplayConfig::load(&path).unwrap().profile, "custom");
    }
}
