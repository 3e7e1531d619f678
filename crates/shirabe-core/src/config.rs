use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Purpose;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub resolution: ResolutionConfig,
    pub matching: MatchingConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    pub default_purpose: Purpose,
    pub preferred_servers: Vec<String>,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            default_purpose: Purpose::Playback,
            preferred_servers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum proximity for a fuzzy title match, in `[0, 1]`.
    pub threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self { threshold: 0.8 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SearchConfig {
    /// Source names skipped by search fan-out.
    pub disabled_sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive. `RUST_LOG` wins over it.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "shirabe=info".into(),
        }
    }
}

impl Config {
    /// The configuration shipped with the crate.
    pub fn builtin() -> Result<Self> {
        toml::from_str(DEFAULT_CONFIG).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load the user file if it exists, otherwise the built-in defaults.
    pub fn load() -> Result<Self> {
        let user_path = Self::config_path();
        if user_path.exists() {
            Self::load_from(&user_path)
        } else {
            Self::builtin()
        }
    }

    /// Load from `path`. Missing keys fall back to their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Save to the user config file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("", "", "shirabe")
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.matching.threshold) {
            return Err(Error::Config(format!(
                "matching.threshold must be within [0, 1], got {}",
                self.matching.threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = Config::builtin().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.resolution.default_purpose, Purpose::Playback);
        assert_eq!(config.matching.threshold, 0.8);
        assert_eq!(config.logging.filter, "shirabe=info");
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.resolution.default_purpose = Purpose::Casting;
        config.resolution.preferred_servers = vec!["Streamtape".into()];
        config.search.disabled_sources = vec!["alpha".into()];
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[matching]\nthreshold = 0.9\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.matching.threshold, 0.9);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[matching]\nthreshold = 1.5\n").unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }
}
