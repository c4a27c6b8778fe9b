//! Configuration handling for the AnchorX CLI
//!
//! Supports loading configuration from anchorx.toml files with CLI argument overrides.

use anchorx_accel::BackendKind;
use anchorx_core::{ArenaConfig, ChainParams};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CliError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chain: ChainParams,
    #[serde(default)]
    pub arena: ArenaConfig,
    #[serde(default)]
    pub accel: AccelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default number of worker threads
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Output format for chain results ("tsv" or "json")
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccelConfig {
    /// Scoring backend: reference, emulated or rocc
    #[serde(default)]
    pub backend: BackendKind,
}

// Default value functions
fn default_threads() -> usize { num_cpus::get() }
fn default_output_format() -> String { "tsv".to_string() }

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            output_format: default_output_format(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                // Try to find anchorx.toml in current directory
                let default_path = PathBuf::from("anchorx.toml");
                if default_path.exists() {
                    log::info!("Loading configuration from: anchorx.toml");
                    Self::load_from_file(&default_path)?
                } else {
                    log::info!("Using default configuration");
                    Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CliError::file_not_found(path.to_path_buf()).into());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .map_err(CliError::from)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    /// Check values the library does not check itself
    pub fn validate(&self) -> Result<()> {
        self.chain.validate().map_err(CliError::from)?;
        if !matches!(self.general.output_format.as_str(), "tsv" | "json") {
            return Err(CliError::config(format!(
                "unknown output format '{}' (expected tsv or json)",
                self.general.output_format
            ))
            .into());
        }
        Ok(())
    }

    /// Generate example configuration file content
    pub fn example_toml() -> Result<String> {
        toml::to_string_pretty(&Self::default()).context("Failed to serialize default configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.output_format, "tsv");
        assert_eq!(config.chain.max_dist_x, 5000);
        assert_eq!(config.chain.min_count, 3);
        assert_eq!(config.arena.min_core_units, 0x80000);
        assert_eq!(config.accel.backend, BackendKind::Reference);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() -> Result<()> {
        let mut config = Config::default();
        config.chain.min_score = 25;
        config.accel.backend = BackendKind::Emulated;
        config.arena.max_memory_mb = Some(64);
        let temp_file = NamedTempFile::new()?;

        config.save_to_file(temp_file.path())?;
        let loaded = Config::load_from_file(temp_file.path())?;

        assert_eq!(loaded.chain, config.chain);
        assert_eq!(loaded.arena, config.arena);
        assert_eq!(loaded.accel.backend, BackendKind::Emulated);
        assert_eq!(loaded.general.threads, config.general.threads);

        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        std::fs::write(temp_file.path(), "[chain]\nbandwidth = 100\n\n[accel]\nbackend = \"emulated\"\n")?;
        let config = Config::load(Some(temp_file.path()))?;
        assert_eq!(config.chain.bandwidth, 100);
        assert_eq!(config.chain.max_skip, 25);
        assert_eq!(config.accel.backend, BackendKind::Emulated);
        assert_eq!(config.general.output_format, "tsv");
        Ok(())
    }

    #[test]
    fn test_invalid_values_rejected() -> Result<()> {
        let temp_file = NamedTempFile::new()?;
        std::fs::write(temp_file.path(), "[chain]\nsegment_count = 0\n")?;
        assert!(Config::load(Some(temp_file.path())).is_err());

        std::fs::write(temp_file.path(), "[general]\noutput_format = \"xml\"\n")?;
        assert!(Config::load(Some(temp_file.path())).is_err());
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load_from_file(Path::new("/nonexistent/anchorx.toml")).unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::FileNotFound { .. })));
    }

    #[test]
    fn test_example_toml_generation() {
        let example = Config::example_toml().unwrap();
        assert!(example.contains("[general]"));
        assert!(example.contains("[chain]"));
        assert!(example.contains("[arena]"));
        assert!(example.contains("backend = \"reference\""));
    }
}
