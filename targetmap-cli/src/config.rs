//! Configuration loading and validation for targetmap.
//!
//! This module implements the `targetmap.yaml` schema and provides utilities
//! for loading, validating, and expanding paths in the configuration.
//!
//! # Configuration File
//!
//! The file is read from the current directory by default, or from the path
//! given with `--config`. Without either, built-in defaults apply.
//!
//! # Environment Variable Overrides
//!
//! - `TARGETMAP_WORKSPACE`: Override the workspace root
//! - `TARGETMAP_OUTPUT`: Override the output file
//! - `TARGETMAP_EMIT`: Override the emitted sources (comma-separated)
//! - `TARGETMAP_BATCH_SIZE`: Override the batch size

use crate::serializers::EmitPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use targetmap_graph::{BuildConfiguration, Label, ValueSource};
use thiserror::Error;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "targetmap.yaml";

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file was not found at the specified path.
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    /// Failed to read the configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse the YAML configuration.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root configuration structure for `targetmap.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetmapConfig {
    /// Workspace root holding the package files.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Value sources to emit.
    #[serde(default = "default_emit")]
    pub emit: Vec<String>,

    /// Build configuration to resolve `select()` and configuration
    /// defaults against. Absent means no configuration is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<ConfigurationSection>,

    /// Output file. Standard output when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    /// Targets per batch handed to the writer.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent batch producers.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

/// Active conditions and named values of the build configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigurationSection {
    /// Labels of the config settings that hold.
    #[serde(default)]
    pub conditions: Vec<String>,

    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_emit() -> Vec<String> {
    vec![ValueSource::Explicit.as_str().to_string()]
}

fn default_batch_size() -> usize {
    100
}

fn default_jobs() -> usize {
    4
}

impl Default for TargetmapConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            emit: default_emit(),
            configuration: None,
            output: None,
            batch_size: default_batch_size(),
            jobs: default_jobs(),
        }
    }
}

impl TargetmapConfig {
    /// Load from `path`, or from `./targetmap.yaml` if it exists, or fall
    /// back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load_from_path(Path::new(CONFIG_FILE)),
            None => {
                tracing::debug!("No {} found, using defaults", CONFIG_FILE);
                Self::default().finish()
            }
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: TargetmapConfig = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&content)?
        };

        config.finish()
    }

    fn finish(mut self) -> Result<Self, ConfigError> {
        self.apply_env_overrides();
        self.expand_paths()?;
        self.validate()?;
        Ok(self)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from a `TARGETMAP_*` variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(workspace) = lookup("TARGETMAP_WORKSPACE") {
            self.workspace = PathBuf::from(workspace);
        }

        if let Some(output) = lookup("TARGETMAP_OUTPUT") {
            self.output = Some(PathBuf::from(output));
        }

        if let Some(emit) = lookup("TARGETMAP_EMIT") {
            self.emit = split_list(&emit);
        }

        if let Some(batch_size) = lookup("TARGETMAP_BATCH_SIZE") {
            match batch_size.parse() {
                Ok(n) => self.batch_size = n,
                Err(_) => tracing::warn!("Ignoring invalid TARGETMAP_BATCH_SIZE '{}'", batch_size),
            }
        }
    }

    /// Expand `~` in paths to the home directory.
    pub fn expand_paths(&mut self) -> Result<(), ConfigError> {
        self.workspace = expand_home(&self.workspace)?;
        if let Some(output) = &self.output {
            self.output = Some(expand_home(output)?);
        }
        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "batch_size must be at least 1".into(),
            ));
        }

        if self.jobs == 0 {
            return Err(ConfigError::ValidationError("jobs must be at least 1".into()));
        }

        if self.emit.is_empty() {
            return Err(ConfigError::ValidationError(
                "emit must name at least one value source".into(),
            ));
        }

        self.emit_sources()?;
        self.build_configuration()?;

        Ok(())
    }

    /// The value sources named by `emit`.
    pub fn emit_sources(&self) -> Result<Vec<ValueSource>, ConfigError> {
        self.emit
            .iter()
            .map(|tag| {
                tag.parse::<ValueSource>()
                    .map_err(ConfigError::ValidationError)
            })
            .collect()
    }

    pub fn emit_policy(&self) -> Result<EmitPolicy, ConfigError> {
        Ok(EmitPolicy::sources(self.emit_sources()?))
    }

    /// The build configuration, or `None` when no configuration section is
    /// present.
    pub fn build_configuration(&self) -> Result<Option<BuildConfiguration>, ConfigError> {
        let Some(section) = &self.configuration else {
            return Ok(None);
        };

        let mut configuration = BuildConfiguration::new();
        for condition in &section.conditions {
            let label = Label::parse(condition).map_err(|e| {
                ConfigError::ValidationError(format!("Invalid condition '{}': {}", condition, e))
            })?;
            configuration = configuration.with_condition(label);
        }
        for (key, value) in &section.values {
            configuration = configuration.with_value(key.clone(), value.clone());
        }

        Ok(Some(configuration))
    }

    /// The configuration section, created empty if absent.
    pub fn configuration_mut(&mut self) -> &mut ConfigurationSection {
        self.configuration.get_or_insert_with(ConfigurationSection::default)
    }
}

/// Split a comma-separated list, dropping empty items.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn expand_home(path: &Path) -> Result<PathBuf, ConfigError> {
    let Some(text) = path.to_str() else {
        return Ok(path.to_path_buf());
    };
    if text != "~" && !text.starts_with("~/") {
        return Ok(path.to_path_buf());
    }

    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::ValidationError("Cannot determine home directory".into())
    })?;
    Ok(match text.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => home,
    })
}
