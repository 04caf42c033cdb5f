//! Error types for workspace loading.

use std::path::PathBuf;
use targetmap_graph::{LabelError, TargetBuilderError};
use thiserror::Error;

/// Errors that can occur while loading packages and rule classes.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The workspace root does not exist or is not a directory.
    #[error("Workspace root not found: {0}")]
    RootNotFound(PathBuf),

    /// Failed to read a file from disk.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// A package or rules file is not valid YAML for its schema.
    #[error("Failed to parse {path}: {source}")]
    ParseFailed {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A target name or label reference is malformed.
    #[error("Invalid label in package '{package}': {source}")]
    InvalidLabel {
        package: String,
        #[source]
        source: LabelError,
    },

    /// Two targets in one package share a name.
    #[error("Duplicate target '{name}' in package '{package}'")]
    DuplicateTarget { package: String, name: String },

    /// A rule declaration could not be turned into a target.
    #[error("Invalid rule in package '{package}': {source}")]
    InvalidRule {
        package: String,
        #[source]
        source: TargetBuilderError,
    },

    /// A rule class definition is inconsistent.
    #[error("Invalid rule class '{rule_class}': {reason}")]
    InvalidRuleClass { rule_class: String, reason: String },
}
