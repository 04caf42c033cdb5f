//! Implementation of the `targetmap init` command.
//!
//! Generates a default `targetmap.yaml` with comments explaining each
//! setting.
//!
//! # Usage
//!
//! ```bash
//! # Create targetmap.yaml in current directory
//! targetmap init
//!
//! # Point it at a workspace
//! targetmap init --workspace ~/src/monorepo
//!
//! # Overwrite existing file
//! targetmap init --force
//! ```

use std::io::Write;
use std::path::Path;
use thiserror::Error;

use crate::config::CONFIG_FILE;
use crate::output;

/// Errors that can occur during initialization.
#[derive(Debug, Error)]
pub enum InitError {
    /// Configuration file already exists and --force was not specified.
    #[error("Configuration file already exists: {path}. Use --force to overwrite.")]
    FileExists { path: String },

    /// Failed to write the configuration file.
    #[error("Failed to write configuration file: {0}")]
    WriteError(#[from] std::io::Error),
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# targetmap.yaml - targetmap configuration file

# Workspace root holding BUILD.yaml package files.
# Supports ~ for home directory.
workspace: "{workspace}"

# Which attribute values to emit, by source:
#   explicit          declared on the target
#   default           fixed default of the rule class
#   computed_default  derived from other attributes or the configuration
#   unknown           depends on configuration that is not available
emit:
  - explicit

# Build configuration used to resolve select() and configuration defaults.
# Without this section every select() branch resolves as unknown.
# configuration:
#   conditions:
#     - "//config:linux"
#   values:
#     custom_malloc: "//tools:tcmalloc"

# Output file. Omit to write to stdout.
# output: "targets.json"

# Targets per batch, and how many batches are processed concurrently.
batch_size: 100
jobs: 4
"#;

/// Options for the `targetmap init` command.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Workspace root to pre-fill in the configuration.
    pub workspace: Option<String>,
    /// Output path for the configuration file.
    pub output: Option<String>,
    /// Whether to overwrite an existing file.
    pub force: bool,
}

/// Run the `targetmap init` command.
pub fn run_init(options: InitOptions) -> Result<(), InitError> {
    let output_path = options.output.unwrap_or_else(|| CONFIG_FILE.to_string());
    let path = Path::new(&output_path);

    if path.exists() && !options.force {
        return Err(InitError::FileExists { path: output_path });
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let workspace = options.workspace.unwrap_or_else(|| ".".to_string());
    let content = DEFAULT_CONFIG_TEMPLATE.replace("{workspace}", &workspace);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    output::success(&format!("Created configuration file: {}", output_path));
    output::info("Next steps:");
    output::info(&format!("  1. Edit {} to point at your workspace", output_path));
    output::info("  2. Run: targetmap format");

    Ok(())
}
