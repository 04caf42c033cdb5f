use crate::commands::init::InitError;
use crate::config::ConfigError;
use crate::serializers::FormatError;
use targetmap_graph::GraphError;
use targetmap_load::LoadError;
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Failed to load workspace: {0}")]
    Load(#[from] LoadError),

    #[error("{0}")]
    Graph(#[from] GraphError),

    #[error("{0}")]
    Format(#[from] FormatError),

    #[error("{0}")]
    Init(#[from] InitError),

    #[error("Invalid value for {flag}: {reason}")]
    InvalidArgument { flag: &'static str, reason: String },

    #[error("Failed to open output file {path}: {source}")]
    OutputFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Batch producer failed: {0}")]
    Producer(String),

    #[error("Failed to create tokio runtime: {0}")]
    Runtime(std::io::Error),
}

impl CommandError {
    /// Get a suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            CommandError::Config(ConfigError::NotFound(_)) => Some(
                "Run 'targetmap init' to create a configuration file, or omit --config to use defaults",
            ),
            CommandError::Config(_) => {
                Some("Check targetmap.yaml and the TARGETMAP_* environment variables.")
            }
            CommandError::Load(LoadError::RootNotFound(_)) => {
                Some("Pass the workspace directory with --workspace or set 'workspace' in targetmap.yaml.")
            }
            CommandError::Load(_) => Some("Fix the rule class definitions in rules.yaml."),
            CommandError::Graph(GraphError::TargetNotFound(_)) => Some(
                "Check the --root label. Packages that failed to load are listed as warnings above.",
            ),
            CommandError::Graph(_) => None,
            CommandError::Format(FormatError::Write(_)) | CommandError::OutputFile { .. } => {
                Some("Check that the output path is writable, or omit --output to write to stdout.")
            }
            CommandError::Format(_) => None,
            CommandError::Init(InitError::FileExists { .. }) => {
                Some("Use --force to overwrite the existing file.")
            }
            CommandError::Init(_) => None,
            CommandError::InvalidArgument { .. } => Some("Run 'targetmap format --help' for usage."),
            CommandError::Producer(_) => {
                Some("No output was written. Re-run with --verbose for details.")
            }
            CommandError::Runtime(_) => None,
        }
    }

    /// Format error with suggestion for CLI output
    pub fn format_for_cli(&self) -> String {
        let mut output = format!("Error: {}", self);

        if let Some(suggestion) = self.suggestion() {
            output.push_str(&format!("\n\nSuggestion: {}", suggestion));
        }

        output
    }
}
