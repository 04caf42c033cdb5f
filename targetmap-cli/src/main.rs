//! targetmap - Render build targets and their attributes as JSON.
//!
//! Loads a workspace of `BUILD.yaml` packages, resolves each target's
//! attribute values and writes one JSON object mapping labels to the values
//! selected by the emit policy.
//!
//! # Commands
//!
//! - `targetmap init` - Initialize a new configuration file
//! - `targetmap format` - Write targets and attributes as JSON
//!
//! # Usage
//!
//! ```bash
//! targetmap init
//! targetmap format --root //app:server --output targets.json
//! ```

use clap::{Parser, Subcommand};
use targetmap_cli::commands::{self, FormatOptions, InitOptions};
use targetmap_cli::errors::CommandError;
use targetmap_cli::{logging, output};

/// targetmap - Render build targets and their attributes as JSON
#[derive(Parser)]
#[command(name = "targetmap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new targetmap.yaml configuration file
    Init {
        /// Workspace root to pre-fill in the configuration
        #[arg(long)]
        workspace: Option<String>,

        /// Output path for the configuration file
        #[arg(long, short)]
        output: Option<String>,

        /// Overwrite existing configuration file
        #[arg(long, short)]
        force: bool,
    },

    /// Write targets and their attribute values as JSON
    Format {
        /// Path to the configuration file
        #[arg(long, short)]
        config: Option<String>,

        /// Override workspace root
        #[arg(long, short)]
        workspace: Option<String>,

        /// Only targets reachable from this label (repeatable)
        #[arg(long = "root", short = 'r', value_name = "LABEL")]
        roots: Vec<String>,

        /// Maximum dependency depth from the roots
        #[arg(long, requires = "roots")]
        depth: Option<usize>,

        /// Value sources to emit (comma-separated: explicit,default,computed_default,unknown)
        #[arg(long, short)]
        emit: Option<String>,

        /// Mark a config setting label as active (repeatable)
        #[arg(long = "define", short = 'D', value_name = "LABEL")]
        defines: Vec<String>,

        /// Set a configuration value (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        sets: Vec<String>,

        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<String>,

        /// Targets per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Concurrent batch producers
        #[arg(long, short)]
        jobs: Option<usize>,

        /// Show detailed progress
        #[arg(long, short, conflicts_with = "quiet")]
        verbose: bool,

        /// Only print errors
        #[arg(long, short)]
        quiet: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init {
            workspace,
            output,
            force,
        } => {
            logging::init(false);
            let options = InitOptions {
                workspace,
                output,
                force,
            };
            commands::run_init(options).map_err(CommandError::from)
        }
        Commands::Format {
            config,
            workspace,
            roots,
            depth,
            emit,
            defines,
            sets,
            output: output_path,
            batch_size,
            jobs,
            verbose,
            quiet,
        } => {
            logging::init(verbose);
            output::set_quiet(quiet);
            output::set_verbosity(u8::from(verbose));

            let options = FormatOptions {
                config,
                workspace,
                roots,
                depth,
                emit,
                defines,
                sets,
                output: output_path,
                batch_size,
                jobs,
            };
            // Batches are fed from blocking tasks on a tokio runtime
            match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime
                    .block_on(commands::run_format(options))
                    .map(|summary| {
                        output::verbose(&format!(
                            "Formatted {} targets in {} batches ({} packages skipped)",
                            summary.targets, summary.batches, summary.skipped_packages
                        ));
                    }),
                Err(e) => Err(CommandError::Runtime(e)),
            }
        }
    };

    if let Err(e) = result {
        output::error(&e.format_for_cli());
        std::process::exit(1);
    }
}
