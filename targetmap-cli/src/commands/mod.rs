//! CLI commands for targetmap.
//!
//! - `targetmap init` - Initialize a new `targetmap.yaml` configuration file
//! - `targetmap format` - Load a workspace and write its targets as JSON

pub mod format;
pub mod init;

pub use format::{FormatOptions, FormatSummary, feed_batches, run_format};
pub use init::{InitError, InitOptions, run_init};
