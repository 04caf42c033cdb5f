//! targetmap CLI library.
//!
//! Exposed as a library so the commands and the JSON writer can be tested
//! without spawning the binary.
//!
//! # Modules
//!
//! - [`serializers`]: JSON stream writer and emit policy
//! - [`commands`]: `init` and `format`
//! - [`config`]: Configuration loading and management
//! - [`output`] and [`logging`]: status lines and tracing setup

pub mod commands;
pub mod config;
pub mod errors;
pub mod logging;
pub mod output;
pub mod serializers;

pub use config::{ConfigError, ConfigurationSection, TargetmapConfig};
pub use errors::CommandError;
pub use serializers::{
    CloseOutcome, EmitPolicy, EmittedValue, FormatError, JsonStreamWriter, OutputCallback,
    ResultDocument,
};
