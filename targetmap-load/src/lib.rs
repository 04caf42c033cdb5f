//! Workspace loading for targetmap.
//!
//! Turns a directory tree of `BUILD.yaml` package files into the targets of
//! [`targetmap_graph`].
//!
//! # Overview
//!
//! - **Discovery**: walks the workspace, skipping VCS and build output
//!   directories, and treats each directory holding a package file as a package
//! - **Packages**: rules, source files and the generated files rules declare
//! - **Rule classes**: the built-in registry, extended by an optional
//!   `rules.yaml` at the workspace root
//!
//! A package that fails to parse is logged and skipped; the rest of the
//! workspace still loads.
//!
//! # Modules
//!
//! - [`loader`]: workspace walk and [`Workspace`] result
//! - [`package`]: package file parsing
//! - [`rules`]: rule class definitions

pub mod error;
pub mod loader;
pub mod package;
pub mod rules;

pub use error::LoadError;
pub use loader::{PACKAGE_FILE, RULES_FILE, SkippedPackage, Workspace, WorkspaceLoader};
pub use package::parse_package;
pub use rules::{load_rule_classes, parse_rule_classes};
