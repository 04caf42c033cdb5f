//! Workspace discovery: find every package file under a root and load it.

use crate::error::LoadError;
use crate::package::parse_package;
use crate::rules::load_rule_classes;
use std::path::{Path, PathBuf};
use targetmap_graph::{GraphError, RuleClassRegistry, Target, TargetGraph};

/// File name that marks a directory as a package.
pub const PACKAGE_FILE: &str = "BUILD.yaml";

/// Optional rule class definitions at the workspace root.
pub const RULES_FILE: &str = "rules.yaml";

/// A package that failed to load and was left out of the workspace.
#[derive(Debug)]
pub struct SkippedPackage {
    pub package: String,
    pub reason: LoadError,
}

/// Everything loaded from one workspace.
#[derive(Debug, Default)]
pub struct Workspace {
    /// Targets in package order, then declaration order within a package.
    pub targets: Vec<Target>,

    /// Packages that loaded successfully.
    pub packages: Vec<String>,

    pub skipped: Vec<SkippedPackage>,
}

impl Workspace {
    /// Build the dependency graph over all loaded targets.
    pub fn into_graph(self) -> Result<TargetGraph, GraphError> {
        TargetGraph::from_targets(self.targets)
    }
}

/// Loads packages from a workspace directory.
pub struct WorkspaceLoader {
    root: PathBuf,
    registry: RuleClassRegistry,
}

impl WorkspaceLoader {
    /// Create a loader with the built-in rule classes.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            registry: RuleClassRegistry::builtin(),
        }
    }

    pub fn with_registry(mut self, registry: RuleClassRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &RuleClassRegistry {
        &self.registry
    }

    /// Walk the workspace and load every package.
    ///
    /// A package that fails to load is recorded in [`Workspace::skipped`]
    /// and does not affect the others.
    pub fn load(mut self) -> Result<Workspace, LoadError> {
        if !self.root.is_dir() {
            return Err(LoadError::RootNotFound(self.root));
        }

        let rules_path = self.root.join(RULES_FILE);
        if rules_path.is_file() {
            let count = load_rule_classes(&rules_path, &mut self.registry)?;
            tracing::info!("Registered {} rule classes from {}", count, rules_path.display());
        }

        let mut workspace = Workspace::default();

        for entry in walkdir::WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_ignored_dir(e.file_name().to_str().unwrap_or("")))
        {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::debug!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || entry.file_name() != PACKAGE_FILE {
                continue;
            }

            let path = entry.path();
            let package = package_name(&self.root, path);

            match self.load_package(&package, path) {
                Ok(targets) => {
                    tracing::debug!("Loaded {} targets from package '{}'", targets.len(), package);
                    workspace.targets.extend(targets);
                    workspace.packages.push(package);
                }
                Err(e) => {
                    tracing::warn!("Skipping package '{}': {}", package, e);
                    workspace.skipped.push(SkippedPackage { package, reason: e });
                }
            }
        }

        tracing::info!(
            "Loaded {} targets from {} packages ({} skipped)",
            workspace.targets.len(),
            workspace.packages.len(),
            workspace.skipped.len()
        );

        Ok(workspace)
    }

    fn load_package(&self, package: &str, path: &Path) -> Result<Vec<Target>, LoadError> {
        let content = std::fs::read_to_string(path)?;
        parse_package(package, &path.display().to_string(), &content, &self.registry)
    }
}

/// Package name of a package file: its directory relative to the root,
/// with `/` separators. The root package is the empty string.
fn package_name(root: &Path, package_file: &Path) -> String {
    package_file
        .parent()
        .and_then(|dir| dir.strip_prefix(root).ok())
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

fn is_ignored_dir(name: &str) -> bool {
    matches!(name, ".git" | "target" | "node_modules") || name.starts_with("bazel-")
}
