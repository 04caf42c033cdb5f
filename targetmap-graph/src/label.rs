//! Target labels.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors related to Label parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("Invalid label format: {0}")]
    InvalidFormat(String),

    #[error("Invalid repository name: {0}")]
    InvalidRepository(String),

    #[error("Invalid package name '{package}': {reason}")]
    InvalidPackage { package: String, reason: String },

    #[error("Invalid target name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

/// A unique, stable identifier for a build target.
///
/// Canonical format: `[@repo]//package:name`, e.g. `//pkg/util:strings`
/// or `@zlib//:zlib`. The shorthand `//pkg/util` stands for
/// `//pkg/util:util`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label {
    repository: Option<String>,
    package: String,
    name: String,
}

impl Label {
    /// Create a label in the main repository.
    pub fn new(package: &str, name: &str) -> Result<Self, LabelError> {
        validate_package(package)?;
        validate_name(name)?;
        Ok(Self {
            repository: None,
            package: package.to_string(),
            name: name.to_string(),
        })
    }

    /// Build a main-repository label from parts known to be valid.
    pub(crate) fn from_parts_unchecked(package: &str, name: &str) -> Self {
        Self {
            repository: None,
            package: package.to_string(),
            name: name.to_string(),
        }
    }

    /// Parse an absolute label string.
    pub fn parse(s: &str) -> Result<Self, LabelError> {
        let (repository, rest) = match s.strip_prefix('@') {
            Some(stripped) => {
                let (repo, rest) = stripped
                    .split_once("//")
                    .ok_or_else(|| LabelError::InvalidFormat(s.to_string()))?;
                validate_repository(repo)?;
                (Some(repo.to_string()), rest)
            }
            None => {
                let rest = s
                    .strip_prefix("//")
                    .ok_or_else(|| LabelError::InvalidFormat(s.to_string()))?;
                (None, rest)
            }
        };

        let (package, name) = match rest.split_once(':') {
            Some((package, name)) => (package, name),
            None => {
                // `//pkg/util` -> `//pkg/util:util`
                let name = rest.rsplit('/').next().unwrap_or(rest);
                if name.is_empty() {
                    return Err(LabelError::InvalidFormat(s.to_string()));
                }
                (rest, name)
            }
        };

        validate_package(package)?;
        validate_name(name)?;
        Ok(Self {
            repository,
            package: package.to_string(),
            name: name.to_string(),
        })
    }

    /// Parse a label that may be relative to `package`.
    ///
    /// Accepts absolute labels, `:name` and bare `name` forms.
    pub fn parse_relative(s: &str, package: &str) -> Result<Self, LabelError> {
        if s.starts_with("//") || s.starts_with('@') {
            return Self::parse(s);
        }
        let name = s.strip_prefix(':').unwrap_or(s);
        Self::new(package, name)
    }

    /// The external repository name, if any.
    pub fn repository(&self) -> Option<&str> {
        self.repository.as_deref()
    }

    /// The package path, e.g. `pkg/util`. Empty for the root package.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// The target name within the package.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Label of a sibling target in the same package and repository.
    pub fn sibling(&self, name: &str) -> Result<Self, LabelError> {
        validate_name(name)?;
        Ok(Self {
            repository: self.repository.clone(),
            package: self.package.clone(),
            name: name.to_string(),
        })
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(repo) = &self.repository {
            write!(f, "@{}", repo)?;
        }
        write!(f, "//{}:{}", self.package, self.name)
    }
}

impl std::str::FromStr for Label {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Label {
    type Error = LabelError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.to_string()
    }
}

fn validate_repository(repo: &str) -> Result<(), LabelError> {
    let valid = !repo.is_empty()
        && repo
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '~' | '+'));
    if valid {
        Ok(())
    } else {
        Err(LabelError::InvalidRepository(repo.to_string()))
    }
}

fn validate_package(package: &str) -> Result<(), LabelError> {
    let invalid = |reason: &str| LabelError::InvalidPackage {
        package: package.to_string(),
        reason: reason.to_string(),
    };

    if package.is_empty() {
        return Ok(());
    }
    if package.starts_with('/') || package.ends_with('/') {
        return Err(invalid("must not start or end with '/'"));
    }
    for segment in package.split('/') {
        if segment.is_empty() {
            return Err(invalid("contains an empty segment"));
        }
        if segment == "." || segment == ".." {
            return Err(invalid("contains a relative segment"));
        }
    }
    if let Some(c) = package.chars().find(|c| matches!(c, ':' | '@' | '\\')) {
        return Err(invalid(&format!("contains character '{}'", c)));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), LabelError> {
    let invalid = |reason: &str| LabelError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid("must not start or end with '/'"));
    }
    if name.contains(':') {
        return Err(invalid("contains character ':'"));
    }
    if name.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(invalid("contains a relative segment"));
    }
    Ok(())
}
