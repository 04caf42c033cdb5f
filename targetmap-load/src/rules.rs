//! `rules.yaml` rule class definitions.
//!
//! ```yaml
//! rules:
//!   - name: proto_library
//!     attributes:
//!       - { name: srcs, type: label, list: true }
//!       - { name: strip_import_prefix, type: string, default: "/" }
//!       - { name: import_prefix, type: string, default_from: strip_import_prefix }
//!       - { name: compiler, type: label, default_config: proto_compiler }
//! ```

use crate::error::LoadError;
use crate::package::convert_value;
use serde::Deserialize;
use std::path::Path;
use targetmap_graph::{AttrType, Attribute, Cardinality, DefaultValue, RuleClass, RuleClassRegistry};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RulesFile {
    #[serde(default)]
    pub rules: Vec<RuleClassDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleClassDecl {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeDecl {
    pub name: String,

    #[serde(rename = "type")]
    pub attr_type: AttrType,

    /// List attribute instead of a single value.
    #[serde(default)]
    pub list: bool,

    /// Fixed default.
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,

    /// Computed default copying another attribute.
    #[serde(default)]
    pub default_from: Option<String>,

    /// Computed default read from the build configuration.
    #[serde(default)]
    pub default_config: Option<String>,
}

/// Parse rule class definitions.
pub fn parse_rule_classes(path: &str, content: &str) -> Result<Vec<RuleClass>, LoadError> {
    let file: RulesFile = if content.trim().is_empty() {
        RulesFile::default()
    } else {
        serde_yaml::from_str(content).map_err(|source| LoadError::ParseFailed {
            path: path.to_string(),
            source,
        })?
    };

    file.rules.into_iter().map(build_rule_class).collect()
}

/// Load `path` and register its rule classes. Returns how many were added.
pub fn load_rule_classes(path: &Path, registry: &mut RuleClassRegistry) -> Result<usize, LoadError> {
    let content = std::fs::read_to_string(path)?;
    let classes = parse_rule_classes(&path.display().to_string(), &content)?;
    let count = classes.len();
    for class in classes {
        tracing::debug!("registering rule class {}", class.name());
        registry.register(class);
    }
    Ok(count)
}

fn build_rule_class(decl: RuleClassDecl) -> Result<RuleClass, LoadError> {
    let invalid = |reason: String| LoadError::InvalidRuleClass {
        rule_class: decl.name.clone(),
        reason,
    };

    let mut attributes = Vec::with_capacity(decl.attributes.len());
    for attr in &decl.attributes {
        let defaults = [
            attr.default.is_some(),
            attr.default_from.is_some(),
            attr.default_config.is_some(),
        ];
        if defaults.iter().filter(|set| **set).count() > 1 {
            return Err(invalid(format!(
                "attribute '{}' declares more than one default",
                attr.name
            )));
        }

        let default = if let Some(raw) = &attr.default {
            DefaultValue::Fixed(convert_value(raw, attr.attr_type, ""))
        } else if let Some(from) = &attr.default_from {
            if !decl.attributes.iter().any(|a| &a.name == from) {
                return Err(invalid(format!(
                    "attribute '{}' copies unknown attribute '{}'",
                    attr.name, from
                )));
            }
            DefaultValue::copy_of(from.clone())
        } else if let Some(key) = &attr.default_config {
            DefaultValue::Configuration { key: key.clone() }
        } else {
            DefaultValue::None
        };

        attributes.push(Attribute {
            name: attr.name.clone(),
            attr_type: attr.attr_type,
            cardinality: if attr.list {
                Cardinality::List
            } else {
                Cardinality::Scalar
            },
            default,
        });
    }

    Ok(RuleClass::new(decl.name.clone(), attributes))
}
