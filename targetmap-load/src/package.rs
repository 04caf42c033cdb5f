//! `BUILD.yaml` package files.
//!
//! A package file declares the targets of one package:
//!
//! ```yaml
//! files: [a.cc, b.cc, README.md]
//! rules:
//!   - rule: cc_library
//!     name: foo
//!     srcs: [a.cc, b.cc]
//!     deps: [":bar", "//third_party:zlib"]
//!     copts:
//!       select:
//!         "//config:linux": ["-DLINUX"]
//!         "//conditions:default": []
//! ```
//!
//! Every rule becomes a rule target, every listed file a source file target,
//! and every `outs` entry of a rule a generated file target.

use crate::error::LoadError;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::{BTreeMap, HashSet};
use targetmap_graph::{
    AttrType, Attribute, AttributeValue, Declared, Label, RuleBuilder, RuleClassRegistry,
    SelectBranch, Target,
};

/// Raw contents of a package file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageFile {
    #[serde(default)]
    pub files: Vec<String>,

    #[serde(default)]
    pub rules: Vec<RuleDecl>,
}

/// One rule declaration; every key besides `rule` and `name` is an attribute.
#[derive(Debug, Deserialize)]
pub struct RuleDecl {
    pub rule: String,
    pub name: String,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

/// Parse a package file and build its targets.
///
/// Rules of unknown classes and attributes their class does not define are
/// skipped with a warning; label and naming errors fail the whole package.
pub fn parse_package(
    package: &str,
    path: &str,
    content: &str,
    registry: &RuleClassRegistry,
) -> Result<Vec<Target>, LoadError> {
    let file: PackageFile = if content.trim().is_empty() {
        PackageFile::default()
    } else {
        serde_yaml::from_str(content).map_err(|source| LoadError::ParseFailed {
            path: path.to_string(),
            source,
        })?
    };

    let mut builder = PackageBuilder::new(package);

    for name in &file.files {
        let label = builder.label(name)?;
        builder.push(Target::source_file(label))?;
    }

    for decl in &file.rules {
        let Some(class) = registry.get(&decl.rule) else {
            tracing::warn!(
                "{}: unknown rule class '{}' for target '{}', skipping",
                path,
                decl.rule,
                decl.name
            );
            continue;
        };

        let label = builder.label(&decl.name)?;
        let mut rule = RuleBuilder::new(class.clone()).label(label.clone());
        let mut outputs = Vec::new();

        for (name, raw) in &decl.attributes {
            let Some(attribute) = class.attribute(name) else {
                tracing::warn!(
                    "{}: {} rule '{}' has no attribute '{}', ignoring it",
                    path,
                    decl.rule,
                    decl.name,
                    name
                );
                continue;
            };
            let Some(declared) = convert_declared(raw, attribute, package)? else {
                continue;
            };
            if attribute.attr_type == AttrType::Output {
                collect_outputs(&declared, &mut outputs);
            }
            rule = rule.declare(name.clone(), declared);
        }

        let target = rule.build().map_err(|source| LoadError::InvalidRule {
            package: package.to_string(),
            source,
        })?;
        builder.push(target)?;

        for output in outputs {
            builder.push(Target::generated_file(output, label.clone()))?;
        }
    }

    Ok(builder.targets)
}

/// Collects the targets of one package, rejecting duplicate names.
struct PackageBuilder<'p> {
    package: &'p str,
    names: HashSet<String>,
    targets: Vec<Target>,
}

impl<'p> PackageBuilder<'p> {
    fn new(package: &'p str) -> Self {
        Self {
            package,
            names: HashSet::new(),
            targets: Vec::new(),
        }
    }

    fn label(&self, name: &str) -> Result<Label, LoadError> {
        Label::new(self.package, name).map_err(|source| LoadError::InvalidLabel {
            package: self.package.to_string(),
            source,
        })
    }

    fn push(&mut self, target: Target) -> Result<(), LoadError> {
        if !self.names.insert(target.label.name().to_string()) {
            return Err(LoadError::DuplicateTarget {
                package: self.package.to_string(),
                name: target.label.name().to_string(),
            });
        }
        self.targets.push(target);
        Ok(())
    }
}

/// Turn a declared YAML value into a declaration.
///
/// `null` means "not set". A mapping with the single key `select` is a
/// configurable value.
fn convert_declared(
    raw: &Value,
    attribute: &Attribute,
    package: &str,
) -> Result<Option<Declared>, LoadError> {
    if raw.is_null() {
        return Ok(None);
    }

    if let Some(arms) = select_arms(raw) {
        let mut branches = Vec::with_capacity(arms.len());
        for (condition, value) in arms {
            let condition = scalar_text(condition);
            if value.is_null() {
                tracing::debug!("select() arm '{}' of '{}' is null, dropping it", condition, attribute.name);
                continue;
            }
            let condition = Label::parse_relative(&condition, package).map_err(|source| {
                LoadError::InvalidLabel {
                    package: package.to_string(),
                    source,
                }
            })?;
            branches.push(SelectBranch::new(
                condition,
                convert_value(value, attribute.attr_type, package),
            ));
        }
        return Ok(Some(Declared::Select(branches)));
    }

    Ok(Some(Declared::Value(convert_value(
        raw,
        attribute.attr_type,
        package,
    ))))
}

fn select_arms(raw: &Value) -> Option<&serde_yaml::Mapping> {
    let mapping = raw.as_mapping()?;
    if mapping.len() != 1 {
        return None;
    }
    mapping.get("select")?.as_mapping()
}

/// Convert a YAML value shaped by `attr_type`.
///
/// Strings for label-typed attributes become labels relative to `package`;
/// strings that are not valid labels are kept as strings, so the mismatch
/// surfaces during resolution instead of failing the package.
pub(crate) fn convert_value(raw: &Value, attr_type: AttrType, package: &str) -> AttributeValue {
    match raw {
        Value::String(s) => match attr_type {
            AttrType::Label => Label::parse_relative(s, package)
                .map(AttributeValue::Label)
                .unwrap_or_else(|_| AttributeValue::String(s.clone())),
            AttrType::Output => Label::new(package, s)
                .map(AttributeValue::Label)
                .unwrap_or_else(|_| AttributeValue::String(s.clone())),
            _ => AttributeValue::String(s.clone()),
        },
        Value::Bool(b) => AttributeValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Integer(i),
            None => AttributeValue::String(n.to_string()),
        },
        Value::Sequence(items) => AttributeValue::List(
            items
                .iter()
                .map(|item| convert_value(item, attr_type, package))
                .collect(),
        ),
        Value::Mapping(entries) => AttributeValue::Dict(
            entries
                .iter()
                .map(|(k, v)| (scalar_text(k), scalar_text(v)))
                .collect(),
        ),
        Value::Tagged(tagged) => convert_value(&tagged.value, attr_type, package),
        Value::Null => AttributeValue::String(String::new()),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn collect_outputs(declared: &Declared, out: &mut Vec<Label>) {
    let mut push = |value: &AttributeValue| match value {
        AttributeValue::Label(label) => out.push(label.clone()),
        AttributeValue::List(items) => {
            for item in items {
                if let AttributeValue::Label(label) = item {
                    out.push(label.clone());
                }
            }
        }
        _ => {}
    };
    match declared {
        Declared::Value(value) => push(value),
        Declared::Select(branches) => {
            for branch in branches {
                push(&branch.value);
            }
        }
    }
    // The same output may appear in several select() arms.
    let mut seen = HashSet::new();
    out.retain(|label| seen.insert(label.clone()));
}
