//! Attribute value resolution.
//!
//! Decides, for one (target, attribute) pair, where the attribute's value
//! comes from and what the concrete value(s) are:
//!
//! - **Explicit**: the target's declaration sets it
//! - **Default**: a fixed default of the rule class
//! - **ComputedDefault**: derived from another attribute or the build configuration
//! - **Unknown**: depends on build configuration that is not available
//!
//! List values are decomposed into one [`ResolvedValue`] per element.
//! Resolution never fails: malformed declarations resolve to nothing and are
//! logged at debug level. [`AttributeValueResolver::try_resolve`] exposes the
//! underlying [`ResolveError`] for callers that want it.

use crate::attribute::{Attribute, AttributeValue, Cardinality, DefaultValue};
use crate::error::ResolveError;
use crate::label::Label;
use crate::target::{Declared, Rule, SelectBranch, Target};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Where a resolved attribute value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Set by the target's declaration.
    Explicit,
    /// Fixed default of the rule class.
    Default,
    /// Derived from other attributes or from the build configuration.
    ComputedDefault,
    /// Depends on build configuration that is not available.
    Unknown,
}

impl ValueSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueSource::Explicit => "explicit",
            ValueSource::Default => "default",
            ValueSource::ComputedDefault => "computed_default",
            ValueSource::Unknown => "unknown",
        }
    }

    /// All sources, in declaration order.
    pub fn all() -> [ValueSource; 4] {
        [
            ValueSource::Explicit,
            ValueSource::Default,
            ValueSource::ComputedDefault,
            ValueSource::Unknown,
        ]
    }
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ValueSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "explicit" | "rule" => Ok(ValueSource::Explicit),
            "default" => Ok(ValueSource::Default),
            "computed_default" | "computed" => Ok(ValueSource::ComputedDefault),
            "unknown" => Ok(ValueSource::Unknown),
            other => Err(format!(
                "unknown value source '{}'; expected explicit, default, computed_default or unknown",
                other
            )),
        }
    }
}

/// One concrete value of an attribute, tagged with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedValue {
    pub value: AttributeValue,
    pub source: ValueSource,
}

/// The build configuration a resolution runs under.
///
/// `conditions` are the labels of the config settings that hold; `values`
/// are named configuration values (e.g. `custom_malloc`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildConfiguration {
    conditions: BTreeSet<Label>,
    values: BTreeMap<String, String>,
}

impl BuildConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a config setting as active.
    pub fn with_condition(mut self, condition: Label) -> Self {
        self.conditions.insert(condition);
        self
    }

    /// Set a named configuration value.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn is_active(&self, condition: &Label) -> bool {
        self.conditions.contains(condition)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Label> {
        self.conditions.iter()
    }
}

/// Resolves attribute values of targets.
///
/// Resolution is a pure function of the target, the attribute and the
/// configuration, so one resolver can be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct AttributeValueResolver {
    configuration: Option<Arc<BuildConfiguration>>,
}

impl AttributeValueResolver {
    /// A resolver without configuration context: select() values and
    /// configuration-computed defaults are unknown.
    pub fn new() -> Self {
        Self::default()
    }

    /// A resolver for a concrete build configuration.
    pub fn with_configuration(configuration: BuildConfiguration) -> Self {
        Self {
            configuration: Some(Arc::new(configuration)),
        }
    }

    pub fn configuration(&self) -> Option<&BuildConfiguration> {
        self.configuration.as_deref()
    }

    /// Resolve `attribute` on `target`.
    ///
    /// Returns nothing for targets without an attribute schema and for
    /// attributes whose data cannot be resolved.
    pub fn resolve(&self, target: &Target, attribute: &Attribute) -> Vec<ResolvedValue> {
        let Some(rule) = target.rule() else {
            return Vec::new();
        };

        match self.try_resolve(rule, attribute) {
            Ok(values) => values,
            Err(e) => {
                tracing::debug!(
                    label = %target.label,
                    attribute = %attribute.name,
                    "attribute resolved to no value: {}",
                    e
                );
                Vec::new()
            }
        }
    }

    /// Resolve every schema attribute of `target`, in schema order.
    pub fn resolve_all<'t>(&self, target: &'t Target) -> Vec<(&'t Attribute, Vec<ResolvedValue>)> {
        match target.rule() {
            Some(rule) => rule
                .rule_class()
                .attributes()
                .iter()
                .map(|attribute| (attribute, self.resolve(target, attribute)))
                .collect(),
            None => Vec::new(),
        }
    }

    /// The source of the declaration `attribute` resolves through.
    ///
    /// Unlike the per-value tags from [`Self::resolve`], this survives a
    /// declaration that resolves to an empty list. `None` when nothing
    /// supplies a value or the attribute does not resolve.
    pub fn declaration_source(
        &self,
        target: &Target,
        attribute: &Attribute,
    ) -> Option<ValueSource> {
        let rule = target.rule()?;
        self.try_resolve(rule, attribute).ok()?;
        self.declaration_source_in(rule, attribute)
    }

    fn declaration_source_in(&self, rule: &Rule, attribute: &Attribute) -> Option<ValueSource> {
        match rule.declared(&attribute.name) {
            Some(Declared::Value(_)) => Some(ValueSource::Explicit),
            Some(Declared::Select(_)) => match self.configuration {
                Some(_) => Some(ValueSource::Explicit),
                None => Some(ValueSource::Unknown),
            },
            None => match &attribute.default {
                DefaultValue::None => None,
                DefaultValue::Fixed(_) => Some(ValueSource::Default),
                DefaultValue::Derived { from, .. } => {
                    let input = rule.rule_class().attribute(from)?;
                    match self.declaration_source_in(rule, input)? {
                        ValueSource::Unknown => Some(ValueSource::Unknown),
                        _ => Some(ValueSource::ComputedDefault),
                    }
                }
                DefaultValue::Configuration { key } => self
                    .configuration
                    .as_deref()
                    .and_then(|c| c.value(key))
                    .map(|_| ValueSource::ComputedDefault),
            },
        }
    }

    /// Resolve `attribute` on `rule`, reporting why resolution failed.
    pub fn try_resolve(
        &self,
        rule: &Rule,
        attribute: &Attribute,
    ) -> Result<Vec<ResolvedValue>, ResolveError> {
        let attribute = rule
            .rule_class()
            .attribute(&attribute.name)
            .ok_or_else(|| ResolveError::UnknownAttribute(attribute.name.clone()))?;
        self.resolve_in(rule, attribute, &mut Vec::new())
    }

    fn resolve_in<'a>(
        &self,
        rule: &'a Rule,
        attribute: &'a Attribute,
        deriving: &mut Vec<&'a str>,
    ) -> Result<Vec<ResolvedValue>, ResolveError> {
        match rule.declared(&attribute.name) {
            Some(Declared::Value(value)) => decompose(attribute, value, ValueSource::Explicit),
            Some(Declared::Select(branches)) => self.resolve_select(attribute, branches),
            None => self.resolve_default(rule, attribute, deriving),
        }
    }

    fn resolve_select(
        &self,
        attribute: &Attribute,
        branches: &[SelectBranch],
    ) -> Result<Vec<ResolvedValue>, ResolveError> {
        let Some(configuration) = self.configuration.as_deref() else {
            let mut values = Vec::new();
            for branch in branches {
                values.extend(decompose(attribute, &branch.value, ValueSource::Unknown)?);
            }
            return Ok(values);
        };

        let matching: Vec<&SelectBranch> = branches
            .iter()
            .filter(|b| !b.is_default() && configuration.is_active(&b.condition))
            .collect();

        match matching.as_slice() {
            [branch] => decompose(attribute, &branch.value, ValueSource::Explicit),
            [] => match branches.iter().find(|b| b.is_default()) {
                Some(branch) => decompose(attribute, &branch.value, ValueSource::Explicit),
                None => Err(ResolveError::NoMatchingCondition(attribute.name.clone())),
            },
            _ => Err(ResolveError::AmbiguousSelect {
                attribute: attribute.name.clone(),
                conditions: matching.iter().map(|b| b.condition.to_string()).collect(),
            }),
        }
    }

    fn resolve_default<'a>(
        &self,
        rule: &'a Rule,
        attribute: &'a Attribute,
        deriving: &mut Vec<&'a str>,
    ) -> Result<Vec<ResolvedValue>, ResolveError> {
        match &attribute.default {
            DefaultValue::None => Ok(Vec::new()),
            DefaultValue::Fixed(value) => decompose(attribute, value, ValueSource::Default),
            DefaultValue::Derived { from, derive } => {
                if deriving.contains(&attribute.name.as_str()) {
                    return Err(ResolveError::DefaultCycle(attribute.name.clone()));
                }
                let input_attribute = rule
                    .rule_class()
                    .attribute(from)
                    .ok_or_else(|| ResolveError::UnknownAttribute(from.clone()))?;

                deriving.push(&attribute.name);
                let inputs = self.resolve_in(rule, input_attribute, deriving);
                deriving.pop();
                let inputs = inputs?;

                if inputs.is_empty() {
                    return Ok(Vec::new());
                }

                if input_attribute.is_list() {
                    let source = derived_source(&inputs);
                    let list = AttributeValue::List(inputs.into_iter().map(|v| v.value).collect());
                    return match derive(&list) {
                        Some(derived) => decompose(attribute, &derived, source),
                        None => Ok(Vec::new()),
                    };
                }

                // A scalar input only has several candidates when it is an
                // unresolved select(); derive each of them.
                let mut values = Vec::new();
                for input in inputs {
                    if let Some(derived) = derive(&input.value) {
                        let source = derived_source(std::slice::from_ref(&input));
                        values.extend(decompose(attribute, &derived, source)?);
                    }
                }
                Ok(values)
            }
            DefaultValue::Configuration { key } => {
                let Some(text) = self.configuration.as_deref().and_then(|c| c.value(key)) else {
                    return Ok(Vec::new());
                };
                let parsed = match attribute.cardinality {
                    Cardinality::Scalar => AttributeValue::parse_as(text, attribute.attr_type),
                    Cardinality::List => text
                        .split(',')
                        .map(str::trim)
                        .filter(|item| !item.is_empty())
                        .map(|item| AttributeValue::parse_as(item, attribute.attr_type))
                        .collect::<Option<Vec<_>>>()
                        .map(AttributeValue::List),
                };
                match parsed {
                    Some(value) => decompose(attribute, &value, ValueSource::ComputedDefault),
                    None => Err(ResolveError::TypeMismatch {
                        attribute: attribute.name.clone(),
                        expected: attribute.attr_type,
                        actual: "string",
                    }),
                }
            }
        }
    }
}

fn derived_source(inputs: &[ResolvedValue]) -> ValueSource {
    if inputs.iter().any(|v| v.source == ValueSource::Unknown) {
        ValueSource::Unknown
    } else {
        ValueSource::ComputedDefault
    }
}

/// Split a value into per-element resolved values, checking it against the schema.
fn decompose(
    attribute: &Attribute,
    value: &AttributeValue,
    source: ValueSource,
) -> Result<Vec<ResolvedValue>, ResolveError> {
    match (attribute.cardinality, value) {
        (Cardinality::List, AttributeValue::List(items)) => items
            .iter()
            .map(|item| -> Result<ResolvedValue, ResolveError> {
                check_type(attribute, item)?;
                Ok(ResolvedValue {
                    value: item.clone(),
                    source,
                })
            })
            .collect(),
        (Cardinality::List, _) => Err(ResolveError::ExpectedList(attribute.name.clone())),
        (Cardinality::Scalar, AttributeValue::List(_)) => {
            Err(ResolveError::UnexpectedList(attribute.name.clone()))
        }
        (Cardinality::Scalar, value) => {
            check_type(attribute, value)?;
            Ok(vec![ResolvedValue {
                value: value.clone(),
                source,
            }])
        }
    }
}

fn check_type(attribute: &Attribute, value: &AttributeValue) -> Result<(), ResolveError> {
    if value.conforms_to(attribute.attr_type) {
        Ok(())
    } else {
        Err(ResolveError::TypeMismatch {
            attribute: attribute.name.clone(),
            expected: attribute.attr_type,
            actual: value.kind(),
        })
    }
}
