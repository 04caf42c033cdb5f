//! Build targets and their declarations.

use crate::attribute::{AttributeValue, RuleClass};
use crate::label::Label;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors related to Target building.
#[derive(Debug, Error)]
pub enum TargetBuilderError {
    #[error("Target label is required")]
    MissingLabel,

    #[error("Attribute '{attribute}' is not defined by rule class {rule_class}")]
    UnknownAttribute {
        rule_class: String,
        attribute: String,
    },
}

/// The select() condition that matches when no other condition does.
pub const DEFAULT_CONDITION: &str = "//conditions:default";

/// One `condition: value` arm of a select().
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectBranch {
    pub condition: Label,
    pub value: AttributeValue,
}

impl SelectBranch {
    pub fn new(condition: Label, value: impl Into<AttributeValue>) -> Self {
        Self {
            condition,
            value: value.into(),
        }
    }

    /// Whether this is the `//conditions:default` arm.
    pub fn is_default(&self) -> bool {
        self.condition.repository().is_none()
            && self.condition.package() == "conditions"
            && self.condition.name() == "default"
    }
}

/// A value written in a rule's declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declared {
    /// A plain value.
    Value(AttributeValue),
    /// A configurable value whose arms are chosen by the build configuration.
    Select(Vec<SelectBranch>),
}

/// A rule instance: its class plus the attribute values its declaration sets.
#[derive(Debug, Clone)]
pub struct Rule {
    class: Arc<RuleClass>,
    declared: HashMap<String, Declared>,
}

impl Rule {
    pub fn rule_class(&self) -> &RuleClass {
        &self.class
    }

    /// The declared value for `attribute`, if the declaration sets it.
    pub fn declared(&self, attribute: &str) -> Option<&Declared> {
        self.declared.get(attribute)
    }

    /// Whether the declaration sets `attribute` explicitly.
    pub fn is_explicit(&self, attribute: &str) -> bool {
        self.declared.contains_key(attribute)
    }

    /// All declared values, keyed by attribute name.
    pub fn declarations(&self) -> &HashMap<String, Declared> {
        &self.declared
    }
}

/// What a target is. Only rules carry an attribute schema.
#[derive(Debug, Clone)]
pub enum TargetKind {
    Rule(Rule),
    SourceFile,
    GeneratedFile { generating_rule: Label },
}

/// A build target in a query result.
#[derive(Debug, Clone)]
pub struct Target {
    pub label: Label,
    pub kind: TargetKind,
}

impl Target {
    /// A plain source file target.
    pub fn source_file(label: Label) -> Self {
        Self {
            label,
            kind: TargetKind::SourceFile,
        }
    }

    /// An output file of `generating_rule`.
    pub fn generated_file(label: Label, generating_rule: Label) -> Self {
        Self {
            label,
            kind: TargetKind::GeneratedFile { generating_rule },
        }
    }

    /// The rule, if this target has an attribute schema.
    pub fn rule(&self) -> Option<&Rule> {
        match &self.kind {
            TargetKind::Rule(rule) => Some(rule),
            _ => None,
        }
    }

    /// Human-readable kind, e.g. `cc_library rule` or `source file`.
    pub fn kind_name(&self) -> String {
        match &self.kind {
            TargetKind::Rule(rule) => format!("{} rule", rule.rule_class().name()),
            TargetKind::SourceFile => "source file".to_string(),
            TargetKind::GeneratedFile { .. } => "generated file".to_string(),
        }
    }
}

/// Builder for rule targets.
#[derive(Debug)]
pub struct RuleBuilder {
    class: Arc<RuleClass>,
    label: Option<Label>,
    declared: HashMap<String, Declared>,
    strict: bool,
}

impl RuleBuilder {
    /// Start a rule of the given class.
    pub fn new(class: Arc<RuleClass>) -> Self {
        Self {
            class,
            label: None,
            declared: HashMap::new(),
            strict: true,
        }
    }

    /// Set the target label.
    pub fn label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    /// Declare a plain attribute value.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.declared
            .insert(name.into(), Declared::Value(value.into()));
        self
    }

    /// Declare a select() for an attribute.
    pub fn select(mut self, name: impl Into<String>, branches: Vec<SelectBranch>) -> Self {
        self.declared.insert(name.into(), Declared::Select(branches));
        self
    }

    /// Declare a value of any shape.
    pub fn declare(mut self, name: impl Into<String>, declared: Declared) -> Self {
        self.declared.insert(name.into(), declared);
        self
    }

    /// Keep declarations for attributes the rule class does not define
    /// instead of rejecting them.
    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }

    /// Build the target. The target name is part of its label and is not an
    /// attribute.
    pub fn build(self) -> Result<Target, TargetBuilderError> {
        let label = self.label.ok_or(TargetBuilderError::MissingLabel)?;

        if self.strict {
            if let Some(unknown) = self
                .declared
                .keys()
                .find(|name| self.class.attribute(name).is_none())
            {
                return Err(TargetBuilderError::UnknownAttribute {
                    rule_class: self.class.name().to_string(),
                    attribute: unknown.clone(),
                });
            }
        }

        Ok(Target {
            label,
            kind: TargetKind::Rule(Rule {
                class: self.class,
                declared: self.declared,
            }),
        })
    }
}
