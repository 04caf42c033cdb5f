//! Error types for the targetmap-graph crate.

use crate::attribute::AttrType;
use crate::label::LabelError;
use crate::target::TargetBuilderError;
use thiserror::Error;

/// Reasons an attribute value could not be resolved.
///
/// These never escape [`AttributeValueResolver::resolve`](crate::AttributeValueResolver::resolve);
/// they are logged and the attribute resolves to nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Attribute '{0}' is not part of the rule's schema")]
    UnknownAttribute(String),

    #[error("Attribute '{attribute}' expects {expected:?} values, got {actual}")]
    TypeMismatch {
        attribute: String,
        expected: AttrType,
        actual: &'static str,
    },

    #[error("Attribute '{0}' is a list attribute but was given a single value")]
    ExpectedList(String),

    #[error("Attribute '{0}' takes a single value but was given a list")]
    UnexpectedList(String),

    #[error("Attribute '{attribute}' has ambiguous select() conditions: {conditions:?}")]
    AmbiguousSelect {
        attribute: String,
        conditions: Vec<String>,
    },

    #[error("No select() condition matches for attribute '{0}' and no default is given")]
    NoMatchingCondition(String),

    #[error("Computed default cycle through attribute '{0}'")]
    DefaultCycle(String),
}

/// Errors related to TargetGraph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Target already exists: {0}")]
    DuplicateTarget(String),

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Label error: {0}")]
    LabelError(#[from] LabelError),

    #[error("Target builder error: {0}")]
    TargetBuilderError(#[from] TargetBuilderError),
}
