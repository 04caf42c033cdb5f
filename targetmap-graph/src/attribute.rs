//! Attribute schemas, values and rule classes.

use crate::label::Label;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Value type of an attribute (or of each element of a list attribute).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    String,
    Integer,
    Boolean,
    /// Reference to another target
    Label,
    /// A file produced by the rule, named within the rule's package
    Output,
    /// Mapping of strings to strings
    StringDict,
}

impl AttrType {
    /// Whether values of this type point at other targets.
    pub fn is_label_like(&self) -> bool {
        matches!(self, AttrType::Label | AttrType::Output)
    }
}

/// Whether an attribute holds one value or a list of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    #[default]
    Scalar,
    List,
}

/// A concrete attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Label(Label),
    List(Vec<AttributeValue>),
    Dict(BTreeMap<String, String>),
}

impl AttributeValue {
    /// Whether this value is a single element of type `attr_type`.
    pub fn conforms_to(&self, attr_type: AttrType) -> bool {
        matches!(
            (self, attr_type),
            (AttributeValue::String(_), AttrType::String)
                | (AttributeValue::Integer(_), AttrType::Integer)
                | (AttributeValue::Boolean(_), AttrType::Boolean)
                | (AttributeValue::Label(_), AttrType::Label | AttrType::Output)
                | (AttributeValue::Dict(_), AttrType::StringDict)
        )
    }

    /// Parse a textual value (e.g. from a configuration) as `attr_type`.
    pub fn parse_as(text: &str, attr_type: AttrType) -> Option<Self> {
        match attr_type {
            AttrType::String => Some(AttributeValue::String(text.to_string())),
            AttrType::Integer => text.trim().parse().ok().map(AttributeValue::Integer),
            AttrType::Boolean => match text.trim() {
                "true" | "True" | "1" => Some(AttributeValue::Boolean(true)),
                "false" | "False" | "0" => Some(AttributeValue::Boolean(false)),
                _ => None,
            },
            AttrType::Label | AttrType::Output => {
                Label::parse(text.trim()).ok().map(AttributeValue::Label)
            }
            AttrType::StringDict => None,
        }
    }

    /// Short name of the value's shape, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeValue::String(_) => "string",
            AttributeValue::Integer(_) => "integer",
            AttributeValue::Boolean(_) => "boolean",
            AttributeValue::Label(_) => "label",
            AttributeValue::List(_) => "list",
            AttributeValue::Dict(_) => "dict",
        }
    }
}

/// Textual form used in serialized documents.
impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{}", s),
            AttributeValue::Integer(n) => write!(f, "{}", n),
            AttributeValue::Boolean(b) => write!(f, "{}", b),
            AttributeValue::Label(l) => write!(f, "{}", l),
            AttributeValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            AttributeValue::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::Integer(n)
    }
}

impl From<i32> for AttributeValue {
    fn from(n: i32) -> Self {
        AttributeValue::Integer(n as i64)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<Label> for AttributeValue {
    fn from(l: Label) -> Self {
        AttributeValue::Label(l)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(items: Vec<T>) -> Self {
        AttributeValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// How an attribute obtains a value when the target does not declare one.
#[derive(Debug, Clone, Default)]
pub enum DefaultValue {
    /// No value at all.
    #[default]
    None,
    /// A fixed value from the rule class.
    Fixed(AttributeValue),
    /// Computed from another attribute of the same rule.
    Derived {
        from: String,
        derive: fn(&AttributeValue) -> Option<AttributeValue>,
    },
    /// Read from the build configuration under `key`.
    Configuration { key: String },
}

impl DefaultValue {
    /// A computed default that copies another attribute verbatim.
    pub fn copy_of(from: impl Into<String>) -> Self {
        DefaultValue::Derived {
            from: from.into(),
            derive: |value| Some(value.clone()),
        }
    }
}

/// One entry of a rule class's attribute schema.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub attr_type: AttrType,
    pub cardinality: Cardinality,
    pub default: DefaultValue,
}

impl Attribute {
    /// A single-valued attribute without a default.
    pub fn scalar(name: impl Into<String>, attr_type: AttrType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            cardinality: Cardinality::Scalar,
            default: DefaultValue::None,
        }
    }

    /// A list attribute without a default.
    pub fn list(name: impl Into<String>, attr_type: AttrType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            cardinality: Cardinality::List,
            default: DefaultValue::None,
        }
    }

    /// Set the default.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = default;
        self
    }

    /// Set a fixed default.
    pub fn with_fixed(self, value: impl Into<AttributeValue>) -> Self {
        self.with_default(DefaultValue::Fixed(value.into()))
    }

    pub fn is_list(&self) -> bool {
        self.cardinality == Cardinality::List
    }
}

/// A kind of rule together with its ordered attribute schema.
#[derive(Debug, Clone)]
pub struct RuleClass {
    name: String,
    attributes: Vec<Attribute>,
}

impl RuleClass {
    /// Create a rule class. The attributes every rule carries (`visibility`,
    /// `tags`, `testonly`, `deprecation`) come first.
    pub fn new(name: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        let mut all = common_attributes();
        for attribute in attributes {
            match all.iter_mut().find(|a| a.name == attribute.name) {
                Some(existing) => *existing = attribute,
                None => all.push(attribute),
            }
        }
        Self {
            name: name.into(),
            attributes: all,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attributes in declaration order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

fn common_attributes() -> Vec<Attribute> {
    vec![
        Attribute::list("visibility", AttrType::Label).with_default(DefaultValue::Fixed(
            AttributeValue::List(vec![AttributeValue::Label(private_visibility())]),
        )),
        Attribute::list("tags", AttrType::String),
        Attribute::scalar("testonly", AttrType::Boolean).with_fixed(false),
        Attribute::scalar("deprecation", AttrType::String),
    ]
}

fn private_visibility() -> Label {
    Label::from_parts_unchecked("visibility", "private")
}

/// Rule classes known to a workspace, by name.
#[derive(Debug, Clone, Default)]
pub struct RuleClassRegistry {
    classes: HashMap<String, Arc<RuleClass>>,
}

impl RuleClassRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in rule classes.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for class in builtin_rule_classes() {
            registry.register(class);
        }
        registry
    }

    /// Register a rule class, replacing any class with the same name.
    pub fn register(&mut self, class: RuleClass) -> Arc<RuleClass> {
        let class = Arc::new(class);
        self.classes
            .insert(class.name().to_string(), Arc::clone(&class));
        class
    }

    pub fn get(&self, name: &str) -> Option<Arc<RuleClass>> {
        self.classes.get(name).cloned()
    }

    /// Registered class names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn builtin_rule_classes() -> Vec<RuleClass> {
    let cc_common = || {
        vec![
            Attribute::list("srcs", AttrType::Label),
            Attribute::list("deps", AttrType::Label),
            Attribute::list("data", AttrType::Label),
            Attribute::list("copts", AttrType::String),
            Attribute::list("defines", AttrType::String),
            Attribute::list("linkopts", AttrType::String),
        ]
    };

    let mut cc_library = cc_common();
    cc_library.extend([
        Attribute::list("hdrs", AttrType::Label),
        Attribute::list("includes", AttrType::String),
        Attribute::scalar("linkstatic", AttrType::Boolean).with_fixed(false),
        Attribute::scalar("alwayslink", AttrType::Boolean).with_fixed(false),
    ]);

    let cc_executable = || {
        let mut attributes = cc_common();
        attributes.extend([
            Attribute::scalar("linkstatic", AttrType::Boolean).with_fixed(true),
            Attribute::scalar("stamp", AttrType::Integer).with_fixed(-1),
            Attribute::scalar("malloc", AttrType::Label).with_default(
                DefaultValue::Configuration {
                    key: "custom_malloc".to_string(),
                },
            ),
        ]);
        attributes
    };

    let mut cc_test = cc_executable();
    cc_test.extend([
        Attribute::scalar("size", AttrType::String).with_fixed("medium"),
        Attribute::scalar("timeout", AttrType::String).with_default(DefaultValue::Derived {
            from: "size".to_string(),
            derive: timeout_for_size,
        }),
        Attribute::scalar("flaky", AttrType::Boolean).with_fixed(false),
        Attribute::scalar("shard_count", AttrType::Integer).with_fixed(-1),
    ]);

    vec![
        RuleClass::new(
            "filegroup",
            vec![
                Attribute::list("srcs", AttrType::Label),
                Attribute::list("data", AttrType::Label),
                Attribute::scalar("output_group", AttrType::String),
            ],
        ),
        RuleClass::new("cc_library", cc_library),
        RuleClass::new("cc_binary", cc_executable()),
        RuleClass::new("cc_test", cc_test),
        RuleClass::new(
            "genrule",
            vec![
                Attribute::list("srcs", AttrType::Label),
                Attribute::list("outs", AttrType::Output),
                Attribute::scalar("cmd", AttrType::String),
                Attribute::list("tools", AttrType::Label),
                Attribute::scalar("message", AttrType::String),
                Attribute::scalar("executable", AttrType::Boolean).with_fixed(false),
            ],
        ),
        RuleClass::new(
            "sh_binary",
            vec![
                Attribute::list("srcs", AttrType::Label),
                Attribute::list("deps", AttrType::Label),
                Attribute::list("data", AttrType::Label),
                Attribute::scalar("env", AttrType::StringDict),
            ],
        ),
    ]
}

/// Test timeout implied by a test size.
fn timeout_for_size(size: &AttributeValue) -> Option<AttributeValue> {
    let timeout = match size {
        AttributeValue::String(s) => match s.as_str() {
            "small" => "short",
            "medium" => "moderate",
            "large" => "long",
            "enormous" => "eternal",
            _ => return None,
        },
        _ => return None,
    };
    Some(AttributeValue::String(timeout.to_string()))
}
