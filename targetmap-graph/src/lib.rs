//! # targetmap-graph
//!
//! Build target model and attribute resolution for targetmap.
//!
//! This crate provides:
//!
//! - **Labels**: `[@repo]//package:name` target identifiers
//! - **Rule classes**: attribute schemas with cardinality, type and defaults
//! - **Targets**: rules, source files and generated files
//! - **Resolution**: per-attribute effective values tagged with their source
//! - **TargetGraph**: dependency graph with deps()-style reachability
//!
//! ## Example
//!
//! ```rust
//! use targetmap_graph::{
//!     AttributeValueResolver, Label, RuleBuilder, RuleClassRegistry, ValueSource,
//! };
//!
//! let registry = RuleClassRegistry::builtin();
//! let target = RuleBuilder::new(registry.get("cc_library").unwrap())
//!     .label(Label::parse("//pkg:foo").unwrap())
//!     .attr("srcs", vec![Label::parse("//pkg:a.cc").unwrap()])
//!     .build()
//!     .unwrap();
//!
//! let resolver = AttributeValueResolver::new();
//! let srcs = target.rule().unwrap().rule_class().attribute("srcs").unwrap();
//! let resolved = resolver.resolve(&target, srcs);
//!
//! assert_eq!(resolved.len(), 1);
//! assert_eq!(resolved[0].source, ValueSource::Explicit);
//! assert_eq!(resolved[0].value.to_string(), "//pkg:a.cc");
//! ```

pub mod attribute;
pub mod error;
pub mod graph;
pub mod label;
pub mod resolve;
pub mod target;

pub use attribute::{
    AttrType, Attribute, AttributeValue, Cardinality, DefaultValue, RuleClass, RuleClassRegistry,
};
pub use error::{GraphError, ResolveError};
pub use graph::{DependencyEdge, TargetGraph};
pub use label::{Label, LabelError};
pub use resolve::{AttributeValueResolver, BuildConfiguration, ResolvedValue, ValueSource};
pub use target::{
    DEFAULT_CONDITION, Declared, Rule, RuleBuilder, SelectBranch, Target, TargetBuilderError,
    TargetKind,
};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Load a small package into a graph, narrow it with reachable() and
    /// resolve what would be emitted.
    #[test]
    fn test_graph_selection_and_resolution() {
        let registry = RuleClassRegistry::builtin();
        let label = |s: &str| Label::parse(s).unwrap();

        let binary = RuleBuilder::new(registry.get("cc_binary").unwrap())
            .label(label("//app:server"))
            .attr("srcs", vec![label("//app:main.cc")])
            .attr("deps", vec![label("//lib:util")])
            .build()
            .unwrap();
        let library = RuleBuilder::new(registry.get("cc_library").unwrap())
            .label(label("//lib:util"))
            .attr("hdrs", vec![label("//lib:util.h")])
            .build()
            .unwrap();

        let graph = TargetGraph::from_targets(vec![
            binary,
            Target::source_file(label("//app:main.cc")),
            library,
            Target::source_file(label("//lib:util.h")),
            Target::source_file(label("//docs:README.md")),
        ])
        .unwrap();

        let selected = graph.reachable(&[label("//app:server")], None).unwrap();
        let selected_labels: Vec<String> = selected.iter().map(|t| t.label.to_string()).collect();
        assert_eq!(
            selected_labels,
            vec!["//app:server", "//app:main.cc", "//lib:util", "//lib:util.h"]
        );

        let resolver = AttributeValueResolver::new();
        let explicit: Vec<String> = resolver
            .resolve_all(selected[0])
            .into_iter()
            .filter(|(_, values)| values.iter().any(|v| v.source == ValueSource::Explicit))
            .map(|(attribute, _)| attribute.name.clone())
            .collect();
        assert_eq!(explicit, vec!["srcs", "deps"]);
    }
}
