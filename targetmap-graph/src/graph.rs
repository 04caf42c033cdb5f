//! TargetGraph - the dependency graph of a loaded workspace.

use crate::attribute::{AttrType, AttributeValue};
use crate::error::GraphError;
use crate::label::Label;
use crate::target::{Declared, Target, TargetKind};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};

/// Why one target depends on another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// Attribute holding the reference, or `generating_rule` for output files.
    pub attribute: String,
}

/// Directed graph of targets; an edge `a -> b` means `a` depends on `b`.
///
/// Targets keep their insertion order, which is the order query results
/// are produced in.
#[derive(Debug, Default)]
pub struct TargetGraph {
    inner: DiGraph<Target, DependencyEdge>,
    index: HashMap<Label, NodeIndex>,
}

impl TargetGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from targets and connect their dependencies.
    pub fn from_targets(targets: impl IntoIterator<Item = Target>) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for target in targets {
            graph.add_target(target)?;
        }
        graph.connect_dependencies();
        Ok(graph)
    }

    // === Target Operations ===

    /// Add a target. Returns error if the label is already present.
    pub fn add_target(&mut self, target: Target) -> Result<NodeIndex, GraphError> {
        if self.index.contains_key(&target.label) {
            return Err(GraphError::DuplicateTarget(target.label.to_string()));
        }

        let label = target.label.clone();
        let idx = self.inner.add_node(target);
        self.index.insert(label, idx);
        Ok(idx)
    }

    /// Get a target by label.
    pub fn get_target(&self, label: &Label) -> Option<&Target> {
        self.index.get(label).map(|&idx| &self.inner[idx])
    }

    pub fn contains(&self, label: &Label) -> bool {
        self.index.contains_key(label)
    }

    pub fn target_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Iterate over all targets in insertion order.
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.inner.node_weights()
    }

    // === Dependency Operations ===

    /// Record that `from` depends on `to` through `attribute`.
    pub fn add_dependency(
        &mut self,
        from: &Label,
        to: &Label,
        attribute: &str,
    ) -> Result<(), GraphError> {
        let from_idx = *self
            .index
            .get(from)
            .ok_or_else(|| GraphError::TargetNotFound(from.to_string()))?;
        let to_idx = *self
            .index
            .get(to)
            .ok_or_else(|| GraphError::TargetNotFound(to.to_string()))?;

        let exists = self
            .inner
            .edges_connecting(from_idx, to_idx)
            .any(|e| e.weight().attribute == attribute);
        if !exists {
            self.inner.add_edge(
                from_idx,
                to_idx,
                DependencyEdge {
                    attribute: attribute.to_string(),
                },
            );
        }
        Ok(())
    }

    /// Add edges for every label a rule declares (including all select()
    /// arms) and from generated files to their generating rules.
    ///
    /// References to targets outside the graph are ignored.
    pub fn connect_dependencies(&mut self) {
        let mut pending: Vec<(Label, Label, String)> = Vec::new();

        for target in self.inner.node_weights() {
            match &target.kind {
                TargetKind::Rule(rule) => {
                    for attribute in rule.rule_class().attributes() {
                        if attribute.attr_type != AttrType::Label {
                            continue;
                        }
                        let mut labels = Vec::new();
                        match rule.declared(&attribute.name) {
                            Some(Declared::Value(value)) => collect_labels(value, &mut labels),
                            Some(Declared::Select(branches)) => {
                                for branch in branches {
                                    collect_labels(&branch.value, &mut labels);
                                }
                            }
                            None => {}
                        }
                        for label in labels {
                            pending.push((
                                target.label.clone(),
                                label.clone(),
                                attribute.name.clone(),
                            ));
                        }
                    }
                }
                TargetKind::GeneratedFile { generating_rule } => {
                    pending.push((
                        target.label.clone(),
                        generating_rule.clone(),
                        "generating_rule".to_string(),
                    ));
                }
                TargetKind::SourceFile => {}
            }
        }

        for (from, to, attribute) in pending {
            if let Err(e) = self.add_dependency(&from, &to, &attribute) {
                tracing::debug!("{} references {} outside the graph: {}", from, to, e);
            }
        }
    }

    /// Direct dependencies of a target, in insertion order.
    pub fn dependencies(&self, label: &Label) -> Vec<&Target> {
        self.neighbors(label, Direction::Outgoing)
    }

    /// Direct dependents of a target, in insertion order.
    pub fn dependents(&self, label: &Label) -> Vec<&Target> {
        self.neighbors(label, Direction::Incoming)
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Targets reachable from `roots` (roots included) following
    /// dependency edges at most `max_depth` steps, in insertion order.
    pub fn reachable(
        &self,
        roots: &[Label],
        max_depth: Option<usize>,
    ) -> Result<Vec<&Target>, GraphError> {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();

        for root in roots {
            let idx = *self
                .index
                .get(root)
                .ok_or_else(|| GraphError::TargetNotFound(root.to_string()))?;
            if visited.insert(idx) {
                queue.push_back((idx, 0));
            }
        }

        while let Some((idx, depth)) = queue.pop_front() {
            if max_depth.is_some_and(|max| depth >= max) {
                continue;
            }
            for edge in self.inner.edges_directed(idx, Direction::Outgoing) {
                if visited.insert(edge.target()) {
                    queue.push_back((edge.target(), depth + 1));
                }
            }
        }

        let mut found: Vec<NodeIndex> = visited.into_iter().collect();
        found.sort();
        Ok(found.into_iter().map(|idx| &self.inner[idx]).collect())
    }

    fn neighbors(&self, label: &Label, direction: Direction) -> Vec<&Target> {
        let Some(&idx) = self.index.get(label) else {
            return Vec::new();
        };
        let mut found: Vec<NodeIndex> = self.inner.neighbors_directed(idx, direction).collect();
        found.sort();
        found.dedup();
        found.into_iter().map(|i| &self.inner[i]).collect()
    }
}

fn collect_labels<'v>(value: &'v AttributeValue, out: &mut Vec<&'v Label>) {
    match value {
        AttributeValue::Label(label) => out.push(label),
        AttributeValue::List(items) => {
            for item in items {
                collect_labels(item, out);
            }
        }
        _ => {}
    }
}
