//! Dependency tracking for calculated fields and validation rules

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// A node in the dependency graph.
///
/// Validation targets are kept distinct from fields so that a change never
/// schedules a validation rule for recalculation as if it were a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKey {
    /// A form field (plain input or calculation field)
    Field(String),
    /// The validation rules attached to a field
    Validation(String),
}

impl NodeKey {
    pub fn field(id: impl Into<String>) -> Self {
        NodeKey::Field(id.into())
    }

    pub fn validation(id: impl Into<String>) -> Self {
        NodeKey::Validation(id.into())
    }

    /// Field id this node belongs to
    pub fn id(&self) -> &str {
        match self {
            NodeKey::Field(id) | NodeKey::Validation(id) => id,
        }
    }

    pub fn is_field(&self) -> bool {
        matches!(self, NodeKey::Field(_))
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKey::Field(id) => write!(f, "{}", id),
            NodeKey::Validation(id) => write!(f, "{} (validation)", id),
        }
    }
}

/// Dependency graph
///
/// Tracks which targets depend on which fields, enabling recalculation in
/// dependency order. Cycles are permitted: every traversal is guarded by a
/// visited set, so a node in a cycle is reported once.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// Node → nodes that depend on it (dependents)
    dependents: BTreeMap<NodeKey, BTreeSet<NodeKey>>,
    /// Node → nodes it depends on (precedents)
    precedents: BTreeMap<NodeKey, BTreeSet<NodeKey>>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependency: dependent depends on precedent
    pub fn add_dependency(&mut self, precedent: NodeKey, dependent: NodeKey) {
        self.dependents
            .entry(precedent.clone())
            .or_default()
            .insert(dependent.clone());
        self.precedents.entry(dependent).or_default().insert(precedent);
    }

    /// Replace everything `target` depends on with `dependencies`.
    ///
    /// Nodes depending on `target` keep their edges.
    pub fn set_dependencies<I, S>(&mut self, target: NodeKey, dependencies: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clear_precedents(&target);
        for dependency in dependencies {
            self.add_dependency(NodeKey::Field(dependency.into()), target.clone());
        }
    }

    /// Remove the edges from `node` to everything it depends on
    pub fn clear_precedents(&mut self, node: &NodeKey) {
        if let Some(precedents) = self.precedents.remove(node) {
            for precedent in precedents {
                if let Some(deps) = self.dependents.get_mut(&precedent) {
                    deps.remove(node);
                    if deps.is_empty() {
                        self.dependents.remove(&precedent);
                    }
                }
            }
        }
    }

    /// Remove all dependencies for a node, in both directions
    pub fn clear_dependencies(&mut self, node: &NodeKey) {
        self.clear_precedents(node);

        // Remove as a precedent for others
        if let Some(dependents) = self.dependents.remove(node) {
            for dependent in dependents {
                if let Some(precs) = self.precedents.get_mut(&dependent) {
                    precs.remove(node);
                    if precs.is_empty() {
                        self.precedents.remove(&dependent);
                    }
                }
            }
        }
    }

    /// Get nodes that directly depend on the given node
    pub fn get_dependents<'a>(&'a self, node: &NodeKey) -> impl Iterator<Item = &'a NodeKey> + 'a {
        self.dependents.get(node).into_iter().flatten()
    }

    /// Get nodes that the given node directly depends on
    pub fn get_precedents<'a>(&'a self, node: &NodeKey) -> impl Iterator<Item = &'a NodeKey> + 'a {
        self.precedents.get(node).into_iter().flatten()
    }

    /// Every node transitively affected by a change to `changed`, in
    /// dependency order (a node comes after everything it depends on within
    /// the result). The changed nodes themselves are not included.
    pub fn get_recalc_order(&self, changed: &[NodeKey]) -> Vec<NodeKey> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut in_stack = HashSet::new();

        for node in changed {
            self.topological_sort(node, &mut result, &mut visited, &mut in_stack);
        }

        result.reverse();
        result.retain(|node| !changed.contains(node));
        result
    }

    /// Topological sort helper (DFS, post-order)
    fn topological_sort(
        &self,
        node: &NodeKey,
        result: &mut Vec<NodeKey>,
        visited: &mut HashSet<NodeKey>,
        in_stack: &mut HashSet<NodeKey>,
    ) {
        if visited.contains(node) || in_stack.contains(node) {
            return;
        }

        in_stack.insert(node.clone());

        // Visit all dependents first
        for dependent in self.get_dependents(node) {
            self.topological_sort(dependent, result, visited, in_stack);
        }

        in_stack.remove(node);
        visited.insert(node.clone());
        result.push(node.clone());
    }

    /// Does `node` take part in a dependency cycle?
    pub fn has_circular_reference(&self, node: &NodeKey) -> bool {
        let mut visited = HashSet::new();
        let mut stack: Vec<&NodeKey> = self.get_dependents(node).collect();

        while let Some(current) = stack.pop() {
            if current == node {
                return true;
            }
            if visited.insert(current) {
                stack.extend(self.get_dependents(current));
            }
        }

        false
    }

    /// All nodes that take part in a dependency cycle, sorted
    pub fn circular_nodes(&self) -> Vec<NodeKey> {
        self.precedents
            .keys()
            .filter(|node| self.has_circular_reference(node))
            .cloned()
            .collect()
    }

    /// Does the graph hold any edge?
    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty()
    }

    /// Clear the entire graph
    pub fn clear(&mut self) {
        self.dependents.clear();
        self.precedents.clear();
    }
}
