//! Track dependency graph and cycle detection.
//!
//! Edges point from a dependent track to the track it depends on. The
//! repository loads the stored edge set into a [`DependencyGraph`] and asks
//! it whether a pending dependency set for one track would close a cycle.

#![warn(missing_docs)]

use std::collections::{BTreeMap, HashSet};

use roadmap_core::{ValidationError, ValidationResult};
use tracing::debug;

/// Directed graph of track dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from `(dependent, dependency)` pairs.
    pub fn from_edges<I, A, B>(edges: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let mut graph = Self::new();
        for (from, to) in edges {
            graph.insert_edge(from, to);
        }
        graph
    }

    /// Add one edge. Duplicates are ignored.
    pub fn insert_edge(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let to = to.into();
        let deps = self.edges.entry(from.into()).or_default();
        if !deps.contains(&to) {
            deps.push(to);
        }
    }

    /// Replace every outgoing edge of `track_id`.
    pub fn set_dependencies(&mut self, track_id: &str, dependencies: &[String]) {
        if dependencies.is_empty() {
            self.edges.remove(track_id);
        } else {
            self.edges.insert(track_id.to_string(), dependencies.to_vec());
        }
    }

    /// Outgoing edges of `track_id`.
    pub fn dependencies(&self, track_id: &str) -> &[String] {
        self.edges.get(track_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// A path `from -> ... -> to` following edges, if one exists.
    pub fn path_between(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        if self.walk(from, to, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn walk(
        &self,
        node: &str,
        target: &str,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> bool {
        path.push(node.to_string());
        if node == target {
            return true;
        }
        if visited.insert(node.to_string()) {
            for next in self.dependencies(node) {
                if self.walk(next, target, visited, path) {
                    return true;
                }
            }
        }
        path.pop();
        false
    }

    /// The cycle that giving `track_id` the dependency set `pending` would
    /// close, as `track_id -> ... -> track_id`.
    ///
    /// Stored edges of `track_id` itself are irrelevant: any path back to it
    /// ends there, so only the pending edges leave the node.
    pub fn cycle_with(&self, track_id: &str, pending: &[String]) -> Option<Vec<String>> {
        for dependency in pending {
            if let Some(path) = self.path_between(dependency, track_id) {
                let mut cycle = Vec::with_capacity(path.len() + 1);
                cycle.push(track_id.to_string());
                cycle.extend(path);
                return Some(cycle);
            }
        }
        None
    }

    /// Whether `pending` as the dependency set of `track_id` would create a cycle.
    pub fn would_create_cycle(&self, track_id: &str, pending: &[String]) -> bool {
        self.cycle_with(track_id, pending).is_some()
    }

    /// Fails with [`ValidationError::DependencyCycle`] when `pending` would
    /// close a cycle through `track_id`.
    pub fn check_dependencies(&self, track_id: &str, pending: &[String]) -> ValidationResult<()> {
        match self.cycle_with(track_id, pending) {
            Some(path) => {
                debug!(track_id, cycle = %path.join(" -> "), "dependency change rejected");
                Err(ValidationError::DependencyCycle {
                    track_id: track_id.to_string(),
                    path,
                })
            }
            None => Ok(()),
        }
    }

    /// The stored cycle passing through `track_id`, if any.
    pub fn cycle_through(&self, track_id: &str) -> Option<Vec<String>> {
        self.cycle_with(track_id, self.dependencies(track_id))
    }

    /// Any cycle in the graph.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        for node in self.edges.keys() {
            if visited.contains(node.as_str()) {
                continue;
            }
            let mut stack = HashSet::new();
            let mut path = Vec::new();
            if let Some(cycle) = self.find_cycle_from(node, &mut visited, &mut stack, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    fn find_cycle_from(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        recursion_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        recursion_stack.insert(node.to_string());
        path.push(node.to_string());

        for dep in self.dependencies(node) {
            if !visited.contains(dep) {
                if let Some(cycle) = self.find_cycle_from(dep, visited, recursion_stack, path) {
                    return Some(cycle);
                }
            } else if recursion_stack.contains(dep) {
                if let Some(start) = path.iter().position(|id| id == dep) {
                    let mut cycle = path[start..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
            }
        }

        path.pop();
        recursion_stack.remove(node);
        None
    }
}
