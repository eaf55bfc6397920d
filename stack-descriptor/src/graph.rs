//! Dependency graph over services and its topological orders.
//!
//! Pure logic, no I/O. Ties are broken by service name so the same descriptor
//! always yields the same order.

use crate::error::{DescriptorError, Result};
use crate::model::Descriptor;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// service -> the services it depends on
    dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptor(descriptor: &Descriptor) -> Self {
        let mut graph = Self::new();
        for (name, spec) in descriptor.services() {
            graph.add_node(name);
            for dep in spec.depends_on() {
                graph.add_edge(name, dep.service());
            }
        }
        graph
    }

    pub fn add_node(&mut self, name: &str) {
        self.dependencies.entry(name.to_string()).or_default();
    }

    /// Records that `service` depends on `dependency`.
    pub fn add_edge(&mut self, service: &str, dependency: &str) {
        self.add_node(dependency);
        self.dependencies
            .entry(service.to_string())
            .or_default()
            .insert(dependency.to_string());
    }

    pub fn dependencies_of(&self, service: &str) -> impl Iterator<Item = &str> {
        self.dependencies
            .get(service)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    /// Services that declare a dependency on `service`.
    pub fn dependents_of<'a>(&'a self, service: &'a str) -> impl Iterator<Item = &'a str> {
        self.dependencies
            .iter()
            .filter(move |(_, deps)| deps.contains(service))
            .map(|(name, _)| name.as_str())
    }

    /// Returns one cycle, as a path whose first node is repeated at the end.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            graph: &'a DependencyGraph,
            node: &'a str,
            marks: &mut BTreeMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            match marks.get(node) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|n| *n == node).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(node.to_string());
                    return Some(cycle);
                }
                None => {}
            }

            marks.insert(node, Mark::Visiting);
            path.push(node);
            for dep in graph.dependencies_of(node) {
                if let Some(cycle) = visit(graph, dep, marks, path) {
                    return Some(cycle);
                }
            }
            path.pop();
            marks.insert(node, Mark::Done);
            None
        }

        let mut marks = BTreeMap::new();
        let mut path = Vec::new();
        for node in self.dependencies.keys() {
            if let Some(cycle) = visit(self, node, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    /// Groups services into layers: every dependency of a layer-N service sits
    /// in a layer below N. Services inside one layer are independent.
    pub fn layers(&self) -> Result<Vec<Vec<String>>> {
        if let Some(cycle) = self.find_cycle() {
            return Err(DescriptorError::Cycle(cycle));
        }

        let mut remaining: BTreeMap<&str, usize> = self
            .dependencies
            .iter()
            .map(|(name, deps)| (name.as_str(), deps.len()))
            .collect();
        let mut layers = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<&str> = remaining
                .iter()
                .filter(|(_, pending)| **pending == 0)
                .map(|(name, _)| *name)
                .collect();

            // find_cycle ruled this out; guard against looping forever anyway.
            if ready.is_empty() {
                let rest = remaining.keys().map(|n| n.to_string()).collect();
                return Err(DescriptorError::Cycle(rest));
            }

            for name in &ready {
                remaining.remove(name);
                for dependent in self.dependents_of(name) {
                    if let Some(pending) = remaining.get_mut(dependent) {
                        *pending -= 1;
                    }
                }
            }
            layers.push(ready.into_iter().map(str::to_string).collect());
        }

        Ok(layers)
    }

    /// A start order in which every dependency precedes its dependents.
    pub fn start_order(&self) -> Result<Vec<String>> {
        Ok(self.layers()?.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &str)], nodes: &[&str]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for n in nodes {
            g.add_node(n);
        }
        for (service, dep) in edges {
            g.add_edge(service, dep);
        }
        g
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn dependencies_come_first() {
        let g = graph(
            &[("api", "db"), ("worker", "db"), ("web", "api"), ("api", "cache")],
            &["docs"],
        );
        let order = g.start_order().unwrap();
        assert_eq!(order.len(), 6);
        for (service, dep) in [("api", "db"), ("worker", "db"), ("web", "api"), ("api", "cache")] {
            assert!(
                position(&order, dep) < position(&order, service),
                "{} must precede {} in {:?}",
                dep,
                service,
                order
            );
        }
    }

    #[test]
    fn layers_group_independent_services() {
        let g = graph(&[("api", "db")], &["cache"]);
        let layers = g.layers().unwrap();
        assert_eq!(
            layers,
            vec![
                vec!["cache".to_string(), "db".to_string()],
                vec!["api".to_string()]
            ]
        );
    }

    #[test]
    fn two_node_cycle_is_rejected() {
        let g = graph(&[("a", "b"), ("b", "a")], &[]);
        let cycle = g.find_cycle().unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(cycle.len(), 3);
        assert!(matches!(g.start_order(), Err(DescriptorError::Cycle(_))));
    }

    #[test]
    fn longer_cycle_reports_its_path() {
        let g = graph(&[("a", "b"), ("b", "c"), ("c", "a"), ("d", "a")], &[]);
        match g.layers() {
            Err(DescriptorError::Cycle(path)) => {
                assert_eq!(path, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn dependents_lookup() {
        let g = graph(&[("api", "db"), ("worker", "db")], &[]);
        let dependents: Vec<&str> = g.dependents_of("db").collect();
        assert_eq!(dependents, vec!["api", "worker"]);
    }
}
