//! Priority weights.
//!
//! A job's weight grows with the number of jobs that transitively depend on
//! it, so upstream producers are scheduled ahead of their consumers.

use dagforge_core::Result;
use dagforge_core::graph::{DependencyGraph, JobKey};
use std::collections::BTreeMap;

pub const BASE_PRIORITY_WEIGHT: u32 = 1;
pub const PRIORITY_WEIGHT_GAP: u32 = 10;
pub const MAX_PRIORITY_WEIGHT: u32 = 10_000;

/// Weight of a job with `fan_in` transitive dependents.
pub fn priority_weight(fan_in: usize) -> u32 {
    let fan_in = u32::try_from(fan_in).unwrap_or(u32::MAX);
    fan_in
        .saturating_mul(PRIORITY_WEIGHT_GAP)
        .saturating_add(BASE_PRIORITY_WEIGHT)
        .min(MAX_PRIORITY_WEIGHT)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityResolver;

impl PriorityResolver {
    /// Weight for every node of an acyclic graph.
    pub fn resolve(&self, graph: &DependencyGraph) -> Result<BTreeMap<JobKey, u32>> {
        graph.ensure_acyclic()?;
        Ok(graph
            .transitive_fan_in()
            .into_iter()
            .map(|(key, fan_in)| (key, priority_weight(fan_in)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::tests::make_job;
    use dagforge_core::Error;
    use dagforge_core::graph::DependencyKind;

    fn graph(edges: &[(&str, &str)], nodes: &[&str]) -> DependencyGraph {
        let mut graph = DependencyGraph::new("p");
        for name in nodes {
            graph.add_node(JobKey::new("p", *name), make_job(name, &[]));
        }
        for (source, target) in edges {
            graph
                .add_edge(
                    JobKey::new("p", *source),
                    JobKey::new("p", *target),
                    DependencyKind::Explicit,
                )
                .unwrap();
        }
        graph
    }

    fn weight(weights: &BTreeMap<JobKey, u32>, job: &str) -> u32 {
        weights[&JobKey::new("p", job)]
    }

    #[test]
    fn test_fan_out() {
        let g = graph(&[("b", "a"), ("c", "a")], &["a", "b", "c"]);
        let weights = PriorityResolver.resolve(&g).unwrap();
        assert_eq!(weight(&weights, "a"), 21);
        assert_eq!(weight(&weights, "b"), 1);
        assert_eq!(weight(&weights, "c"), 1);
    }

    #[test]
    fn test_chain_counts_transitive_dependents() {
        let g = graph(&[("b", "a"), ("c", "b"), ("d", "b")], &["a", "b", "c", "d"]);
        let weights = PriorityResolver.resolve(&g).unwrap();
        assert_eq!(weight(&weights, "a"), 31);
        assert_eq!(weight(&weights, "b"), 21);
    }

    #[test]
    fn test_diamond_counts_each_dependent_once() {
        let g = graph(
            &[("b", "a"), ("c", "a"), ("d", "b"), ("d", "c")],
            &["a", "b", "c", "d"],
        );
        let weights = PriorityResolver.resolve(&g).unwrap();
        assert_eq!(weight(&weights, "a"), 31);
    }

    #[test]
    fn test_wide_graph_weighs_every_node() {
        let names: Vec<String> = (0..500).map(|i| format!("leaf{:03}", i)).collect();
        let mut nodes: Vec<&str> = names.iter().map(String::as_str).collect();
        nodes.push("root");
        let edges: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "root")).collect();

        let weights = PriorityResolver.resolve(&graph(&edges, &nodes)).unwrap();
        assert_eq!(weights.len(), 501);
        assert_eq!(weight(&weights, "root"), 5001);
        assert_eq!(weight(&weights, "leaf000"), 1);
    }

    #[test]
    fn test_weight_is_capped() {
        assert_eq!(priority_weight(0), 1);
        assert_eq!(priority_weight(999), 9991);
        assert_eq!(priority_weight(1000), MAX_PRIORITY_WEIGHT);
        assert_eq!(priority_weight(usize::MAX), MAX_PRIORITY_WEIGHT);
    }

    #[test]
    fn test_cyclic_graph_rejected() {
        let g = graph(&[("a", "b"), ("b", "a")], &["a", "b"]);
        assert!(matches!(
            PriorityResolver.resolve(&g),
            Err(Error::CyclicDependency { .. })
        ));
    }
}
