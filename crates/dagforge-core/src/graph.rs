//! The dependency graph of one resolution unit.
//!
//! A resolution unit is a root project plus every job, in any project, that
//! the root project's jobs transitively depend on. Edges point from the
//! dependent job (source) to the job it needs (target).

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::job::JobSpec;
use crate::{Error, Result};

/// Globally unique job identity: project then job name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobKey {
    pub project: String,
    pub job: String,
}

impl JobKey {
    pub fn new(project: impl Into<String>, job: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            job: job.into(),
        }
    }

    /// Bare job name inside `project`, `project/job` outside it.
    pub fn relative_to(&self, project: &str) -> String {
        if self.project == project {
            self.job.clone()
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project, self.job)
    }
}

/// How an edge was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    /// Declared in the job's dependency list.
    Explicit,
    /// Found by the task unit in the job's config or assets.
    Inferred,
    /// Any edge whose endpoints live in different projects.
    CrossProject,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Explicit => "explicit",
            DependencyKind::Inferred => "inferred",
            DependencyKind::CrossProject => "cross-project",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: JobKey,
    pub target: JobKey,
    pub kind: DependencyKind,
}

/// Nodes and edges of one resolution unit, kept in sorted order so every
/// traversal and serialization is deterministic.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    root: String,
    nodes: BTreeMap<JobKey, JobSpec>,
    edges: BTreeMap<(JobKey, JobKey), DependencyKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl DependencyGraph {
    pub fn new(root_project: impl Into<String>) -> Self {
        Self {
            root: root_project.into(),
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }

    pub fn root_project(&self) -> &str {
        &self.root
    }

    /// Insert a node. Returns false if it was already present.
    pub fn add_node(&mut self, key: JobKey, spec: JobSpec) -> bool {
        if self.nodes.contains_key(&key) {
            return false;
        }
        self.nodes.insert(key, spec);
        true
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn node(&self, key: &JobKey) -> Option<&JobSpec> {
        self.nodes.get(key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&JobKey, &JobSpec)> {
        self.nodes.iter()
    }

    /// Nodes belonging to the root project.
    pub fn root_nodes(&self) -> impl Iterator<Item = (&JobKey, &JobSpec)> {
        self.nodes.iter().filter(|(k, _)| k.project == self.root)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add `source -> target`. Both endpoints must already be nodes. The
    /// first kind recorded for a pair wins; cross-project pairs are always
    /// recorded as [`DependencyKind::CrossProject`].
    pub fn add_edge(&mut self, source: JobKey, target: JobKey, kind: DependencyKind) -> Result<()> {
        if !self.nodes.contains_key(&source) {
            return Err(Error::NotFound(format!("job {}", source)));
        }
        if !self.nodes.contains_key(&target) {
            return Err(Error::MissingDependency {
                job: source.relative_to(&self.root),
                reference: target.relative_to(&self.root),
            });
        }
        let kind = if source.project != target.project {
            DependencyKind::CrossProject
        } else {
            kind
        };
        self.edges.entry((source, target)).or_insert(kind);
        Ok(())
    }

    pub fn edges(&self) -> impl Iterator<Item = DependencyEdge> + '_ {
        self.edges.iter().map(|((source, target), kind)| DependencyEdge {
            source: source.clone(),
            target: target.clone(),
            kind: *kind,
        })
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Jobs `key` depends on, in sorted order.
    pub fn dependencies_of(&self, key: &JobKey) -> Vec<(&JobKey, DependencyKind)> {
        self.edges
            .iter()
            .filter(|((source, _), _)| source == key)
            .map(|((_, target), kind)| (target, *kind))
            .collect()
    }

    /// Jobs that directly depend on `key`, in sorted order.
    pub fn dependents_of(&self, key: &JobKey) -> Vec<&JobKey> {
        let mut dependents: Vec<&JobKey> = self
            .edges
            .keys()
            .filter(|(_, target)| target == key)
            .map(|(source, _)| source)
            .collect();
        dependents.sort();
        dependents
    }

    fn forward_adjacency(&self) -> BTreeMap<&JobKey, Vec<&JobKey>> {
        let mut adjacency: BTreeMap<&JobKey, Vec<&JobKey>> =
            self.nodes.keys().map(|k| (k, Vec::new())).collect();
        for (source, target) in self.edges.keys() {
            adjacency.entry(source).or_default().push(target);
        }
        adjacency
    }

    fn reverse_adjacency(&self) -> BTreeMap<&JobKey, Vec<&JobKey>> {
        let mut adjacency: BTreeMap<&JobKey, Vec<&JobKey>> =
            self.nodes.keys().map(|k| (k, Vec::new())).collect();
        for (source, target) in self.edges.keys() {
            adjacency.entry(target).or_default().push(source);
        }
        adjacency
    }

    /// Find a cycle with a three-color depth-first search. Nodes are visited
    /// in sorted order, so the same graph always reports the same cycle. The
    /// returned path starts and ends with the same job.
    ///
    /// The search keeps its own stack, so chain depth is bounded by memory
    /// rather than the thread's stack.
    pub fn find_cycle(&self) -> Option<Vec<JobKey>> {
        let adjacency = self.forward_adjacency();
        let mut colors: BTreeMap<&JobKey, Color> =
            self.nodes.keys().map(|k| (k, Color::White)).collect();

        for start in self.nodes.keys() {
            if colors[start] != Color::White {
                continue;
            }
            colors.insert(start, Color::Gray);
            // Gray path from `start`, and the next child to try at each level.
            let mut path: Vec<&JobKey> = vec![start];
            let mut cursor: Vec<usize> = vec![0];

            while let Some(&node) = path.last() {
                let children = adjacency.get(node).map(Vec::as_slice).unwrap_or_default();
                let next_child = cursor.last_mut()?;
                let Some(&next) = children.get(*next_child) else {
                    colors.insert(node, Color::Black);
                    path.pop();
                    cursor.pop();
                    continue;
                };
                *next_child += 1;

                match colors.get(next).copied().unwrap_or(Color::White) {
                    Color::Gray => {
                        let from = path.iter().position(|k| *k == next)?;
                        let mut cycle: Vec<JobKey> =
                            path[from..].iter().map(|k| (*k).clone()).collect();
                        cycle.push(next.clone());
                        return Some(cycle);
                    }
                    Color::White => {
                        colors.insert(next, Color::Gray);
                        path.push(next);
                        cursor.push(0);
                    }
                    Color::Black => {}
                }
            }
        }
        None
    }

    /// Fail with [`Error::CyclicDependency`] if the graph has a cycle.
    pub fn ensure_acyclic(&self) -> Result<()> {
        match self.find_cycle() {
            Some(cycle) => Err(Error::CyclicDependency {
                path: cycle.iter().map(|k| k.relative_to(&self.root)).collect(),
            }),
            None => Ok(()),
        }
    }

    /// Every job that can reach `key` through dependency edges.
    pub fn transitive_dependents(&self, key: &JobKey) -> BTreeSet<JobKey> {
        reachable(&self.reverse_adjacency(), key)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Number of transitive dependents of every node. The reverse index is
    /// built once for the whole graph.
    pub fn transitive_fan_in(&self) -> BTreeMap<JobKey, usize> {
        let reverse = self.reverse_adjacency();
        self.nodes
            .keys()
            .map(|key| (key.clone(), reachable(&reverse, key).len()))
            .collect()
    }

    /// JSON form of the graph: sorted nodes and edges.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Internal(e.to_string()))
    }
}

/// Nodes reachable from `key` in `adjacency`, excluding `key` itself.
fn reachable<'a>(
    adjacency: &BTreeMap<&'a JobKey, Vec<&'a JobKey>>,
    key: &'a JobKey,
) -> BTreeSet<&'a JobKey> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<&JobKey> = VecDeque::from([key]);
    while let Some(current) = queue.pop_front() {
        for &next in adjacency.get(current).into_iter().flatten() {
            if next != key && seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    seen
}

impl Serialize for DependencyGraph {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let nodes: Vec<&JobKey> = self.nodes.keys().collect();
        let edges: Vec<DependencyEdge> = self.edges().collect();
        let mut state = serializer.serialize_struct("DependencyGraph", 3)?;
        state.serialize_field("root", &self.root)?;
        state.serialize_field("nodes", &nodes)?;
        state.serialize_field("edges", &edges)?;
        state.end()
    }
}
