//! Dependency resolution.
//!
//! Builds the [`DependencyGraph`] of one project: its own jobs, every job
//! they reach through explicit or inferred references (in any project), and
//! the edges between them. Resolution fails on a missing reference or a
//! cycle, and is deterministic for a given set of specs.

use dagforge_core::deadline::CallContext;
use dagforge_core::graph::{DependencyGraph, DependencyKind, JobKey};
use dagforge_core::job::JobSpec;
use dagforge_core::render::AssetRenderer;
use dagforge_core::repository::SpecRepository;
use dagforge_core::unit::{HookRegistry, TaskRegistry, UnitRequest};
use dagforge_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// What to do with inferred references that cannot be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InferencePolicy {
    /// Log and ignore unresolvable or unparseable references.
    #[default]
    BestEffort,
    /// Fail resolution on the first unresolvable or ambiguous reference.
    Strict,
}

impl FromStr for InferencePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "best-effort" => Ok(Self::BestEffort),
            "strict" => Ok(Self::Strict),
            other => Err(Error::InvalidInput(format!(
                "unknown inference policy '{}' (expected best-effort or strict)",
                other
            ))),
        }
    }
}

pub struct DependencyResolver {
    tasks: TaskRegistry,
    hooks: HookRegistry,
    renderer: Arc<dyn AssetRenderer>,
    policy: InferencePolicy,
}

impl DependencyResolver {
    pub fn new(tasks: TaskRegistry, hooks: HookRegistry, renderer: Arc<dyn AssetRenderer>) -> Self {
        Self {
            tasks,
            hooks,
            renderer,
            policy: InferencePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: InferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> InferencePolicy {
        self.policy
    }

    /// Resolve the graph rooted at `project`, whose jobs are `jobs`. Other
    /// projects are read through `repo`.
    pub async fn resolve(
        &self,
        ctx: &CallContext,
        repo: &dyn SpecRepository,
        project: &str,
        jobs: Vec<JobSpec>,
    ) -> Result<DependencyGraph> {
        let mut resolution = Resolution {
            resolver: self,
            ctx,
            repo,
            root: project.to_string(),
            graph: DependencyGraph::new(project),
            projects: BTreeMap::new(),
            project_names: None,
        };
        resolution.run(jobs).await?;
        let graph = resolution.graph;
        graph.ensure_acyclic()?;
        debug!(
            project = %project,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "dependency graph resolved"
        );
        Ok(graph)
    }

    /// Destinations `spec` reads according to its task unit and each of its
    /// hooks, minus the one it produces.
    fn references(&self, spec: &JobSpec) -> Result<BTreeSet<String>> {
        let task = self.tasks.get(&spec.task.unit).ok_or_else(|| {
            Error::InvalidInput(format!("unknown task unit '{}'", spec.task.unit))
        })?;
        let assets = self.renderer.render(spec, spec.anchor_time())?;
        let request = UnitRequest {
            job: &spec.name,
            config: &spec.task.config,
            assets: &assets,
        };

        let mut found: BTreeSet<String> = task.dependencies(&request)?.into_iter().collect();
        for hook in &spec.hooks {
            let unit = self.hooks.get(&hook.unit).ok_or_else(|| {
                Error::InvalidInput(format!("unknown hook unit '{}'", hook.unit))
            })?;
            found.extend(unit.dependencies(&UnitRequest {
                job: &spec.name,
                config: &hook.config,
                assets: &assets,
            })?);
        }

        if let Ok(Some(own)) = task.destination(&request) {
            found.remove(&own);
        }
        Ok(found)
    }
}

/// Jobs of one project, plus the destinations they produce once computed.
struct ProjectJobs {
    jobs: BTreeMap<String, JobSpec>,
    destinations: Option<BTreeMap<String, Vec<String>>>,
}

impl ProjectJobs {
    fn new(jobs: Vec<JobSpec>) -> Self {
        Self {
            jobs: jobs.into_iter().map(|j| (j.name.clone(), j)).collect(),
            destinations: None,
        }
    }
}

enum Producer {
    Found(JobKey),
    Ambiguous(Vec<JobKey>),
    Missing,
}

struct Resolution<'a> {
    resolver: &'a DependencyResolver,
    ctx: &'a CallContext,
    repo: &'a dyn SpecRepository,
    root: String,
    graph: DependencyGraph,
    /// `None` marks a project that does not exist.
    projects: BTreeMap<String, Option<ProjectJobs>>,
    project_names: Option<Vec<String>>,
}

impl Resolution<'_> {
    async fn run(&mut self, jobs: Vec<JobSpec>) -> Result<()> {
        let mut queue = VecDeque::new();
        for job in &jobs {
            let key = JobKey::new(&self.root, &job.name);
            self.graph.add_node(key.clone(), job.clone());
            queue.push_back(key);
        }
        self.projects
            .insert(self.root.clone(), Some(ProjectJobs::new(jobs)));

        while let Some(key) = queue.pop_front() {
            let Some(spec) = self.graph.node(&key).cloned() else {
                continue;
            };

            // Explicit edges first, so they win over inferred ones.
            for reference in &spec.dependencies {
                let target = JobKey::new(
                    reference.project.as_deref().unwrap_or(&key.project),
                    &reference.job,
                );
                if !self.ensure_node(&target, &mut queue).await? {
                    return Err(Error::MissingDependency {
                        job: key.relative_to(&self.root),
                        reference: target.relative_to(&self.root),
                    });
                }
                self.graph
                    .add_edge(key.clone(), target, DependencyKind::Explicit)?;
            }

            for target in self.infer(&key, &spec).await? {
                if target == key {
                    continue;
                }
                if self.ensure_node(&target, &mut queue).await? {
                    self.graph
                        .add_edge(key.clone(), target, DependencyKind::Inferred)?;
                }
            }
        }
        Ok(())
    }

    /// Make sure `key` is a graph node, loading it if needed. Newly added
    /// nodes are queued. Returns false if the job does not exist.
    async fn ensure_node(&mut self, key: &JobKey, queue: &mut VecDeque<JobKey>) -> Result<bool> {
        if self.graph.contains(key) {
            return Ok(true);
        }
        let spec = match self.load_project(&key.project).await? {
            Some(jobs) => jobs.jobs.get(&key.job).cloned(),
            None => None,
        };
        match spec {
            Some(spec) => {
                self.graph.add_node(key.clone(), spec);
                queue.push_back(key.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn load_project(&mut self, project: &str) -> Result<Option<&mut ProjectJobs>> {
        if !self.projects.contains_key(project) {
            let loaded = match self
                .ctx
                .run("list jobs", self.repo.list_jobs(project))
                .await
            {
                Ok(jobs) => Some(ProjectJobs::new(jobs)),
                Err(Error::NotFound(_)) => None,
                Err(e) => return Err(e),
            };
            self.projects.insert(project.to_string(), loaded);
        }
        Ok(self.projects.get_mut(project).and_then(|p| p.as_mut()))
    }

    /// Every other registered project, in name order.
    async fn other_projects(&mut self, own: &str) -> Result<Vec<String>> {
        if self.project_names.is_none() {
            let mut names: Vec<String> = self
                .ctx
                .run("list projects", self.repo.list_projects())
                .await?
                .into_iter()
                .map(|p| p.name)
                .collect();
            names.sort();
            self.project_names = Some(names);
        }
        Ok(self
            .project_names
            .iter()
            .flatten()
            .filter(|name| name.as_str() != own)
            .cloned()
            .collect())
    }

    /// Jobs producing the destinations `key` reads through its task or hooks.
    async fn infer(&mut self, key: &JobKey, spec: &JobSpec) -> Result<Vec<JobKey>> {
        let policy = self.resolver.policy;
        let job = key.relative_to(&self.root);

        let references = match (self.resolver.references(spec), policy) {
            (Ok(refs), _) => refs,
            (Err(e), InferencePolicy::Strict) => {
                return Err(Error::InvalidInput(format!(
                    "inferring dependencies of job '{}': {}",
                    job, e
                )));
            }
            (Err(e), InferencePolicy::BestEffort) => {
                warn!(project = %key.project, job = %key.job, error = %e, "skipping dependency inference");
                return Ok(Vec::new());
            }
        };

        let mut targets = BTreeSet::new();
        for destination in references {
            match self.find_producer(&key.project, &destination).await? {
                Producer::Found(target) => {
                    targets.insert(target);
                }
                Producer::Ambiguous(candidates) => {
                    let names: Vec<String> = candidates.iter().map(|c| c.to_string()).collect();
                    match policy {
                        InferencePolicy::Strict => {
                            return Err(Error::InvalidInput(format!(
                                "job '{}' reads {}, produced by several jobs: {}",
                                job,
                                destination,
                                names.join(", ")
                            )));
                        }
                        InferencePolicy::BestEffort => {
                            warn!(project = %key.project, job = %key.job, destination = %destination, candidates = ?names, "ambiguous inferred dependency, using the first");
                            if let Some(first) = candidates.into_iter().next() {
                                targets.insert(first);
                            }
                        }
                    }
                }
                Producer::Missing => match policy {
                    InferencePolicy::Strict => {
                        return Err(Error::MissingDependency {
                            job,
                            reference: destination,
                        });
                    }
                    InferencePolicy::BestEffort => {
                        debug!(project = %key.project, job = %key.job, destination = %destination, "no job produces inferred dependency");
                    }
                },
            }
        }
        Ok(targets.into_iter().collect())
    }

    /// Job producing `destination`: the job's own project first, then every
    /// other project in name order.
    async fn find_producer(&mut self, own: &str, destination: &str) -> Result<Producer> {
        let mut order = vec![own.to_string()];
        order.extend(self.other_projects(own).await?);

        for project in order {
            let producers = self.destinations(&project).await?;
            match producers.get(destination).map(|jobs| jobs.as_slice()) {
                Some([job]) => return Ok(Producer::Found(JobKey::new(&project, job))),
                Some(jobs) if jobs.len() > 1 => {
                    return Ok(Producer::Ambiguous(
                        jobs.iter().map(|j| JobKey::new(&project, j)).collect(),
                    ));
                }
                _ => {}
            }
        }
        Ok(Producer::Missing)
    }

    /// Destination index of a project, computed once.
    async fn destinations(&mut self, project: &str) -> Result<BTreeMap<String, Vec<String>>> {
        let resolver = self.resolver;
        let Some(jobs) = self.load_project(project).await? else {
            return Ok(BTreeMap::new());
        };
        if let Some(index) = &jobs.destinations {
            return Ok(index.clone());
        }

        let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, spec) in &jobs.jobs {
            let Some(unit) = resolver.tasks.get(&spec.task.unit) else {
                continue;
            };
            let destination = resolver
                .renderer
                .render(spec, spec.anchor_time())
                .and_then(|assets| {
                    unit.destination(&UnitRequest {
                        job: name,
                        config: &spec.task.config,
                        assets: &assets,
                    })
                });
            match destination {
                Ok(Some(dest)) => index.entry(dest).or_default().push(name.clone()),
                Ok(None) => {}
                Err(e) => {
                    debug!(project = %project, job = %name, error = %e, "job has no usable destination");
                }
            }
        }
        jobs.destinations = Some(index.clone());
        Ok(index)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::units::{builtin_hooks, builtin_tasks};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use dagforge_core::job::{JobBehavior, JobHook, JobSchedule, JobTask, Window};
    use dagforge_core::project::ProjectSpec;
    use dagforge_core::render::RawAssets;
    use dagforge_core::secret::SecretValue;

    pub(crate) fn make_job(name: &str, deps: &[&str]) -> JobSpec {
        JobSpec {
            name: name.to_string(),
            owner: "data@example.com".to_string(),
            description: String::new(),
            labels: BTreeMap::new(),
            schedule: JobSchedule {
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end_date: None,
                interval: "0 2 * * *".to_string(),
            },
            behavior: JobBehavior::default(),
            window: Window::default(),
            task: JobTask {
                unit: "shell".to_string(),
                config: BTreeMap::new(),
            },
            hooks: vec![],
            dependencies: deps.iter().map(|d| d.parse().unwrap()).collect(),
            assets: BTreeMap::new(),
        }
    }

    fn sql_job(name: &str, table: &str, query: &str) -> JobSpec {
        let mut job = make_job(name, &[]);
        job.task.unit = "sql-transform".to_string();
        job.task.config = [("PROJECT", "acme"), ("DATASET", "sales"), ("TABLE", table)]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        job.assets.insert("query.sql".to_string(), query.to_string());
        job
    }

    /// Projects and their jobs, read-only.
    struct Fixture(BTreeMap<String, Vec<JobSpec>>);

    impl Fixture {
        fn new(projects: &[(&str, Vec<JobSpec>)]) -> Self {
            Self(
                projects
                    .iter()
                    .map(|(name, jobs)| (name.to_string(), jobs.clone()))
                    .collect(),
            )
        }

        fn jobs(&self, project: &str) -> Vec<JobSpec> {
            self.0.get(project).cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl SpecRepository for Fixture {
        async fn list_projects(&self) -> Result<Vec<ProjectSpec>> {
            Ok(self.0.keys().map(|n| ProjectSpec::new(n.as_str())).collect())
        }
        async fn get_project(&self, name: &str) -> Result<ProjectSpec> {
            Ok(ProjectSpec::new(name))
        }
        async fn save_project(&self, _: &ProjectSpec) -> Result<()> {
            Ok(())
        }
        async fn get_secret(&self, _: &str, name: &str) -> Result<SecretValue> {
            Err(Error::NotFound(name.to_string()))
        }
        async fn save_secret(&self, _: &str, _: &str, _: &SecretValue) -> Result<()> {
            Ok(())
        }
        async fn list_jobs(&self, project: &str) -> Result<Vec<JobSpec>> {
            self.0
                .get(project)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("project {}", project)))
        }
        async fn get_job(&self, project: &str, name: &str) -> Result<JobSpec> {
            self.jobs(project)
                .into_iter()
                .find(|j| j.name == name)
                .ok_or_else(|| Error::NotFound(name.to_string()))
        }
        async fn save_job(&self, _: &str, _: &JobSpec) -> Result<()> {
            Ok(())
        }
        async fn delete_job(&self, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
    }

    fn resolver(policy: InferencePolicy) -> DependencyResolver {
        DependencyResolver::new(
            builtin_tasks().unwrap(),
            builtin_hooks().unwrap(),
            Arc::new(RawAssets),
        )
        .with_policy(policy)
    }

    async fn resolve(fixture: &Fixture, project: &str, policy: InferencePolicy) -> Result<DependencyGraph> {
        resolver(policy)
            .resolve(&CallContext::default(), fixture, project, fixture.jobs(project))
            .await
    }

    fn edges(graph: &DependencyGraph) -> Vec<(String, String, &'static str)> {
        graph
            .edges()
            .map(|e| (e.source.to_string(), e.target.to_string(), e.kind.as_str()))
            .collect()
    }

    #[tokio::test]
    async fn test_fan_out_scenario() {
        let fixture = Fixture::new(&[(
            "p",
            vec![make_job("a", &[]), make_job("b", &["a"]), make_job("c", &["a"])],
        )]);
        let graph = resolve(&fixture, "p", InferencePolicy::BestEffort).await.unwrap();

        assert_eq!(
            edges(&graph),
            vec![
                ("p/b".to_string(), "p/a".to_string(), "explicit"),
                ("p/c".to_string(), "p/a".to_string(), "explicit"),
            ]
        );
    }

    #[tokio::test]
    async fn test_self_reference_is_cycle() {
        let fixture = Fixture::new(&[("p", vec![make_job("d", &["d"])])]);
        let err = resolve(&fixture, "p", InferencePolicy::BestEffort).await.unwrap_err();
        match err {
            Error::CyclicDependency { path } => assert_eq!(path, vec!["d", "d"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cycle_path_in_traversal_order() {
        let fixture = Fixture::new(&[(
            "p",
            vec![
                make_job("a", &["b"]),
                make_job("b", &["c"]),
                make_job("c", &["a"]),
                make_job("x", &[]),
            ],
        )]);
        let err = resolve(&fixture, "p", InferencePolicy::BestEffort).await.unwrap_err();
        match err {
            Error::CyclicDependency { path } => assert_eq!(path, vec!["a", "b", "c", "a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_cross_project_job() {
        let fixture = Fixture::new(&[
            ("p1", vec![make_job("e", &["p2/f"])]),
            ("p2", vec![make_job("g", &[])]),
        ]);
        let err = resolve(&fixture, "p1", InferencePolicy::BestEffort).await.unwrap_err();
        match err {
            Error::MissingDependency { job, reference } => {
                assert_eq!(job, "e");
                assert_eq!(reference, "p2/f");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_project() {
        let fixture = Fixture::new(&[("p1", vec![make_job("e", &["ghost/f"])])]);
        let err = resolve(&fixture, "p1", InferencePolicy::BestEffort).await.unwrap_err();
        assert!(matches!(err, Error::MissingDependency { .. }));
    }

    #[tokio::test]
    async fn test_missing_local_job() {
        let fixture = Fixture::new(&[("p", vec![make_job("a", &["nope"])])]);
        let err = resolve(&fixture, "p", InferencePolicy::BestEffort).await.unwrap_err();
        assert!(matches!(err, Error::MissingDependency { ref reference, .. } if reference == "nope"));
    }

    #[tokio::test]
    async fn test_cross_project_cycle_detected() {
        let fixture = Fixture::new(&[
            ("p1", vec![make_job("a", &["p2/b"])]),
            ("p2", vec![make_job("b", &["p1/a"])]),
        ]);
        let err = resolve(&fixture, "p1", InferencePolicy::BestEffort).await.unwrap_err();
        match err {
            Error::CyclicDependency { path } => assert_eq!(path, vec!["a", "p2/b", "a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cross_project_edge_kind() {
        let fixture = Fixture::new(&[
            ("p1", vec![make_job("a", &["p2/b"])]),
            ("p2", vec![make_job("b", &["c"]), make_job("c", &[])]),
        ]);
        let graph = resolve(&fixture, "p1", InferencePolicy::BestEffort).await.unwrap();
        assert_eq!(
            edges(&graph),
            vec![
                ("p1/a".to_string(), "p2/b".to_string(), "cross-project"),
                ("p2/b".to_string(), "p2/c".to_string(), "explicit"),
            ]
        );
        assert_eq!(graph.root_nodes().count(), 1);
    }

    #[tokio::test]
    async fn test_inferred_edges() {
        let fixture = Fixture::new(&[
            (
                "acme",
                vec![
                    sql_job("orders", "orders", "select 1"),
                    sql_job(
                        "daily",
                        "orders_daily",
                        "select * from `acme.sales.orders` join `acme.sales.unknown`",
                    ),
                ],
            ),
        ]);
        let graph = resolve(&fixture, "acme", InferencePolicy::BestEffort).await.unwrap();
        assert_eq!(
            edges(&graph),
            vec![("acme/daily".to_string(), "acme/orders".to_string(), "inferred")]
        );

        let err = resolve(&fixture, "acme", InferencePolicy::Strict).await.unwrap_err();
        assert!(matches!(err, Error::MissingDependency { ref reference, .. } if reference == "bigquery://acme:sales.unknown"));
    }

    #[tokio::test]
    async fn test_inferred_from_other_project() {
        let mut orders = sql_job("orders", "orders", "select 1");
        orders.task.config.insert("PROJECT".into(), "shared".into());
        let fixture = Fixture::new(&[
            ("acme", vec![sql_job("daily", "daily", "select * from `shared.sales.orders`")]),
            ("shared", vec![orders]),
        ]);
        let graph = resolve(&fixture, "acme", InferencePolicy::Strict).await.unwrap();
        assert_eq!(
            edges(&graph),
            vec![("acme/daily".to_string(), "shared/orders".to_string(), "cross-project")]
        );
    }

    #[tokio::test]
    async fn test_explicit_wins_over_inferred() {
        let mut daily = sql_job("daily", "daily", "select * from `acme.sales.orders`");
        daily.dependencies = vec!["orders".parse().unwrap()];
        let fixture = Fixture::new(&[("acme", vec![sql_job("orders", "orders", "select 1"), daily])]);
        let graph = resolve(&fixture, "acme", InferencePolicy::BestEffort).await.unwrap();
        assert_eq!(
            edges(&graph),
            vec![("acme/daily".to_string(), "acme/orders".to_string(), "explicit")]
        );
    }

    #[tokio::test]
    async fn test_ambiguous_destination() {
        let fixture = Fixture::new(&[(
            "acme",
            vec![
                sql_job("orders-a", "orders", "select 1"),
                sql_job("orders-b", "orders", "select 2"),
                sql_job("daily", "daily", "select * from `acme.sales.orders`"),
            ],
        )]);
        let graph = resolve(&fixture, "acme", InferencePolicy::BestEffort).await.unwrap();
        assert_eq!(graph.edge_count(), 1);

        let err = resolve(&fixture, "acme", InferencePolicy::Strict).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unparseable_inference_policy() {
        let mut broken = sql_job("broken", "t", "select 1");
        broken.assets.clear();
        let fixture = Fixture::new(&[("acme", vec![broken])]);

        assert!(resolve(&fixture, "acme", InferencePolicy::BestEffort).await.is_ok());
        assert!(matches!(
            resolve(&fixture, "acme", InferencePolicy::Strict).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_deterministic_serialization() {
        let fixture = Fixture::new(&[(
            "p",
            vec![
                make_job("c", &["a", "b"]),
                make_job("b", &["a"]),
                make_job("a", &[]),
            ],
        )]);
        let first = resolve(&fixture, "p", InferencePolicy::BestEffort).await.unwrap();
        let second = resolve(&fixture, "p", InferencePolicy::BestEffort).await.unwrap();
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    fn sla_hook(table: &str) -> JobHook {
        JobHook {
            unit: "sla-check".to_string(),
            config: [("WATCH_TABLE".to_string(), format!("`{}`", table))]
                .into_iter()
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_hook_config_adds_inferred_edge() {
        let mut report = make_job("report", &[]);
        report.hooks.push(sla_hook("acme.sales.orders"));
        let fixture = Fixture::new(&[(
            "acme",
            vec![sql_job("orders", "orders", "select 1"), report],
        )]);

        let graph = resolve(&fixture, "acme", InferencePolicy::Strict).await.unwrap();
        assert_eq!(
            edges(&graph),
            vec![("acme/report".to_string(), "acme/orders".to_string(), "inferred")]
        );
    }

    #[tokio::test]
    async fn test_hook_naming_own_destination_adds_no_edge() {
        let mut orders = sql_job("orders", "orders", "select 1");
        orders.hooks.push(sla_hook("acme.sales.orders"));
        let fixture = Fixture::new(&[("acme", vec![orders])]);

        let graph = resolve(&fixture, "acme", InferencePolicy::Strict).await.unwrap();
        assert_eq!(graph.edge_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_hook_unit_follows_policy() {
        let mut job = make_job("a", &[]);
        job.hooks.push(JobHook {
            unit: "pager".to_string(),
            config: BTreeMap::new(),
        });
        let fixture = Fixture::new(&[("acme", vec![job])]);

        assert!(resolve(&fixture, "acme", InferencePolicy::BestEffort).await.is_ok());
        assert!(matches!(
            resolve(&fixture, "acme", InferencePolicy::Strict).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("strict".parse::<InferencePolicy>().unwrap(), InferencePolicy::Strict);
        assert_eq!(
            "best-effort".parse::<InferencePolicy>().unwrap(),
            InferencePolicy::BestEffort
        );
        assert!("lenient".parse::<InferencePolicy>().is_err());
    }
}
