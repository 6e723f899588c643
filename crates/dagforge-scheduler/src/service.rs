//! Orchestration of the resolve -> prioritize -> compile -> sync chain.

use chrono::{DateTime, Utc};
use dagforge_core::artifact::CompiledArtifact;
use dagforge_core::deadline::CallContext;
use dagforge_core::graph::{DependencyGraph, JobKey};
use dagforge_core::job::{JobSpec, validate_name};
use dagforge_core::project::ProjectSpec;
use dagforge_core::render::{AssetRenderer, RenderedAssetSet};
use dagforge_core::repository::SpecRepository;
use dagforge_core::scheduler::SchedulerUnit;
use dagforge_core::secret::SecretValue;
use dagforge_core::unit::{HookRegistry, TaskRegistry};
use dagforge_core::{Error, FailureStage, JobFailure, Result};
use dagforge_deployer::{ProjectLocks, StoreFactory, SyncOptions, SyncPipeline, SyncReport};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::compiler::{CompileInput, Compiler};
use crate::priority::PriorityResolver;
use crate::resolver::{DependencyResolver, InferencePolicy};

/// Tunables of the pipeline.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    /// Host jobs call back to, embedded in compiled artifacts.
    pub ingress_host: String,
    pub inference: InferencePolicy,
    pub sync: SyncOptions,
}

/// A project's dependency graph and the weight of every node in it.
#[derive(Debug, Clone)]
pub struct ResolvedProject {
    pub graph: DependencyGraph,
    pub weights: BTreeMap<JobKey, u32>,
}

impl ResolvedProject {
    pub fn weight(&self, key: &JobKey) -> u32 {
        self.weights
            .get(key)
            .copied()
            .unwrap_or(crate::priority::BASE_PRIORITY_WEIGHT)
    }
}

/// Result of deploying one project within a multi-project pass.
#[derive(Debug)]
pub struct DeployOutcome {
    pub project: String,
    pub result: Result<SyncReport>,
}

#[derive(Debug, Serialize)]
pub struct ProjectSummary {
    pub name: String,
    pub jobs: usize,
}

/// Collaborators of the service.
pub struct ServiceParts {
    pub repo: Arc<dyn SpecRepository>,
    pub scheduler: Arc<dyn SchedulerUnit>,
    pub stores: Arc<dyn StoreFactory>,
    pub renderer: Arc<dyn AssetRenderer>,
    pub tasks: TaskRegistry,
    pub hooks: HookRegistry,
    pub locks: ProjectLocks,
}

pub struct JobService {
    repo: Arc<dyn SpecRepository>,
    scheduler: Arc<dyn SchedulerUnit>,
    stores: Arc<dyn StoreFactory>,
    renderer: Arc<dyn AssetRenderer>,
    tasks: TaskRegistry,
    hooks: HookRegistry,
    resolver: DependencyResolver,
    priorities: PriorityResolver,
    compiler: Compiler,
    sync: SyncPipeline,
    locks: ProjectLocks,
}

impl JobService {
    pub fn new(parts: ServiceParts, config: ServiceConfig) -> Result<Self> {
        let ServiceParts {
            repo,
            scheduler,
            stores,
            renderer,
            tasks,
            hooks,
            locks,
        } = parts;

        let compiler = Compiler::for_scheduler(
            scheduler.as_ref(),
            tasks.clone(),
            hooks.clone(),
            config.ingress_host,
        )?;
        let resolver = DependencyResolver::new(tasks.clone(), hooks.clone(), renderer.clone())
            .with_policy(config.inference);

        Ok(Self {
            repo,
            scheduler,
            stores,
            renderer,
            tasks,
            hooks,
            resolver,
            priorities: PriorityResolver,
            compiler,
            sync: SyncPipeline::new(config.sync),
            locks,
        })
    }

    pub fn repo(&self) -> &Arc<dyn SpecRepository> {
        &self.repo
    }

    pub fn scheduler(&self) -> &Arc<dyn SchedulerUnit> {
        &self.scheduler
    }

    pub fn locks(&self) -> &ProjectLocks {
        &self.locks
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    // Registration

    pub async fn list_projects(&self, ctx: &CallContext) -> Result<Vec<ProjectSpec>> {
        let mut projects = ctx.run("list projects", self.repo.list_projects()).await?;
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    pub async fn get_project(&self, ctx: &CallContext, name: &str) -> Result<ProjectSpec> {
        ctx.run("get project", self.repo.get_project(name)).await
    }

    /// Create or update a project, then store any secrets it carries.
    pub async fn register_project(&self, ctx: &CallContext, project: &ProjectSpec) -> Result<()> {
        validate_name("project", &project.name)?;
        ctx.run("save project", self.repo.save_project(project))
            .await?;
        for (name, value) in &project.secrets {
            self.register_secret(ctx, &project.name, name, value).await?;
        }
        info!(project = %project.name, secrets = project.secrets.len(), "project registered");
        Ok(())
    }

    pub async fn register_secret(
        &self,
        ctx: &CallContext,
        project: &str,
        name: &str,
        value: &SecretValue,
    ) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("secret name is empty".into()));
        }
        ctx.run("save secret", self.repo.save_secret(project, name, value))
            .await
    }

    pub async fn list_jobs(&self, ctx: &CallContext, project: &str) -> Result<Vec<JobSpec>> {
        let mut jobs = ctx.run("list jobs", self.repo.list_jobs(project)).await?;
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(jobs)
    }

    pub async fn get_job(&self, ctx: &CallContext, project: &str, name: &str) -> Result<JobSpec> {
        ctx.run("get job", self.repo.get_job(project, name)).await
    }

    /// Validate and store a job. Units must be registered.
    pub async fn register_job(&self, ctx: &CallContext, project: &str, job: &JobSpec) -> Result<()> {
        job.validate()?;
        if !self.tasks.contains(&job.task.unit) {
            return Err(Error::InvalidInput(format!(
                "job '{}' uses unknown task unit '{}' (known: {})",
                job.name,
                job.task.unit,
                self.tasks.names().collect::<Vec<_>>().join(", ")
            )));
        }
        for hook in &job.hooks {
            if !self.hooks.contains(&hook.unit) {
                return Err(Error::InvalidInput(format!(
                    "job '{}' uses unknown hook unit '{}' (known: {})",
                    job.name,
                    hook.unit,
                    self.hooks.names().collect::<Vec<_>>().join(", ")
                )));
            }
        }
        ctx.run("save job", self.repo.save_job(project, job)).await?;
        info!(project = %project, job = %job.name, "job registered");
        Ok(())
    }

    pub async fn delete_job(&self, ctx: &CallContext, project: &str, name: &str) -> Result<()> {
        ctx.run("delete job", self.repo.delete_job(project, name))
            .await?;
        info!(project = %project, job = %name, "job deleted");
        Ok(())
    }

    // Pipeline

    /// Dependency graph and priority weights of `project`.
    pub async fn resolve_project(&self, ctx: &CallContext, project: &str) -> Result<ResolvedProject> {
        let jobs = ctx.run("list jobs", self.repo.list_jobs(project)).await?;
        let graph = self
            .resolver
            .resolve(ctx, self.repo.as_ref(), project, jobs)
            .await?;
        let weights = self.priorities.resolve(&graph)?;
        info!(
            project = %project,
            jobs = graph.root_nodes().count(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "project resolved"
        );
        Ok(ResolvedProject { graph, weights })
    }

    /// Compile a single job of `project` without deploying it.
    pub async fn compile_job(
        &self,
        ctx: &CallContext,
        project: &str,
        job: &str,
    ) -> Result<CompiledArtifact> {
        let resolved = self.resolve_project(ctx, project).await?;
        let key = JobKey::new(project, job);
        if !resolved.graph.contains(&key) {
            return Err(Error::NotFound(format!("job {}", key)));
        }
        self.compile_resolved(&resolved, &key)
    }

    /// Assets of one job rendered for a concrete scheduled run. Compiled
    /// artifacts carry assets rendered at the anchor time only, so running
    /// tasks fetch theirs from here.
    pub async fn render_assets(
        &self,
        ctx: &CallContext,
        project: &str,
        job: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<RenderedAssetSet> {
        let spec = self.get_job(ctx, project, job).await?;
        let assets = self.renderer.render(&spec, scheduled_at)?;
        debug!(project = %project, job = %job, scheduled_at = %scheduled_at, assets = assets.len(), "assets rendered for run");
        Ok(assets)
    }

    fn compile_resolved(&self, resolved: &ResolvedProject, key: &JobKey) -> Result<CompiledArtifact> {
        let spec = resolved
            .graph
            .node(key)
            .ok_or_else(|| Error::NotFound(format!("job {}", key)))?;
        let assets = self
            .renderer
            .render(spec, spec.anchor_time())
            .map_err(|_| Error::compilation(&spec.name, "assets"))?;
        let dependencies = resolved
            .graph
            .dependencies_of(key)
            .into_iter()
            .map(|(target, kind)| (target.clone(), kind))
            .collect();

        self.compiler.compile(&CompileInput {
            project: &key.project,
            job: spec,
            dependencies,
            priority_weight: resolved.weight(key),
            assets: &assets,
        })
    }

    /// Compile every job of `project` and sync the artifacts to its store.
    ///
    /// Per-job compile, write and delete failures are collected into one
    /// [`Error::Deployment`]; configuration and graph errors abort the pass.
    pub async fn deploy_project(&self, ctx: &CallContext, project: &str) -> Result<SyncReport> {
        let _guard = self.locks.lock(project).await;

        let spec = ctx.run("get project", self.repo.get_project(project)).await?;
        let store = self.stores.for_project(&spec)?;
        let resolved = self.resolve_project(ctx, project).await?;

        let mut artifacts = Vec::new();
        let mut failures = Vec::new();
        let mut retained = BTreeSet::new();
        for (key, _) in resolved.graph.root_nodes() {
            match self.compile_resolved(&resolved, key) {
                Ok(artifact) => artifacts.push(artifact),
                Err(e) => {
                    warn!(project = %project, job = %key.job, error = %e, "job failed to compile");
                    retained.insert(key.job.clone());
                    failures.push(JobFailure {
                        job: key.job.clone(),
                        stage: FailureStage::Compile,
                        message: e.to_string(),
                    });
                }
            }
        }
        info!(project = %project, compiled = artifacts.len(), failed = failures.len(), "jobs compiled");

        let layout = self.scheduler.layout();
        let mut report = self
            .sync
            .sync(ctx, project, store.as_ref(), &layout, artifacts, &retained)
            .await?;
        report.failures.extend(failures);
        report
            .failures
            .sort_by(|a, b| (&a.job, a.stage as u8).cmp(&(&b.job, b.stage as u8)));
        report.into_result()
    }

    /// Deploy every project concurrently. One project's failure never
    /// affects another.
    pub async fn deploy_all(&self, ctx: &CallContext) -> Result<Vec<DeployOutcome>> {
        let projects = self.list_projects(ctx).await?;
        let outcomes = futures::future::join_all(projects.into_iter().map(|project| async move {
            let result = self.deploy_project(ctx, &project.name).await;
            if let Err(e) = &result {
                error!(project = %project.name, error = %e, "project deploy failed");
            }
            DeployOutcome {
                project: project.name,
                result,
            }
        }))
        .await;
        Ok(outcomes)
    }

    /// Project names with their job counts.
    pub async fn summarize(&self, ctx: &CallContext) -> Result<Vec<ProjectSummary>> {
        let mut summaries = Vec::new();
        for project in self.list_projects(ctx).await? {
            let jobs = self.list_jobs(ctx, &project.name).await?.len();
            summaries.push(ProjectSummary {
                name: project.name,
                jobs,
            });
        }
        Ok(summaries)
    }
}
