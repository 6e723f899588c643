//! Job compiler: spec + dependencies + weight + assets -> scheduler artifact.
//!
//! Compilation is a pure function of its inputs. Everything a template can
//! see is put into a [`TemplateContext`] up front; any placeholder the
//! template asks for that is not there fails the job with the field name.

use bytes::Bytes;
use dagforge_core::artifact::{ArtifactLayout, CompiledArtifact};
use dagforge_core::graph::{DependencyKind, JobKey};
use dagforge_core::job::JobSpec;
use dagforge_core::render::RenderedAssetSet;
use dagforge_core::scheduler::SchedulerUnit;
use dagforge_core::unit::{HookKind, HookRegistry, TaskRegistry};
use dagforge_core::{Error, Result};
use std::collections::BTreeMap;

use crate::resources;
use crate::template::{Item, Template, TemplateContext, ident};

/// Everything one job's compilation depends on.
#[derive(Debug, Clone)]
pub struct CompileInput<'a> {
    pub project: &'a str,
    pub job: &'a JobSpec,
    /// Direct dependencies in sorted order.
    pub dependencies: Vec<(JobKey, DependencyKind)>,
    pub priority_weight: u32,
    pub assets: &'a RenderedAssetSet,
}

pub struct Compiler {
    template: Template,
    layout: ArtifactLayout,
    tasks: TaskRegistry,
    hooks: HookRegistry,
    ingress_host: String,
}

impl Compiler {
    pub fn new(
        template_source: &str,
        layout: ArtifactLayout,
        tasks: TaskRegistry,
        hooks: HookRegistry,
        ingress_host: impl Into<String>,
    ) -> Result<Self> {
        let template = Template::parse(template_source)
            .map_err(|e| Error::Internal(format!("invalid job template: {}", e)))?;
        Ok(Self {
            template,
            layout,
            tasks,
            hooks,
            ingress_host: ingress_host.into(),
        })
    }

    /// Compiler for the embedded template of `scheduler`.
    pub fn for_scheduler(
        scheduler: &dyn SchedulerUnit,
        tasks: TaskRegistry,
        hooks: HookRegistry,
        ingress_host: impl Into<String>,
    ) -> Result<Self> {
        let source = resources::template(scheduler.template_path()).ok_or_else(|| {
            Error::Internal(format!(
                "no embedded template at {} for scheduler {}",
                scheduler.template_path(),
                scheduler.name()
            ))
        })?;
        Self::new(source, scheduler.layout(), tasks, hooks, ingress_host)
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn compile(&self, input: &CompileInput<'_>) -> Result<CompiledArtifact> {
        let job = input.job;
        let ctx = self.context(input)?;
        let rendered = self
            .template
            .render(&ctx)
            .map_err(|e| Error::compilation(&job.name, e.field))?;

        Ok(CompiledArtifact {
            job: job.name.clone(),
            path: self.layout.path_for(&job.name),
            payload: Bytes::from(rendered),
        })
    }

    fn context(&self, input: &CompileInput<'_>) -> Result<TemplateContext> {
        let job = input.job;
        let missing = |field: &str| Error::compilation(&job.name, field);

        if job.owner.trim().is_empty() {
            return Err(missing("owner"));
        }
        if job.schedule.interval.trim().is_empty() {
            return Err(missing("schedule.interval"));
        }
        let task = self
            .tasks
            .get(&job.task.unit)
            .ok_or_else(|| missing("task.unit"))?;

        let mut ctx = TemplateContext::new();
        ctx.set("project", input.project)
            .set("ingress_host", &self.ingress_host)
            .set("priority_weight", input.priority_weight.to_string())
            .set("job.name", &job.name)
            .set("job.owner", &job.owner)
            .set("job.description", &job.description)
            .set("schedule.start_date", job.schedule.start_date.to_string())
            .set(
                "schedule.end_date",
                job.schedule
                    .end_date
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
            )
            .set("schedule.interval", &job.schedule.interval)
            .set("behavior.depends_on_past", py_bool(job.behavior.depends_on_past))
            .set("behavior.catch_up", py_bool(job.behavior.catch_up))
            .set("retry.count", job.behavior.retry.count.to_string())
            .set(
                "retry.delay_seconds",
                job.behavior.retry.delay.seconds().to_string(),
            )
            .set(
                "retry.exponential_backoff",
                py_bool(job.behavior.retry.exponential_backoff),
            )
            .set("window.size", job.window.size.to_string())
            .set("window.offset", job.window.offset.to_string())
            .set("window.truncate_to", job.window.truncate_to.as_str())
            .set("task.unit", &job.task.unit)
            .set("task.image", task.image())
            .set("task.config", to_json(&job.task.config)?);

        let assets = input
            .assets
            .iter()
            .map(|(name, content)| item(&[("name", name), ("content", content)]))
            .collect();
        ctx.set_list("assets", assets);

        let mut hooks = Vec::with_capacity(job.hooks.len());
        for (i, hook) in job.hooks.iter().enumerate() {
            let unit = self
                .hooks
                .get(&hook.unit)
                .ok_or_else(|| missing(&format!("hooks[{}].unit", i)))?;
            let kind = unit.kind();
            let task_id = format!("{}-{}", hook.unit, kind);
            hooks.push(item(&[
                ("name", &hook.unit),
                ("task_id", &task_id),
                ("image", unit.image()),
                ("kind", kind.as_str()),
                ("config", &to_json(&hook.config)?),
                ("is_pre", py_bool(kind == HookKind::Pre)),
                ("is_post", py_bool(kind == HookKind::Post)),
                ("is_fail", py_bool(kind == HookKind::Fail)),
            ]));
        }
        ctx.set_list("hooks", hooks);

        let dependencies = input
            .dependencies
            .iter()
            .map(|(key, kind)| {
                let identifier = ident(&format!("{}__{}", key.project, key.job));
                let task_id = format!("wait-{}-{}", key.project, key.job);
                item(&[
                    ("identifier", &identifier),
                    ("task_id", &task_id),
                    ("project", &key.project),
                    ("job", &key.job),
                    ("external", py_bool(key.project != input.project)),
                    ("kind", kind.as_str()),
                ])
            })
            .collect();
        ctx.set_list("dependencies", dependencies);

        Ok(ctx)
    }
}

fn py_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn item(fields: &[(&str, &str)]) -> Item {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn to_json(config: &BTreeMap<String, String>) -> Result<String> {
    serde_json::to_string(config).map_err(|e| Error::Internal(e.to_string()))
}
