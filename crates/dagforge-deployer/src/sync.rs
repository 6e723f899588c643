//! Sync of compiled artifacts to a project's object store.
//!
//! A pass lists the jobs dir once, uploads every artifact whose content
//! changed (bounded concurrency), and only then deletes stale job files.
//! Per-job failures are collected; only a failed listing aborts the pass.

use bytes::Bytes;
use dagforge_core::artifact::{ArtifactLayout, CompiledArtifact, ContentHash, ObjectStore};
use dagforge_core::deadline::CallContext;
use dagforge_core::{DeploymentFailures, Error, FailureStage, JobFailure, Result};
use futures::StreamExt;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Default number of concurrent uploads per project.
pub const DEFAULT_WRITE_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    pub concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_WRITE_CONCURRENCY,
        }
    }
}

/// Outcome of one sync pass. Job names in each list are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub project: String,
    pub written: Vec<String>,
    pub unchanged: Vec<String>,
    pub deleted: Vec<String>,
    pub failures: Vec<JobFailure>,
    /// The pass stopped early; stale artifacts were not collected.
    pub cancelled: bool,
}

impl SyncReport {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Default::default()
        }
    }

    /// True when the pass changed nothing in the store.
    pub fn is_noop(&self) -> bool {
        self.written.is_empty() && self.deleted.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn per-job failures into [`Error::Deployment`].
    pub fn into_result(self) -> Result<SyncReport> {
        if self.failures.is_empty() {
            return Ok(self);
        }
        Err(Error::Deployment(DeploymentFailures {
            project: self.project,
            written: self.written.len(),
            failures: self.failures,
        }))
    }
}

enum WriteOutcome {
    Written(String),
    Unchanged(String),
    Skipped(String),
    Failed(JobFailure),
}

#[derive(Debug, Clone, Default)]
pub struct SyncPipeline {
    options: SyncOptions,
}

impl SyncPipeline {
    pub fn new(options: SyncOptions) -> Self {
        Self { options }
    }

    /// Upload `artifacts` and collect job files that no longer belong to a
    /// job. Names in `retained` keep their existing artifact even though
    /// they are not part of this pass (e.g. jobs that failed to compile).
    pub async fn sync(
        &self,
        ctx: &CallContext,
        project: &str,
        store: &dyn ObjectStore,
        layout: &ArtifactLayout,
        artifacts: Vec<CompiledArtifact>,
        retained: &BTreeSet<String>,
    ) -> Result<SyncReport> {
        let existing: BTreeMap<String, Option<ContentHash>> = ctx
            .run("list artifacts", store.list(&layout.prefix()))
            .await?
            .into_iter()
            .map(|o| (o.path, o.content_hash))
            .collect();

        let current: BTreeSet<String> = artifacts.iter().map(|a| a.job.clone()).collect();
        let mut report = SyncReport::new(project);

        let outcomes: Vec<WriteOutcome> = futures::stream::iter(artifacts)
            .map(|artifact| {
                let existing = &existing;
                async move {
                    if ctx.is_cancelled() {
                        return WriteOutcome::Skipped(artifact.job);
                    }
                    if let Some(Some(stored)) = existing.get(&artifact.path) {
                        if stored.matches(&artifact.payload) {
                            return WriteOutcome::Unchanged(artifact.job);
                        }
                    }
                    let CompiledArtifact { job, path, payload } = artifact;
                    match write(ctx, store, &path, payload).await {
                        Ok(()) => {
                            debug!(project = %project, job = %job, path = %path, "artifact written");
                            WriteOutcome::Written(job)
                        }
                        Err(Error::Cancelled) => WriteOutcome::Skipped(job),
                        Err(e) => WriteOutcome::Failed(JobFailure {
                            job,
                            stage: FailureStage::Write,
                            message: e.to_string(),
                        }),
                    }
                }
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                WriteOutcome::Written(job) => report.written.push(job),
                WriteOutcome::Unchanged(job) => report.unchanged.push(job),
                WriteOutcome::Skipped(job) => {
                    report.cancelled = true;
                    report.failures.push(JobFailure {
                        job,
                        stage: FailureStage::Write,
                        message: Error::Cancelled.to_string(),
                    });
                }
                WriteOutcome::Failed(failure) => {
                    warn!(project = %project, job = %failure.job, error = %failure.message, "artifact write failed");
                    report.failures.push(failure);
                }
            }
        }

        if report.cancelled || ctx.is_cancelled() {
            report.cancelled = true;
            warn!(project = %project, "sync cancelled, skipping stale artifact collection");
            return Ok(finish(report));
        }

        // All writes of this pass have completed; stale files can go now.
        let stale: Vec<(String, String)> = existing
            .keys()
            .filter_map(|path| layout.job_for(path).map(|job| (job, path.clone())))
            .filter(|(job, _)| !current.contains(job) && !retained.contains(job))
            .collect();

        let deletions: Vec<(String, Result<()>)> = futures::stream::iter(stale)
            .map(|(job, path)| async move {
                let res = ctx.run("delete artifact", store.delete(&path)).await;
                (job, res)
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;

        for (job, res) in deletions {
            match res {
                Ok(()) => report.deleted.push(job),
                Err(Error::Cancelled) => report.cancelled = true,
                Err(e) => {
                    warn!(project = %project, job = %job, error = %e, "stale artifact delete failed");
                    report.failures.push(JobFailure {
                        job,
                        stage: FailureStage::Delete,
                        message: e.to_string(),
                    });
                }
            }
        }

        let report = finish(report);
        info!(
            project = %project,
            written = report.written.len(),
            unchanged = report.unchanged.len(),
            deleted = report.deleted.len(),
            failed = report.failures.len(),
            "sync pass complete"
        );
        Ok(report)
    }
}

async fn write(ctx: &CallContext, store: &dyn ObjectStore, path: &str, payload: Bytes) -> Result<()> {
    ctx.run("write artifact", store.write(path, payload)).await
}

fn finish(mut report: SyncReport) -> SyncReport {
    report.written.sort();
    report.unchanged.sort();
    report.deleted.sort();
    report
        .failures
        .sort_by(|a, b| (&a.job, a.stage as u8).cmp(&(&b.job, b.stage as u8)));
    report
}
