//! Error types for dagforge.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing dependency: job '{job}' references unknown '{reference}'")]
    MissingDependency { job: String, reference: String },

    #[error("cyclic dependency: {}", .path.join(" -> "))]
    CyclicDependency { path: Vec<String> },

    #[error("compilation failed for job '{job}': missing or invalid field '{field}'")]
    Compilation { job: String, field: String },

    #[error("storage configuration error for project '{project}': {message}")]
    StorageConfig { project: String, message: String },

    #[error("{0}")]
    Deployment(DeploymentFailures),

    #[error("bootstrap failed for project '{project}': {message}")]
    Bootstrap { project: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn compilation(job: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Compilation {
            job: job.into(),
            field: field.into(),
        }
    }

    pub fn storage_config(project: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageConfig {
            project: project.into(),
            message: message.into(),
        }
    }

    /// Whether the error belongs to a single job rather than the whole pass.
    pub fn is_job_scoped(&self) -> bool {
        matches!(
            self,
            Error::Compilation { .. } | Error::MissingDependency { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Which step of a deploy pass a job failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Compile,
    Write,
    Delete,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureStage::Compile => "compile",
            FailureStage::Write => "write",
            FailureStage::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// A single job that could not be deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub job: String,
    pub stage: FailureStage,
    pub message: String,
}

/// Aggregate of per-job failures from one deploy pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentFailures {
    pub project: String,
    /// Artifacts that were written successfully in the same pass.
    pub written: usize,
    pub failures: Vec<JobFailure>,
}

impl DeploymentFailures {
    /// Names of the jobs that failed, for a targeted retry.
    pub fn failed_jobs(&self) -> Vec<&str> {
        let mut jobs: Vec<&str> = self.failures.iter().map(|f| f.job.as_str()).collect();
        jobs.sort_unstable();
        jobs.dedup();
        jobs
    }
}

impl fmt::Display for DeploymentFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "deployment of project '{}' failed for {} job(s) ({} written)",
            self.project,
            self.failed_jobs().len(),
            self.written
        )?;
        for failure in &self.failures {
            write!(
                f,
                "; {} ({}): {}",
                failure.job, failure.stage, failure.message
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = Error::CyclicDependency {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency: a -> b -> a");
    }

    #[test]
    fn test_deployment_failures_breakdown() {
        let failures = DeploymentFailures {
            project: "acme".into(),
            written: 3,
            failures: vec![
                JobFailure {
                    job: "b".into(),
                    stage: FailureStage::Write,
                    message: "503".into(),
                },
                JobFailure {
                    job: "a".into(),
                    stage: FailureStage::Compile,
                    message: "missing owner".into(),
                },
                JobFailure {
                    job: "b".into(),
                    stage: FailureStage::Delete,
                    message: "503".into(),
                },
            ],
        };

        assert_eq!(failures.failed_jobs(), vec!["a", "b"]);
        let text = failures.to_string();
        assert!(text.starts_with("deployment of project 'acme' failed for 2 job(s) (3 written)"));
        assert!(text.contains("a (compile): missing owner"));
    }
}
