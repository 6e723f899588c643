//! Dependency resolution, compilation and deploy orchestration for dagforge.
//!
//! Turns a project's job specs into scheduler artifacts:
//! resolve the dependency graph, weigh every job, compile each one against
//! the scheduler's template, and hand the artifacts to the sync pipeline.
//! Deploy requests from the API go through an in-process queue drained by
//! a worker pool.

pub mod airflow;
pub mod compiler;
pub mod priority;
pub mod queue;
pub mod resolver;
pub mod resources;
pub mod service;
pub mod template;
pub mod units;
pub mod worker;

pub use airflow::AirflowScheduler;
pub use compiler::{CompileInput, Compiler};
pub use priority::PriorityResolver;
pub use queue::{DeployClaim, DeployQueue, DeployResult};
pub use resolver::{DependencyResolver, InferencePolicy};
pub use service::{DeployOutcome, JobService, ResolvedProject, ServiceConfig, ServiceParts};
pub use units::{builtin_hooks, builtin_tasks};
pub use worker::{DeployWorker, ProjectDeployer, WorkerPool};
