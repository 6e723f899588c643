//! Core domain types and capability traits for the dagforge control plane.
//!
//! This crate contains:
//! - Project and job specifications
//! - The dependency graph and its cycle detection
//! - Compiled artifacts and the object store capability
//! - Scheduler, task and hook unit capabilities (with explicit registries)
//! - The asset renderer callback contract
//! - The specification repository capability
//! - Secret sealing with the application key
//! - Deadline and cancellation helpers for external calls

pub mod artifact;
pub mod deadline;
pub mod error;
pub mod graph;
pub mod id;
pub mod job;
pub mod project;
pub mod render;
pub mod repository;
pub mod scheduler;
pub mod secret;
pub mod unit;

pub use error::{DeploymentFailures, Error, FailureStage, JobFailure, Result};
pub use id::RecordId;
