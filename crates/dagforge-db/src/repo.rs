//! PostgreSQL repositories.

pub mod job;
pub mod project;
pub mod spec;

pub use job::{JobRow, PgJobRepo};
pub use project::{PgProjectRepo, ProjectRow, SecretRow};
pub use spec::PgSpecRepository;
